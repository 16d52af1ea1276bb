use std::sync::Arc;
use std::time::Duration;

use steam_sale_bot::repository::Repository;
use steam_sale_bot::task::daily_check::PassOutcome;
use steam_sale_bot::task::daily_check::SchedulerState;
use tokio::sync::watch;

mod common;

use common::BrokenLookupStore;
use common::ManualClock;
use common::RecordingSink;
use common::Scripted;
use common::ScriptedSource;
use common::la;
use common::scheduler;
use common::seed_group;
use common::wake;

const GROUP: i64 = 1;

async fn trailing_flags(db: &Repository, ids: impl IntoIterator<Item = i64>) -> Vec<bool> {
    let mut flags = Vec::new();
    for id in ids {
        let sub = db
            .subscription
            .select(id, GROUP)
            .await
            .expect("Failed to select subscription")
            .expect("Subscription missing");
        flags.push(sub.trailing_sale_day);
    }
    flags
}

#[tokio::test]
async fn test_capacity_limit_resumes_at_same_listing() {
    let (db, db_path) = common::setup_db().await;
    let ids: Vec<i64> = (1..=10).collect();
    seed_group(&db, GROUP, 10, &ids).await;

    let source = Arc::new(ScriptedSource::new());
    for id in ids.iter().filter(|id| **id != 5) {
        source.script(*id, [Scripted::Discount(50)]);
    }
    source.script(5, [Scripted::CapacityLimited, Scripted::Discount(50)]);
    let sink = Arc::new(RecordingSink::new());
    let clock = Arc::new(ManualClock::new(la(1, 9, 0)));
    let mut scheduler = scheduler(db.clone(), source.clone(), sink.clone(), clock.clone());

    wake(&mut scheduler, &clock).await;

    assert_eq!(
        scheduler.state(),
        SchedulerState::Resuming {
            listing_id: 5,
            retry_at: la(1, 10, 10),
        }
    );
    assert_eq!(scheduler.cursor().in_flight(), Some(5));
    assert_eq!(source.fetched(), vec![1, 2, 3, 4, 5]);
    assert_eq!(sink.sent_listing_ids(), vec![1, 2, 3, 4]);

    wake(&mut scheduler, &clock).await;

    assert_eq!(
        scheduler.state(),
        SchedulerState::Completed {
            next_trigger: la(2, 10, 5),
            outcome: PassOutcome::Finished,
        }
    );
    assert_eq!(source.fetched(), vec![1, 2, 3, 4, 5, 5, 6, 7, 8, 9, 10]);
    assert_eq!(sink.sent_listing_ids(), ids);
    assert_eq!(trailing_flags(&db, ids).await, vec![true; 10]);
    assert!(!scheduler.cursor().is_open());

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_not_found_aborts_until_next_day() {
    let (db, db_path) = common::setup_db().await;
    let ids: Vec<i64> = (1..=10).collect();
    seed_group(&db, GROUP, 10, &ids).await;

    let source = Arc::new(ScriptedSource::new());
    for id in ids.iter().filter(|id| **id != 5) {
        source.script(*id, [Scripted::Discount(50)]);
    }
    source.script(5, [Scripted::NotFound, Scripted::Discount(50)]);
    let sink = Arc::new(RecordingSink::new());
    let clock = Arc::new(ManualClock::new(la(1, 9, 0)));
    let mut scheduler = scheduler(db.clone(), source.clone(), sink.clone(), clock.clone());

    wake(&mut scheduler, &clock).await;

    assert_eq!(
        scheduler.state(),
        SchedulerState::Completed {
            next_trigger: la(2, 10, 5),
            outcome: PassOutcome::Aborted,
        }
    );
    assert_eq!(scheduler.next_wake(), la(2, 10, 5));
    assert!(!scheduler.cursor().is_open());
    assert_eq!(scheduler.cursor().in_flight(), None);
    assert_eq!(source.fetched(), vec![1, 2, 3, 4, 5]);
    assert_eq!(sink.sent_listing_ids(), vec![1, 2, 3, 4]);
    assert_eq!(
        trailing_flags(&db, ids.clone()).await,
        [vec![true; 4], vec![false; 6]].concat()
    );

    // The next day starts over from the first listing.
    source.clear_fetched();
    wake(&mut scheduler, &clock).await;

    assert_eq!(source.fetched(), ids);
    assert!(matches!(
        scheduler.state(),
        SchedulerState::Completed {
            outcome: PassOutcome::Finished,
            ..
        }
    ));
    assert_eq!(sink.sent_listing_ids(), ids);

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_transient_error_aborts_pass() {
    let (db, db_path) = common::setup_db().await;
    seed_group(&db, GROUP, 10, &[1, 2, 3]).await;

    let source = Arc::new(ScriptedSource::new());
    source.script(2, [Scripted::Unavailable]);
    let sink = Arc::new(RecordingSink::new());
    let clock = Arc::new(ManualClock::new(la(1, 9, 0)));
    let mut scheduler = scheduler(db.clone(), source.clone(), sink, clock.clone());

    wake(&mut scheduler, &clock).await;

    assert_eq!(source.fetched(), vec![1, 2]);
    assert!(matches!(
        scheduler.state(),
        SchedulerState::Completed {
            outcome: PassOutcome::Aborted,
            ..
        }
    ));

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_three_day_sale() {
    let (db, db_path) = common::setup_db().await;
    seed_group(&db, GROUP, 10, &[620]).await;

    let source = Arc::new(ScriptedSource::new());
    source.script(
        620,
        [
            Scripted::Discount(15),
            Scripted::Discount(20),
            Scripted::Discount(0),
        ],
    );
    let sink = Arc::new(RecordingSink::new());
    let clock = Arc::new(ManualClock::new(la(1, 9, 0)));
    let mut scheduler = scheduler(db.clone(), source, sink.clone(), clock.clone());

    wake(&mut scheduler, &clock).await;
    assert_eq!(trailing_flags(&db, [620]).await, vec![true]);
    assert_eq!(sink.sent().len(), 1);

    wake(&mut scheduler, &clock).await;
    assert_eq!(trailing_flags(&db, [620]).await, vec![true]);
    assert_eq!(sink.sent().len(), 1);

    wake(&mut scheduler, &clock).await;
    assert_eq!(trailing_flags(&db, [620]).await, vec![false]);

    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    let (destination, alert) = &sent[0];
    assert_eq!(destination.group_id, GROUP);
    assert_eq!(destination.channel_id, GROUP * 100);
    assert_eq!(alert.title, "Listing 620 is on sale for 15% off!");

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_release_alert_through_scheduler() {
    let (db, db_path) = common::setup_db().await;
    seed_group(&db, GROUP, 10, &[9]).await;

    let source = Arc::new(ScriptedSource::new());
    source.script(9, [Scripted::ComingSoon, Scripted::Discount(50)]);
    let sink = Arc::new(RecordingSink::new());
    let clock = Arc::new(ManualClock::new(la(1, 9, 0)));
    let mut scheduler = scheduler(db.clone(), source, sink.clone(), clock.clone());

    wake(&mut scheduler, &clock).await;
    assert!(sink.sent().is_empty());

    // Released with a launch discount: only the release alert goes out.
    wake(&mut scheduler, &clock).await;
    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.title, "Listing 9 has released on Steam!");

    // Still discounted the day after, but the sale was already seen.
    wake(&mut scheduler, &clock).await;
    assert_eq!(sink.sent().len(), 1);

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_lookup_failure_skips_only_that_listing() {
    let (db, db_path) = common::setup_db().await;
    seed_group(&db, GROUP, 10, &[1, 2, 3]).await;

    let source = Arc::new(ScriptedSource::new());
    for id in [1, 2, 3] {
        source.script(id, [Scripted::Discount(30)]);
    }
    let sink = Arc::new(RecordingSink::new());
    let clock = Arc::new(ManualClock::new(la(1, 9, 0)));
    let store = Arc::new(BrokenLookupStore {
        inner: db.clone(),
        broken_listing_id: 2,
    });
    let mut scheduler = scheduler(store, source.clone(), sink.clone(), clock.clone());

    wake(&mut scheduler, &clock).await;

    assert_eq!(source.fetched(), vec![1, 2, 3]);
    assert_eq!(sink.sent_listing_ids(), vec![1, 3]);
    assert_eq!(trailing_flags(&db, [1, 2, 3]).await, vec![true, false, true]);
    assert!(matches!(
        scheduler.state(),
        SchedulerState::Completed {
            outcome: PassOutcome::Finished,
            ..
        }
    ));

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_run_loop_completes_pass_and_stops() {
    let (db, db_path) = common::setup_db().await;
    seed_group(&db, GROUP, 10, &[1, 2]).await;

    let source = Arc::new(ScriptedSource::new());
    source.script(1, [Scripted::Discount(40)]);
    source.script(2, [Scripted::CapacityLimited, Scripted::Discount(40)]);
    let sink = Arc::new(RecordingSink::new());
    // Trigger, cooldown, then park on the wait for the next day.
    let clock = Arc::new(ManualClock::with_sleep_limit(la(1, 9, 0), 2));
    let scheduler = scheduler(db.clone(), source.clone(), sink.clone(), clock.clone());
    let mut next_trigger = scheduler.next_trigger_receiver();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = scheduler.start(shutdown_rx);
    tokio::time::timeout(Duration::from_secs(10), clock.parked.notified())
        .await
        .expect("Scheduler never parked");

    assert_eq!(source.fetched(), vec![1, 2, 2]);
    assert_eq!(sink.sent_listing_ids(), vec![1, 2]);
    assert!(next_trigger.has_changed().unwrap());
    assert_eq!(*next_trigger.borrow_and_update(), la(2, 10, 5));

    shutdown_tx.send_replace(true);
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("Scheduler did not stop")
        .expect("Scheduler task panicked");

    common::teardown_db(db_path).await;
}
