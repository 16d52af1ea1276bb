//! Common test utilities and fake collaborators.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::NaiveTime;
use chrono::TimeZone;
use chrono::Utc;
use chrono_tz::America::Los_Angeles;
use steam_sale_bot::clock::Clock;
use steam_sale_bot::clock::DailyTrigger;
use steam_sale_bot::entity::ListingEntity;
use steam_sale_bot::entity::SubscriptionWithGroup;
use steam_sale_bot::notifier::Destination;
use steam_sale_bot::notifier::NotificationSink;
use steam_sale_bot::notifier::alert::Alert;
use steam_sale_bot::repository::ListingIds;
use steam_sale_bot::repository::Repository;
use steam_sale_bot::repository::TrackingStore;
use steam_sale_bot::repository::error::DatabaseError;
use steam_sale_bot::service::sale_check_service::SaleCheckService;
use steam_sale_bot::source::ListingSnapshot;
use steam_sale_bot::source::PriceSource;
use steam_sale_bot::source::error::SourceError;
use steam_sale_bot::task::daily_check::DailyCheckScheduler;
use tokio::sync::Notify;
use uuid::Uuid;

/// Sets up a temporary test database.
pub async fn setup_db() -> (Arc<Repository>, PathBuf) {
    let uuid = Uuid::new_v4();
    let db_path = std::env::temp_dir().join(format!("steam-sale-bot-test-{}.db", uuid));
    let db_url = format!("sqlite://{}", db_path.to_str().unwrap());

    let db = Repository::new(&db_url, db_path.to_str().unwrap())
        .await
        .expect("Failed to create database");

    db.run_migrations().await.expect("Failed to run migrations");

    (Arc::new(db), db_path)
}

/// Cleans up the test database file.
pub async fn teardown_db(db_path: PathBuf) {
    if db_path.exists() {
        let _ = std::fs::remove_file(db_path);
    }
}

/// Registers `group_id` with an alert channel and subscribes it to every id.
#[allow(dead_code)]
pub async fn seed_group(db: &Repository, group_id: i64, threshold: i32, listing_ids: &[i64]) {
    db.add_group(group_id, Some(group_id * 100))
        .await
        .expect("Failed to add group");
    db.set_group_threshold(group_id, threshold)
        .await
        .expect("Failed to set threshold");
    for id in listing_ids {
        db.subscribe(
            group_id,
            &ListingEntity {
                id: *id,
                name: format!("Listing {id}"),
            },
        )
        .await
        .expect("Failed to subscribe");
    }
}

/// Local time in Los Angeles on a day of June 2024.
#[allow(dead_code)]
pub fn la(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Los_Angeles
        .with_ymd_and_hms(2024, 6, day, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

// SCRIPTED SOURCE

#[derive(Clone, Debug)]
#[allow(dead_code)]
pub enum Scripted {
    Discount(i32),
    ComingSoon,
    CapacityLimited,
    NotFound,
    Unavailable,
}

/// Price source answering from per-listing scripts.
///
/// Each fetch pops the next scripted answer for the id; once a script is
/// empty the id answers with its last popped value, or no discount if it
/// never had one.
#[derive(Default)]
#[allow(dead_code)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<i64, VecDeque<Scripted>>>,
    last: Mutex<HashMap<i64, Scripted>>,
    fetched: Mutex<Vec<i64>>,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, listing_id: i64, answers: impl IntoIterator<Item = Scripted>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(listing_id)
            .or_default()
            .extend(answers);
    }

    /// Every id fetched so far, in order.
    pub fn fetched(&self) -> Vec<i64> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn clear_fetched(&self) {
        self.fetched.lock().unwrap().clear();
    }

    fn next_answer(&self, listing_id: i64) -> Scripted {
        let popped = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&listing_id)
            .and_then(|script| script.pop_front());
        let mut last = self.last.lock().unwrap();
        match popped {
            Some(answer) => {
                last.insert(listing_id, answer.clone());
                answer
            }
            None => last
                .get(&listing_id)
                .cloned()
                .unwrap_or(Scripted::Discount(0)),
        }
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    async fn fetch(&self, listing_id: i64) -> Result<ListingSnapshot, SourceError> {
        self.fetched.lock().unwrap().push(listing_id);
        let snapshot = ListingSnapshot {
            listing_id,
            name: format!("Listing {listing_id}"),
            initial_price: "$20.00".to_string(),
            ..Default::default()
        };

        match self.next_answer(listing_id) {
            Scripted::Discount(discount) => Ok(ListingSnapshot {
                discount,
                final_price: format!("${:.2}", 20.0 * f64::from(100 - discount) / 100.0),
                ..snapshot
            }),
            Scripted::ComingSoon => Ok(ListingSnapshot {
                release_pending: true,
                ..snapshot
            }),
            Scripted::CapacityLimited => Err(SourceError::CapacityLimited { status: 429 }),
            Scripted::NotFound => Err(SourceError::NotFound { listing_id }),
            Scripted::Unavailable => Err(SourceError::UnexpectedStatus { status: 503 }),
        }
    }
}

// RECORDING SINK

/// Sink that remembers every alert it was asked to deliver.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingSink {
    sent: Mutex<Vec<(Destination, Alert)>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(Destination, Alert)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_listing_ids(&self) -> Vec<i64> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, alert)| alert.listing_id)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, destination: &Destination, alert: &Alert) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((*destination, alert.clone()));
        Ok(())
    }
}

// MANUAL CLOCK

/// Clock whose sleeps complete instantly by jumping to the deadline.
///
/// With a sleep limit, sleeps past the limit never complete and signal
/// `parked` instead, which lets a test stop a running loop at a known point.
#[allow(dead_code)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<usize>,
    sleep_limit: Option<usize>,
    pub parked: Notify,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(0),
            sleep_limit: None,
            parked: Notify::new(),
        }
    }

    pub fn with_sleep_limit(now: DateTime<Utc>, limit: usize) -> Self {
        Self {
            sleep_limit: Some(limit),
            ..Self::new(now)
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        let exceeded = {
            let mut sleeps = self.sleeps.lock().unwrap();
            *sleeps += 1;
            self.sleep_limit.is_some_and(|limit| *sleeps > limit)
        };
        if exceeded {
            self.parked.notify_one();
            std::future::pending::<()>().await;
        }

        let mut now = self.now.lock().unwrap();
        if deadline > *now {
            *now = deadline;
        }
    }
}

// STORE WRAPPER

/// Store that fails the subscriptions lookup of one listing.
#[allow(dead_code)]
pub struct BrokenLookupStore {
    pub inner: Arc<Repository>,
    pub broken_listing_id: i64,
}

#[async_trait]
impl TrackingStore for BrokenLookupStore {
    async fn open_listing_ids(&self) -> Result<Box<dyn ListingIds>, DatabaseError> {
        self.inner.open_listing_ids().await
    }

    async fn subscriptions_of(
        &self,
        listing_id: i64,
    ) -> Result<Vec<SubscriptionWithGroup>, DatabaseError> {
        if listing_id == self.broken_listing_id {
            return Err(DatabaseError::InternalError {
                message: format!("lookup of listing {listing_id} failed"),
            });
        }
        self.inner.subscriptions_of(listing_id).await
    }

    async fn update_subscription_flags(
        &self,
        listing_id: i64,
        group_id: i64,
        trailing_sale_day: bool,
        coming_soon: bool,
    ) -> Result<(), DatabaseError> {
        self.inner
            .update_subscription_flags(listing_id, group_id, trailing_sale_day, coming_soon)
            .await
    }
}

// SCHEDULER

/// Daily check at 10:05 Los Angeles time with a five minute cooldown.
#[allow(dead_code)]
pub fn scheduler(
    store: Arc<dyn TrackingStore>,
    source: Arc<ScriptedSource>,
    sink: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
) -> DailyCheckScheduler {
    let service = Arc::new(SaleCheckService::new(store.clone(), sink));
    DailyCheckScheduler::new(
        store,
        source,
        service,
        clock,
        Arc::new(DailyTrigger::new(
            NaiveTime::from_hms_opt(10, 5, 0).unwrap(),
            Los_Angeles,
        )),
        Duration::from_secs(300),
    )
}

/// Advances the clock to the scheduler's next wake instant and handles it.
#[allow(dead_code)]
pub async fn wake(scheduler: &mut DailyCheckScheduler, clock: &ManualClock) {
    clock.sleep_until(scheduler.next_wake()).await;
    scheduler.fire().await;
}
