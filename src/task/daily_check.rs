//! Once-a-day sweep over every tracked listing.
//!
//! The scheduler is a state machine driven by two timer events: the daily
//! trigger and the cooldown that follows a capacity-limited fetch. Each event
//! runs to completion before the next wake instant is computed, so no two
//! fetches ever overlap.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use log::debug;
use log::error;
use log::info;
use log::warn;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::clock::TriggerPolicy;
use crate::repository::ListingIds;
use crate::repository::TrackingStore;
use crate::service::sale_check_service::SaleCheckService;
use crate::source::PriceSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every listing id was visited.
    Finished,
    /// A fetch or the id walk failed; the rest of the pass was dropped.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next trigger. No pass has run yet.
    Idle { next_trigger: DateTime<Utc> },
    /// Walking listing ids.
    Scanning,
    /// `listing_id` was capacity-limited and is retried at `retry_at`.
    Resuming {
        listing_id: i64,
        retry_at: DateTime<Utc>,
    },
    /// The last pass ended; behaves like `Idle` when the trigger fires.
    Completed {
        next_trigger: DateTime<Utc>,
        outcome: PassOutcome,
    },
}

/// Position of the current pass.
///
/// `ids == None` means the next trigger must open a fresh walk. At most one
/// listing is in flight, and it is kept across a cooldown so the retry
/// fetches the same id.
#[derive(Default)]
pub struct ScanCursor {
    ids: Option<Box<dyn ListingIds>>,
    in_flight: Option<i64>,
}

impl ScanCursor {
    pub fn is_open(&self) -> bool {
        self.ids.is_some()
    }

    pub fn in_flight(&self) -> Option<i64> {
        self.in_flight
    }

    /// Drops the walk, releasing whatever it holds, and forgets the in-flight id.
    pub fn clear(&mut self) {
        self.ids = None;
        self.in_flight = None;
    }
}

impl fmt::Debug for ScanCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCursor")
            .field("open", &self.is_open())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

pub struct DailyCheckScheduler {
    store: Arc<dyn TrackingStore>,
    source: Arc<dyn PriceSource>,
    service: Arc<SaleCheckService>,
    clock: Arc<dyn Clock>,
    trigger: Arc<dyn TriggerPolicy>,
    cooldown: Duration,
    state: SchedulerState,
    cursor: ScanCursor,
    checked: usize,
    next_trigger_tx: watch::Sender<DateTime<Utc>>,
}

impl DailyCheckScheduler {
    /// Creates an idle scheduler armed for the first trigger after now.
    pub fn new(
        store: Arc<dyn TrackingStore>,
        source: Arc<dyn PriceSource>,
        service: Arc<SaleCheckService>,
        clock: Arc<dyn Clock>,
        trigger: Arc<dyn TriggerPolicy>,
        cooldown: Duration,
    ) -> Self {
        let next_trigger = trigger.next_trigger_after(clock.now());
        let (next_trigger_tx, _) = watch::channel(next_trigger);
        info!("Initializing DailyCheckScheduler. First pass at {next_trigger}.");

        Self {
            store,
            source,
            service,
            clock,
            trigger,
            cooldown,
            state: SchedulerState::Idle { next_trigger },
            cursor: ScanCursor::default(),
            checked: 0,
            next_trigger_tx,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn cursor(&self) -> &ScanCursor {
        &self.cursor
    }

    /// Follows the instant of the next daily trigger.
    pub fn next_trigger_receiver(&self) -> watch::Receiver<DateTime<Utc>> {
        self.next_trigger_tx.subscribe()
    }

    /// When the loop should call [`Self::fire`] next.
    pub fn next_wake(&self) -> DateTime<Utc> {
        match self.state {
            SchedulerState::Idle { next_trigger }
            | SchedulerState::Completed { next_trigger, .. } => next_trigger,
            SchedulerState::Resuming { retry_at, .. } => retry_at,
            SchedulerState::Scanning => self.clock.now(),
        }
    }

    /// Handles whichever timer event the current state is waiting for.
    pub async fn fire(&mut self) {
        match self.state {
            SchedulerState::Idle { .. } | SchedulerState::Completed { .. } => {
                self.on_trigger().await
            }
            SchedulerState::Resuming { .. } => self.on_cooldown().await,
            SchedulerState::Scanning => self.scan().await,
        }
    }

    /// Starts a fresh pass over every listing id.
    pub async fn on_trigger(&mut self) {
        if matches!(
            self.state,
            SchedulerState::Scanning | SchedulerState::Resuming { .. }
        ) {
            warn!("Daily trigger fired while a pass is in progress. Ignoring.");
            return;
        }

        info!("Starting daily sale check.");
        self.cursor.clear();
        self.checked = 0;
        match self.store.open_listing_ids().await {
            Ok(ids) => self.cursor.ids = Some(ids),
            Err(e) => {
                error!("Failed to open listing ids: {e}");
                self.complete(PassOutcome::Aborted);
                return;
            }
        }

        self.state = SchedulerState::Scanning;
        self.scan().await;
    }

    /// Retries the listing that was capacity-limited and continues the pass.
    pub async fn on_cooldown(&mut self) {
        let SchedulerState::Resuming { listing_id, .. } = self.state else {
            debug!("Cooldown fired outside of a paused pass. Ignoring.");
            return;
        };

        info!("Cooldown over. Resuming daily sale check at listing `{listing_id}`.");
        self.state = SchedulerState::Scanning;
        self.scan().await;
    }

    async fn scan(&mut self) {
        loop {
            let listing_id = match self.cursor.in_flight {
                Some(id) => id,
                None => match self.advance().await {
                    Some(id) => id,
                    None => return,
                },
            };

            match self.source.fetch(listing_id).await {
                Ok(snapshot) => {
                    match self.service.check_listing(&snapshot).await {
                        Ok(summary) => debug!(
                            "Checked listing `{listing_id}` ({}): {summary:?}",
                            snapshot.name
                        ),
                        Err(e) => {
                            error!("Skipping listing `{listing_id}`, subscriptions lookup failed: {e}")
                        }
                    }
                    self.cursor.in_flight = None;
                    self.checked += 1;
                }
                Err(e) if e.is_capacity_limited() => {
                    let retry_at = self.clock.now() + self.cooldown;
                    warn!("Fetching listing `{listing_id}` was rate limited: {e}. Retrying at {retry_at}.");
                    self.state = SchedulerState::Resuming {
                        listing_id,
                        retry_at,
                    };
                    return;
                }
                Err(e) => {
                    error!("Fetching listing `{listing_id}` failed: {e}. Abandoning today's check.");
                    self.complete(PassOutcome::Aborted);
                    return;
                }
            }
        }
    }

    /// Moves the cursor to the next id. Completes the pass when there is none.
    async fn advance(&mut self) -> Option<i64> {
        let Some(ids) = self.cursor.ids.as_mut() else {
            error!("Scanning without an open listing id walk.");
            self.complete(PassOutcome::Aborted);
            return None;
        };

        match ids.next_id().await {
            Ok(Some(id)) => {
                self.cursor.in_flight = Some(id);
                Some(id)
            }
            Ok(None) => {
                self.complete(PassOutcome::Finished);
                None
            }
            Err(e) => {
                error!("Failed to read the next listing id: {e}");
                self.complete(PassOutcome::Aborted);
                None
            }
        }
    }

    fn complete(&mut self, outcome: PassOutcome) {
        self.cursor.clear();
        let next_trigger = self.trigger.next_trigger_after(self.clock.now());
        self.next_trigger_tx.send_replace(next_trigger);
        self.state = SchedulerState::Completed {
            next_trigger,
            outcome,
        };

        info!(
            "Daily sale check {} after {} listings. Next check at {next_trigger}.",
            match outcome {
                PassOutcome::Finished => "finished",
                PassOutcome::Aborted => "aborted",
            },
            self.checked
        );
    }

    /// Drives the scheduler until `shutdown` turns true or its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting daily check loop.");
        while !*shutdown.borrow_and_update() {
            let wake = self.next_wake();
            let clock = self.clock.clone();
            tokio::select! {
                _ = async {
                    clock.sleep_until(wake).await;
                    self.fire().await;
                } => {}
                _ = shutdown.changed() => break,
            }
        }

        self.cursor.clear();
        info!("Stopped daily check loop.");
    }

    /// Spawns [`Self::run`] on the Tokio runtime.
    pub fn start(mut self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
