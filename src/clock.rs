//! Wall clock and daily trigger policy.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Days;
use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::TimeZone;
use chrono::Utc;
use chrono_tz::Tz;

/// Source of the current instant and of timed waits.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Waits until `deadline`. Returns immediately if it has passed.
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

/// Clock backed by the host time and the Tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        if let Ok(wait) = (deadline - Utc::now()).to_std() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Start of the hour following `now`.
pub fn next_whole_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let hour = (now.timestamp().div_euclid(3600) + 1) * 3600;
    DateTime::from_timestamp(hour, 0).unwrap_or(now + chrono::Duration::hours(1))
}

/// Decides when the next pass starts.
pub trait TriggerPolicy: Send + Sync {
    /// First trigger instant strictly after `now`.
    fn next_trigger_after(&self, now: DateTime<Utc>) -> DateTime<Utc>;
}

/// Fires once a day at a fixed local time in a named time zone.
#[derive(Clone, Debug)]
pub struct DailyTrigger {
    pub time: NaiveTime,
    pub timezone: Tz,
}

impl DailyTrigger {
    pub fn new(time: NaiveTime, timezone: Tz) -> Self {
        Self { time, timezone }
    }

    /// The trigger instant on a local date. `None` if a DST gap skips that local time.
    fn on_date(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.timezone
            .from_local_datetime(&date.and_time(self.time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl TriggerPolicy for DailyTrigger {
    fn next_trigger_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.timezone).date_naive();

        (0..=2)
            .filter_map(|days| today.checked_add_days(Days::new(days)))
            .filter_map(|date| self.on_date(date))
            .find(|instant| *instant > now)
            .unwrap_or_else(|| now + chrono::Duration::days(1))
    }
}
