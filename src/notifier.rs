//! Delivery of alerts to group destinations.

use anyhow::Result;

use crate::notifier::alert::Alert;

pub mod alert;
pub mod discord_channel_notifier;

/// Where a group's alerts go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Destination {
    /// Discord guild id
    pub group_id: i64,
    /// Discord channel id
    pub channel_id: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, destination: &Destination, alert: &Alert) -> Result<()>;
}
