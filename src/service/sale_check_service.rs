//! Decides which groups hear about a listing and keeps subscription flags current.

use std::sync::Arc;

use log::debug;
use log::error;
use log::info;
use log::warn;

use crate::entity::SubscriptionWithGroup;
use crate::notifier::Destination;
use crate::notifier::NotificationSink;
use crate::notifier::alert::Alert;
use crate::repository::TrackingStore;
use crate::service::error::ServiceError;
use crate::source::ListingSnapshot;

/// What a single subscription should be told about a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// The listing left the coming-soon state since the last check.
    Release,
    /// The discount reached the threshold and was not already on sale.
    Sale,
    None,
}

/// Counters of one `check_listing` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub subscriptions: usize,
    pub alerts_sent: usize,
    pub alert_failures: usize,
    pub flag_write_failures: usize,
}

pub struct SaleCheckService {
    store: Arc<dyn TrackingStore>,
    sink: Arc<dyn NotificationSink>,
}

impl SaleCheckService {
    pub fn new(store: Arc<dyn TrackingStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// A release transition takes precedence over a sale for the same check.
    pub fn decide(snapshot: &ListingSnapshot, sub: &SubscriptionWithGroup) -> AlertDecision {
        if sub.coming_soon && !snapshot.release_pending {
            return AlertDecision::Release;
        }
        if snapshot.discount > 0
            && snapshot.discount >= sub.effective_threshold()
            && !sub.trailing_sale_day
        {
            return AlertDecision::Sale;
        }
        AlertDecision::None
    }

    /// Applies a fresh snapshot to every subscription of its listing.
    ///
    /// Flags are written before the alert is sent. A subscription whose flag
    /// write fails gets no alert this time and is reconsidered on the next
    /// check. Sink failures are counted but never undo the flag write.
    pub async fn check_listing(
        &self,
        snapshot: &ListingSnapshot,
    ) -> Result<CheckSummary, ServiceError> {
        let listing_id = snapshot.listing_id;
        let subs = self.store.subscriptions_of(listing_id).await?;
        let mut summary = CheckSummary {
            subscriptions: subs.len(),
            ..Default::default()
        };
        debug!(
            "Checking listing `{listing_id}` ({}) against {} subscriptions.",
            snapshot.name,
            subs.len()
        );

        for sub in subs {
            let decision = Self::decide(snapshot, &sub);

            if let Err(e) = self
                .store
                .update_subscription_flags(
                    listing_id,
                    sub.group_id,
                    snapshot.discount > 0,
                    snapshot.release_pending,
                )
                .await
            {
                error!(
                    "Failed to update flags of group `{}` for listing `{listing_id}`: {e}",
                    sub.group_id
                );
                summary.flag_write_failures += 1;
                continue;
            }

            let alert = match decision {
                AlertDecision::Release => Alert::release(snapshot),
                AlertDecision::Sale => Alert::sale(snapshot),
                AlertDecision::None => continue,
            };
            let Some(channel_id) = sub.channel_id else {
                debug!(
                    "Group `{}` has no alert channel. Skipping {decision:?} alert for listing `{listing_id}`.",
                    sub.group_id
                );
                continue;
            };

            let destination = Destination {
                group_id: sub.group_id,
                channel_id,
            };
            match self.sink.send(&destination, &alert).await {
                Ok(()) => summary.alerts_sent += 1,
                Err(e) => {
                    warn!(
                        "Failed to send {decision:?} alert for listing `{listing_id}` to group `{}`: {e:?}",
                        sub.group_id
                    );
                    summary.alert_failures += 1;
                }
            }
        }

        if summary.alerts_sent > 0 {
            info!(
                "Sent {} alerts for listing `{listing_id}` ({}).",
                summary.alerts_sent, snapshot.name
            );
        }
        Ok(summary)
    }
}
