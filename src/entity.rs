//! Rows stored by the tracking repository.

use serde::Serialize;
use sqlx::FromRow;

/// A Steam app tracked by at least one group.
///
/// Listings exist only while some [`SubscriptionEntity`] references them; the
/// repository removes orphans in the same transaction that drops the last
/// subscription.
#[derive(FromRow, Serialize, Default, Clone, Debug, PartialEq, Eq)]
pub struct ListingEntity {
    /// Steam app id
    pub id: i64,
    pub name: String,
}

/// A Discord guild that receives alerts.
#[derive(FromRow, Serialize, Default, Clone, Debug, PartialEq, Eq)]
pub struct GroupEntity {
    /// Discord guild snowflake
    pub id: i64,
    /// Channel alerts are posted to; `None` until one is bound.
    pub channel_id: Option<i64>,
    /// Default minimum discount percent that triggers a sale alert.
    pub sale_threshold: i32,
}

/// Links a group to a listing it tracks, with the state of the last check.
#[derive(FromRow, Serialize, Default, Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionEntity {
    pub listing_id: i64,
    pub group_id: i64,
    /// The last check saw a nonzero discount.
    pub trailing_sale_day: bool,
    /// The last check saw the listing as not yet released.
    pub coming_soon: bool,
    /// Overrides the group's threshold when set and positive.
    pub sale_threshold: Option<i32>,
}

/// A subscription joined with its group's alert settings.
#[derive(FromRow, Serialize, Default, Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionWithGroup {
    pub listing_id: i64,
    pub group_id: i64,
    pub trailing_sale_day: bool,
    pub coming_soon: bool,
    pub sale_threshold: Option<i32>,
    pub channel_id: Option<i64>,
    pub group_sale_threshold: i32,
}

impl SubscriptionWithGroup {
    /// Threshold in effect for this subscription.
    pub fn effective_threshold(&self) -> i32 {
        match self.sale_threshold {
            Some(threshold) if threshold > 0 => threshold,
            _ => self.group_sale_threshold,
        }
    }
}
