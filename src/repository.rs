//! Tracking store with SQLite storage and SQLx.

use std::str::FromStr;

use async_trait::async_trait;
use log::debug;
use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

use crate::entity::GroupEntity;
use crate::entity::ListingEntity;
use crate::entity::SubscriptionWithGroup;
use crate::repository::error::DatabaseError;
use crate::repository::listing_ids::SqliteListingIds;
use crate::repository::table::GroupTable;
use crate::repository::table::ListingTable;
use crate::repository::table::SubscriptionTable;
use crate::repository::table::TableBase;

pub mod error;
pub mod listing_ids;
pub mod table;

/// Default sale threshold of a newly registered group, in percent.
pub const DEFAULT_SALE_THRESHOLD: i32 = 1;

/// Lazy sequence of listing ids.
///
/// Resources held by an implementation are released when it is dropped.
#[async_trait]
pub trait ListingIds: Send {
    /// Returns the next id, or `None` once every listing has been yielded.
    async fn next_id(&mut self) -> Result<Option<i64>, DatabaseError>;
}

/// Store operations the daily check relies on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Opens a fresh walk over all tracked listing ids.
    async fn open_listing_ids(&self) -> Result<Box<dyn ListingIds>, DatabaseError>;

    /// All subscriptions of a listing, joined with their group's settings.
    async fn subscriptions_of(
        &self,
        listing_id: i64,
    ) -> Result<Vec<SubscriptionWithGroup>, DatabaseError>;

    /// Writes the check flags of a single subscription.
    ///
    /// Succeeds without effect if the subscription no longer exists.
    async fn update_subscription_flags(
        &self,
        listing_id: i64,
        group_id: i64,
        trailing_sale_day: bool,
        coming_soon: bool,
    ) -> Result<(), DatabaseError>;
}

/// Main repository struct containing all table handlers.
pub struct Repository {
    pool: SqlitePool,
    pub listing: ListingTable,
    pub group: GroupTable,
    pub subscription: SubscriptionTable,
}

impl Repository {
    /// Creates a new database connection and initializes table handlers.
    pub async fn new(db_url: &str, db_path: &str) -> anyhow::Result<Self> {
        let path = std::path::Path::new(db_path);
        if !path.exists() {
            debug!("Database path {db_path} does not exist. Creating...");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, "")?;
            info!("Created {db_path}");
        }

        debug!("Connecting to db...");
        let opts = SqliteConnectOptions::from_str(db_url)?.foreign_keys(true);
        let pool = SqlitePool::connect_with(opts).await?;
        info!("Connected to db.");

        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            listing: ListingTable::new(pool.clone()),
            group: GroupTable::new(pool.clone()),
            subscription: SubscriptionTable::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs database migrations from the migrations directory.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Registers a group with the default threshold. Existing groups are left untouched.
    pub async fn add_group(
        &self,
        group_id: i64,
        channel_id: Option<i64>,
    ) -> Result<bool, DatabaseError> {
        self.group
            .insert_or_ignore(&GroupEntity {
                id: group_id,
                channel_id,
                sale_threshold: DEFAULT_SALE_THRESHOLD,
            })
            .await
    }

    pub async fn set_group_channel(
        &self,
        group_id: i64,
        channel_id: Option<i64>,
    ) -> Result<bool, DatabaseError> {
        self.group.update_channel(group_id, channel_id).await
    }

    pub async fn set_group_threshold(
        &self,
        group_id: i64,
        threshold: i32,
    ) -> Result<bool, DatabaseError> {
        if threshold <= 0 {
            return Err(DatabaseError::InvalidInput {
                message: format!("Sale threshold must be positive, got {threshold}."),
            });
        }
        self.group.update_threshold(group_id, threshold).await
    }

    /// Sets or clears the per-subscription threshold override.
    pub async fn set_subscription_threshold(
        &self,
        listing_id: i64,
        group_id: i64,
        threshold: Option<i32>,
    ) -> Result<bool, DatabaseError> {
        if let Some(threshold) = threshold
            && threshold <= 0
        {
            return Err(DatabaseError::InvalidInput {
                message: format!("Sale threshold must be positive, got {threshold}."),
            });
        }
        self.subscription
            .update_threshold(listing_id, group_id, threshold)
            .await
    }

    /// Listings tracked by a group.
    pub async fn listings_of(&self, group_id: i64) -> Result<Vec<ListingEntity>, DatabaseError> {
        self.listing.select_all_by_group_id(group_id).await
    }

    /// Tracks a listing for a group, creating the listing if needed.
    ///
    /// The listing and the subscription are written in one transaction.
    /// Returns whether the subscription is new.
    pub async fn subscribe(
        &self,
        group_id: i64,
        listing: &ListingEntity,
    ) -> Result<bool, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        ListingTable::upsert(&mut *tx, listing).await?;
        let created = SubscriptionTable::insert_or_ignore(&mut *tx, listing.id, group_id).await?;
        tx.commit().await?;

        debug!(
            "Group `{group_id}` subscribed to listing `{}` (new: {created}).",
            listing.id
        );
        Ok(created)
    }

    /// Stops tracking a listing for a group and drops the listing if it is now orphaned.
    ///
    /// Returns whether a subscription was removed.
    pub async fn unsubscribe(&self, group_id: i64, listing_id: i64) -> Result<bool, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let removed = SubscriptionTable::delete(&mut *tx, listing_id, group_id).await?;
        let orphaned = ListingTable::delete_if_orphaned(&mut *tx, listing_id).await?;
        tx.commit().await?;

        debug!(
            "Group `{group_id}` unsubscribed from listing `{listing_id}` (removed: {removed}, orphan deleted: {orphaned})."
        );
        Ok(removed)
    }

    /// Stops tracking every listing of a group, keeping the group itself.
    pub async fn clear_subscriptions(&self, group_id: i64) -> Result<usize, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let listing_ids =
            SubscriptionTable::select_listing_ids_by_group_id(&mut *tx, group_id).await?;
        for listing_id in &listing_ids {
            SubscriptionTable::delete(&mut *tx, *listing_id, group_id).await?;
            ListingTable::delete_if_orphaned(&mut *tx, *listing_id).await?;
        }
        tx.commit().await?;
        Ok(listing_ids.len())
    }

    /// Removes a group, its subscriptions, and any listings left orphaned.
    pub async fn remove_group(&self, group_id: i64) -> Result<bool, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let removed = GroupTable::delete(&mut *tx, group_id).await?;
        let orphans = ListingTable::delete_all_orphaned(&mut *tx).await?;
        tx.commit().await?;

        info!("Removed group `{group_id}` ({orphans} orphaned listings deleted).");
        Ok(removed)
    }
}

#[async_trait]
impl TrackingStore for Repository {
    async fn open_listing_ids(&self) -> Result<Box<dyn ListingIds>, DatabaseError> {
        Ok(Box::new(SqliteListingIds::open(&self.pool).await?))
    }

    async fn subscriptions_of(
        &self,
        listing_id: i64,
    ) -> Result<Vec<SubscriptionWithGroup>, DatabaseError> {
        self.subscription
            .select_all_with_group_by_listing_id(listing_id)
            .await
    }

    async fn update_subscription_flags(
        &self,
        listing_id: i64,
        group_id: i64,
        trailing_sale_day: bool,
        coming_soon: bool,
    ) -> Result<(), DatabaseError> {
        let exists = self
            .subscription
            .update_flags(listing_id, group_id, trailing_sale_day, coming_soon)
            .await?;
        if !exists {
            debug!(
                "Subscription of group `{group_id}` to listing `{listing_id}` vanished before its flags were written."
            );
        }
        Ok(())
    }
}
