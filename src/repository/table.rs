//! Database table operations and implementations.

use sqlx::SqliteExecutor;
use sqlx::SqlitePool;

use crate::entity::GroupEntity;
use crate::entity::ListingEntity;
use crate::entity::SubscriptionEntity;
use crate::entity::SubscriptionWithGroup;
use crate::repository::error::DatabaseError;

/// Base table struct providing database pool access.
#[derive(Clone)]
pub struct BaseTable {
    pub pool: SqlitePool,
}

impl BaseTable {
    /// Creates a new base table with the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Base trait for table operations.
#[async_trait::async_trait]
pub trait TableBase {
    /// Counts the rows in the table.
    async fn count(&self) -> Result<i64, DatabaseError>;
}

macro_rules! impl_table {
    ($struct_name:ident, $table:expr) => {
        #[derive(Clone)]
        pub struct $struct_name {
            base: BaseTable,
        }

        impl $struct_name {
            pub fn new(pool: SqlitePool) -> Self {
                Self {
                    base: BaseTable::new(pool),
                }
            }
        }

        #[async_trait::async_trait]
        impl TableBase for $struct_name {
            async fn count(&self) -> Result<i64, DatabaseError> {
                Ok(
                    sqlx::query_scalar::<_, i64>(concat!("SELECT COUNT(*) FROM ", $table))
                        .fetch_one(&self.base.pool)
                        .await?,
                )
            }
        }
    };
}

// ============================================================================
// ListingTable
// ============================================================================

impl_table!(ListingTable, "listings");

impl ListingTable {
    pub async fn select(&self, id: i64) -> Result<Option<ListingEntity>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, ListingEntity>("SELECT * FROM listings WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.base.pool)
                .await?,
        )
    }

    pub async fn select_all(&self) -> Result<Vec<ListingEntity>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, ListingEntity>("SELECT * FROM listings ORDER BY id")
                .fetch_all(&self.base.pool)
                .await?,
        )
    }

    /// Listings tracked by a group, ordered by name.
    pub async fn select_all_by_group_id(
        &self,
        group_id: i64,
    ) -> Result<Vec<ListingEntity>, DatabaseError> {
        Ok(sqlx::query_as::<_, ListingEntity>(
            r#"
                SELECT l.* FROM listings l
                INNER JOIN subscriptions s ON s.listing_id = l.id
                WHERE s.group_id = ?
                ORDER BY l.name
                "#,
        )
        .bind(group_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    /// Next page of ids strictly greater than `after_id`, ascending.
    pub async fn select_ids_after<'e>(
        executor: impl SqliteExecutor<'e>,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>, DatabaseError> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT id FROM listings WHERE id > ? ORDER BY id LIMIT ?",
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(executor)
        .await?)
    }

    /// Inserts the listing or refreshes its name.
    pub async fn upsert<'e>(
        executor: impl SqliteExecutor<'e>,
        listing: &ListingEntity,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO listings (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(listing.id)
        .bind(&listing.name)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Deletes the listing if no subscription references it.
    pub async fn delete_if_orphaned<'e>(
        executor: impl SqliteExecutor<'e>,
        id: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM listings WHERE id = ?
             AND NOT EXISTS (SELECT 1 FROM subscriptions WHERE listing_id = ?)",
        )
        .bind(id)
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every listing no subscription references.
    pub async fn delete_all_orphaned<'e>(
        executor: impl SqliteExecutor<'e>,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM listings
             WHERE id NOT IN (SELECT DISTINCT listing_id FROM subscriptions)",
        )
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// GroupTable
// ============================================================================

impl_table!(GroupTable, "subscriber_groups");

impl GroupTable {
    pub async fn select(&self, id: i64) -> Result<Option<GroupEntity>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, GroupEntity>("SELECT * FROM subscriber_groups WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.base.pool)
                .await?,
        )
    }

    /// Inserts the group unless it already exists. Returns whether a row was added.
    pub async fn insert_or_ignore(&self, group: &GroupEntity) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO subscriber_groups (id, channel_id, sale_threshold)
             VALUES (?, ?, ?)",
        )
        .bind(group.id)
        .bind(group.channel_id)
        .bind(group.sale_threshold)
        .execute(&self.base.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_channel(
        &self,
        id: i64,
        channel_id: Option<i64>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE subscriber_groups SET channel_id = ? WHERE id = ?")
            .bind(channel_id)
            .bind(id)
            .execute(&self.base.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_threshold(&self, id: i64, threshold: i32) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE subscriber_groups SET sale_threshold = ? WHERE id = ?")
            .bind(threshold)
            .bind(id)
            .execute(&self.base.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete<'e>(
        executor: impl SqliteExecutor<'e>,
        id: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM subscriber_groups WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// SubscriptionTable
// ============================================================================

impl_table!(SubscriptionTable, "subscriptions");

impl SubscriptionTable {
    pub async fn select(
        &self,
        listing_id: i64,
        group_id: i64,
    ) -> Result<Option<SubscriptionEntity>, DatabaseError> {
        Ok(sqlx::query_as::<_, SubscriptionEntity>(
            "SELECT * FROM subscriptions WHERE listing_id = ? AND group_id = ?",
        )
        .bind(listing_id)
        .bind(group_id)
        .fetch_optional(&self.base.pool)
        .await?)
    }

    /// All subscriptions of a listing with their group's channel and threshold.
    pub async fn select_all_with_group_by_listing_id(
        &self,
        listing_id: i64,
    ) -> Result<Vec<SubscriptionWithGroup>, DatabaseError> {
        Ok(sqlx::query_as::<_, SubscriptionWithGroup>(
            r#"
                SELECT
                    s.listing_id,
                    s.group_id,
                    s.trailing_sale_day,
                    s.coming_soon,
                    s.sale_threshold,
                    g.channel_id,
                    g.sale_threshold AS group_sale_threshold
                FROM subscriptions s
                INNER JOIN subscriber_groups g ON g.id = s.group_id
                WHERE s.listing_id = ?
                "#,
        )
        .bind(listing_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    /// Inserts a fresh subscription with both flags cleared, unless it exists.
    pub async fn insert_or_ignore<'e>(
        executor: impl SqliteExecutor<'e>,
        listing_id: i64,
        group_id: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO subscriptions (listing_id, group_id, trailing_sale_day, coming_soon)
             VALUES (?, ?, 0, 0)",
        )
        .bind(listing_id)
        .bind(group_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete<'e>(
        executor: impl SqliteExecutor<'e>,
        listing_id: i64,
        group_id: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE listing_id = ? AND group_id = ?")
            .bind(listing_id)
            .bind(group_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Ids of every listing a group tracks.
    pub async fn select_listing_ids_by_group_id<'e>(
        executor: impl SqliteExecutor<'e>,
        group_id: i64,
    ) -> Result<Vec<i64>, DatabaseError> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT listing_id FROM subscriptions WHERE group_id = ?",
        )
        .bind(group_id)
        .fetch_all(executor)
        .await?)
    }

    /// Writes both check flags of one subscription. Returns whether the row still exists.
    pub async fn update_flags(
        &self,
        listing_id: i64,
        group_id: i64,
        trailing_sale_day: bool,
        coming_soon: bool,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET trailing_sale_day = ?, coming_soon = ?
             WHERE listing_id = ? AND group_id = ?",
        )
        .bind(trailing_sale_day)
        .bind(coming_soon)
        .bind(listing_id)
        .bind(group_id)
        .execute(&self.base.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_threshold(
        &self,
        listing_id: i64,
        group_id: i64,
        threshold: Option<i32>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET sale_threshold = ? WHERE listing_id = ? AND group_id = ?",
        )
        .bind(threshold)
        .bind(listing_id)
        .bind(group_id)
        .execute(&self.base.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
