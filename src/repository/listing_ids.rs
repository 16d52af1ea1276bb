//! Lazy iteration over every tracked listing id.

use std::collections::VecDeque;

use async_trait::async_trait;
use log::debug;
use sqlx::Sqlite;
use sqlx::SqlitePool;
use sqlx::pool::PoolConnection;

use crate::repository::ListingIds;
use crate::repository::error::DatabaseError;
use crate::repository::table::ListingTable;

const PAGE_SIZE: i64 = 64;

/// Keyset-paginated walk over `listings.id` in ascending order.
///
/// Holds one pooled connection for its whole lifetime; dropping the value
/// returns the connection to the pool. Listings deleted while the walk is
/// open are skipped once the page that would have held them is fetched, and
/// listings inserted above the current position are still visited.
pub struct SqliteListingIds {
    conn: PoolConnection<Sqlite>,
    last_id: i64,
    page: VecDeque<i64>,
    exhausted: bool,
    page_size: i64,
}

impl SqliteListingIds {
    /// Acquires a connection and positions the walk before the first id.
    pub async fn open(pool: &SqlitePool) -> Result<Self, DatabaseError> {
        Self::open_with_page_size(pool, PAGE_SIZE).await
    }

    pub async fn open_with_page_size(
        pool: &SqlitePool,
        page_size: i64,
    ) -> Result<Self, DatabaseError> {
        let conn = pool.acquire().await?;
        debug!("Opened listing id cursor (page size {page_size}).");
        Ok(Self {
            conn,
            last_id: i64::MIN,
            page: VecDeque::new(),
            exhausted: false,
            page_size: page_size.max(1),
        })
    }

    async fn fetch_page(&mut self) -> Result<(), DatabaseError> {
        let ids = ListingTable::select_ids_after(&mut *self.conn, self.last_id, self.page_size)
            .await?;

        if (ids.len() as i64) < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = ids.last() {
            self.last_id = *last;
        }
        self.page.extend(ids);
        Ok(())
    }
}

#[async_trait]
impl ListingIds for SqliteListingIds {
    async fn next_id(&mut self) -> Result<Option<i64>, DatabaseError> {
        if self.page.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.page.pop_front())
    }
}

impl Drop for SqliteListingIds {
    fn drop(&mut self) {
        debug!("Released listing id cursor at id {}.", self.last_id);
    }
}
