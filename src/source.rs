//! Price sources that report the current state of a listing.

use async_trait::async_trait;

use crate::source::error::SourceError;

pub mod error;
pub mod steam_store;

/// State of a listing as seen by one fetch. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingSnapshot {
    pub listing_id: i64,
    pub name: String,
    /// Discount percent, 0-99.
    pub discount: i32,
    /// Formatted price before discount, e.g. "$19.99". Empty when unpriced.
    pub initial_price: String,
    /// Formatted price after discount. Empty when unpriced.
    pub final_price: String,
    pub is_free: bool,
    /// Listing is announced but not yet released.
    pub release_pending: bool,
    pub review_count: u32,
    pub description: String,
    pub image_url: String,
}

impl ListingSnapshot {
    /// Public store page of the listing.
    pub fn store_url(&self) -> String {
        format!("https://store.steampowered.com/app/{}", self.listing_id)
    }
}

/// Read-only source of listing state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetches the current state of one listing.
    async fn fetch(&self, listing_id: i64) -> Result<ListingSnapshot, SourceError>;
}
