//! Steam storefront `appdetails` integration.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::Quota;
use governor::RateLimiter;
use governor::clock::QuantaClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use log::debug;
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use wreq::Client;
use wreq::header::HeaderMap;
use wreq::header::HeaderValue;
use wreq::header::USER_AGENT;

use crate::config::Config;
use crate::source::ListingSnapshot;
use crate::source::PriceSource;
use crate::source::error::SourceError;

const APP_DETAILS_FILTERS: &str = "basic,price_overview,recommendations,release_date";

#[derive(Deserialize)]
struct AppDetails {
    #[serde(default)]
    success: bool,
    // Steam sends `[]` instead of an object for some failures.
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize, Default)]
struct AppDetailsData {
    #[serde(default)]
    name: String,
    #[serde(default)]
    steam_appid: i64,
    #[serde(default)]
    is_free: bool,
    #[serde(default)]
    short_description: String,
    #[serde(default)]
    header_image: String,
    #[serde(default)]
    recommendations: Option<Recommendations>,
    #[serde(default)]
    release_date: Option<ReleaseDate>,
    #[serde(default)]
    price_overview: Option<PriceOverview>,
}

#[derive(Deserialize, Default)]
struct Recommendations {
    #[serde(default)]
    total: u32,
}

#[derive(Deserialize, Default)]
struct ReleaseDate {
    #[serde(default)]
    coming_soon: bool,
}

#[derive(Deserialize, Default)]
struct PriceOverview {
    #[serde(default)]
    discount_percent: i32,
    #[serde(default)]
    initial_formatted: String,
    #[serde(default)]
    final_formatted: String,
}

/// Fetches listing state from the Steam store API.
pub struct SteamStoreSource {
    /// Base url of the store API, e.g. `https://store.steampowered.com`
    pub api_url: String,
    country_code: String,
    timeout: Duration,
    client: Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, QuantaClock>,
}

impl SteamStoreSource {
    /// Creates a new store source with rate limiting and a bounded request time.
    pub fn new(config: &Config) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("steam-sale-bot/0.1"));
        let client = Client::builder().default_headers(headers).build()?;

        let per_minute =
            NonZeroU32::new(config.source_requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_minute(per_minute));

        Ok(Self {
            api_url: config.steam_store_api_url.clone(),
            country_code: config.steam_country_code.clone(),
            timeout: config.fetch_timeout,
            client,
            limiter,
        })
    }

    async fn send(&self, request: wreq::RequestBuilder) -> Result<wreq::Response, SourceError> {
        let req = request.build()?;
        debug!("Making request to: {}", req.url());
        Ok(self.client.execute(req).await?)
    }

    async fn fetch_app_details(&self, listing_id: i64) -> Result<ListingSnapshot, SourceError> {
        let appid = listing_id.to_string();
        let request = self
            .client
            .get(format!("{}/api/appdetails", self.api_url))
            .query(&[
                ("appids", appid.as_str()),
                ("cc", self.country_code.as_str()),
                ("filters", APP_DETAILS_FILTERS),
            ]);

        let response = self.send(request).await?;
        let status = response.status();

        // Steam answers 403 as well as 429 once a client exceeds its request budget
        if status.as_u16() == 429 || status.as_u16() == 403 {
            return Err(SourceError::CapacityLimited {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(SourceError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Self::parse_app_details(listing_id, &body)
    }

    fn parse_app_details(listing_id: i64, body: &str) -> Result<ListingSnapshot, SourceError> {
        let details: Option<HashMap<String, AppDetails>> = serde_json::from_str(body)?;
        let mut details = details.ok_or(SourceError::EmptyResponse { listing_id })?;

        let entry = details
            .remove(&listing_id.to_string())
            .ok_or(SourceError::NotFound { listing_id })?;
        if !entry.success {
            return Err(SourceError::NotFound { listing_id });
        }

        let data: AppDetailsData = match entry.data {
            Some(data @ Value::Object(_)) => serde_json::from_value(data)?,
            _ => return Err(SourceError::NotFound { listing_id }),
        };
        if data.steam_appid != listing_id {
            warn!(
                "Store returned app `{}` when asked for `{listing_id}`.",
                data.steam_appid
            );
            return Err(SourceError::NotFound { listing_id });
        }

        Ok(Self::snapshot_from(data))
    }

    fn snapshot_from(data: AppDetailsData) -> ListingSnapshot {
        let price = data.price_overview.unwrap_or_default();
        ListingSnapshot {
            listing_id: data.steam_appid,
            name: data.name,
            discount: price.discount_percent.max(0),
            initial_price: price.initial_formatted,
            final_price: price.final_formatted,
            is_free: data.is_free,
            release_pending: data.release_date.is_some_and(|r| r.coming_soon),
            review_count: data.recommendations.map_or(0, |r| r.total),
            description: html2md::parse_html(&data.short_description)
                .trim()
                .to_string(),
            image_url: data.header_image,
        }
    }
}

#[async_trait]
impl PriceSource for SteamStoreSource {
    async fn fetch(&self, listing_id: i64) -> Result<ListingSnapshot, SourceError> {
        debug!("Fetching app details for listing `{listing_id}`.");
        // Pacing is ours, so only the request itself is bounded.
        self.limiter.until_ready().await;
        match tokio::time::timeout(self.timeout, self.fetch_app_details(listing_id)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                after: self.timeout,
            }),
        }
    }
}
