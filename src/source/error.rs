use std::time::Duration;

/// How the daily check should react to a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The source is throttling us; waiting and retrying the same listing is expected to work.
    CapacityLimited,
    /// The id does not correspond to a real listing.
    NotFound,
    /// Network, timeout, or response format failure.
    Transient,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SourceError {
    #[error("Source is rate limiting requests (HTTP {status}).")]
    CapacityLimited { status: u16 },

    #[error("Listing not found or invalid (ID: {listing_id}).")]
    NotFound { listing_id: i64 },

    #[error("Request timed out after {after:?}.")]
    Timeout { after: Duration },

    #[error("Unexpected HTTP status {status}.")]
    UnexpectedStatus { status: u16 },

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to parse API response: {0}")]
    JsonParseFailed(#[from] serde_json::Error),

    #[error("Source API returned no data for listing (ID: {listing_id}).")]
    EmptyResponse { listing_id: i64 },
}

impl SourceError {
    pub fn class(&self) -> FailureClass {
        match self {
            SourceError::CapacityLimited { .. } => FailureClass::CapacityLimited,
            SourceError::NotFound { .. } => FailureClass::NotFound,
            _ => FailureClass::Transient,
        }
    }

    pub fn is_capacity_limited(&self) -> bool {
        self.class() == FailureClass::CapacityLimited
    }
}

impl From<wreq::Error> for SourceError {
    fn from(e: wreq::Error) -> Self {
        SourceError::RequestFailed(Box::new(e))
    }
}
