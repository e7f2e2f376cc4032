use thiserror::Error;

/// Network-side failure for a single quote page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else {
            FetchError::Request {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// The page did not match the expected layout. Always names the ticker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("{id}: {region} region not found")]
    MissingRegion { id: String, region: &'static str },

    #[error("{id}: no title at the expected position")]
    MissingTitle { id: String },

    #[error("{id}: label '{field}' not found")]
    MissingField { id: String, field: String },
}

/// Either half of a per-ticker scrape can fail; both are non-fatal.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The fetch or extract task panicked or was cancelled.
    #[error("{id}: scrape aborted: {reason}")]
    Aborted { id: String, reason: String },
}
