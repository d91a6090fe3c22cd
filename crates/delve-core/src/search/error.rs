use thiserror::Error;

/// Errors a single provider call can produce.
///
/// These never leave the search subsystem: the reliability layer turns
/// them into an empty contribution and a health record.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Provider '{0}' is not configured: {1}")]
    NotConfigured(String, String),

    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Provider returned error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse provider response: {0}")]
    ParseError(String),

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Provider call timed out after {0}ms")]
    Timeout(u128),
}

impl SearchError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::NotConfigured(..) | SearchError::ParseError(_) => false,
            SearchError::ApiError { status, .. } => *status >= 500 || *status == 408,
            SearchError::RequestFailed(_) | SearchError::RateLimited | SearchError::Timeout(_) => {
                true
            }
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::RequestFailed(err.to_string())
    }
}
