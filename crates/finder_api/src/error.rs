use finder_engine::SourceError;
use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the backend. `Display` is the message shown to the
/// user.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("The {0} URL is not configured")]
    NotConfigured(&'static str),
    #[error("Invalid {what} URL {url:?}")]
    InvalidUrl { what: &'static str, url: String },
    #[error("Could not reach the server: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Your session has expired, please log in again")]
    Unauthorized,
    #[error("The server responded with {0}")]
    Status(StatusCode),
    #[error("Unexpected response from the server: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SourceError for ApiError {
    fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}
