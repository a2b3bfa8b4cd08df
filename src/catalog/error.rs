//! Error types for the catalog fetch subsystem.

use thiserror::Error;

/// Errors that can occur while retrieving course data from the catalog.
///
/// A page-level fetch error is treated as "no data" for that page and never
/// aborts other datasets.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network/HTTP request failed
    #[error("network error: {message}")]
    Network { message: String },

    /// The endpoint answered with a non-success status
    #[error("catalog endpoint returned status {status}")]
    Status { status: u16 },

    /// The payload could not be repaired into parseable JSON
    #[error("unparseable catalog payload: {message}")]
    Payload { message: String },

    /// The configured base URL is invalid
    #[error("invalid catalog url: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network {
            message: err.to_string(),
        }
    }
}
