//! Error taxonomy shared by the scraping and resolution pipeline.
//!
//! Fetch and parse failures never cross a handler boundary: every component
//! converts them into an empty or degraded value. Only `PolicyRejected` and
//! `MalformedIdentifier` surface, as `403`/`404` at the image relay.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Network error, timeout or non-2xx upstream status
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Document or pattern did not have the expected shape
    #[error("parse failed: {0}")]
    Parse(String),

    /// Identifier lacks the namespace prefix or carries an undecodable payload
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// Egress allowlist refused the target host
    #[error("host not allowed: {0}")]
    PolicyRejected(String),
}

impl ScrapeError {
    pub fn fetch(url: &str, err: impl std::fmt::Display) -> Self {
        ScrapeError::Fetch {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
