//! Error taxonomy for the ingestion pipeline.
//!
//! Only failures that can interrupt a unit of work are modelled here.
//! A duplicate item is reported through the stored count and a lost
//! resolution race through `resolve` returning `false`; neither is an error.
//!
//! | Error | Recovered at |
//! |-------|--------------|
//! | [`FetchError`] | one source; the run continues |
//! | [`OracleError`] | one (item, query) pair; an `Error` record is stored |
//! | [`ConfigError`] | nowhere: fatal before the first run |

use thiserror::Error;

/// A source could not be fetched or its payload could not be read.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed feed: {0}")]
    Parse(String),

    #[error("fetch timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// The relevance oracle failed to produce a judgment.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Request(String),

    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle response could not be read: {0}")]
    InvalidResponse(String),

    #[error("oracle timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("oracle provider is disabled")]
    Disabled,
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Request(err.to_string())
    }
}

/// Invalid or missing run parameters, detected before any run begins.
#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
