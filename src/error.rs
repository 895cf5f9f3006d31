//! Error types for course-sync
//!
//! Errors fall into three groups:
//! - Validation errors, detected before any network access and never retried
//! - Transport errors, raised by the content API collaborator (network, non-success status, bad body)
//! - Per-item batch failures, which are not errors at all but entries in a
//!   [`BatchReport`](crate::batch::BatchReport)

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for course-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for course-sync
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch.width")
        key: Option<String>,
    },

    /// Malformed input rejected before any network access
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Network error while talking to the content API
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The content API answered with a non-success status
    #[error("content API returned {status} for {url}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Request URL
        url: String,
        /// Response body (possibly empty)
        body: String,
    },

    /// Response body could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Endpoint URL could not be built
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Outcome of a retrieval shared by every caller that was attached to it
    #[error(transparent)]
    Coalesced(Arc<Error>),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The underlying error, looking through [`Error::Coalesced`] wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Coalesced(inner) => inner.root(),
            other => other,
        }
    }

    /// True for network, status and decoding failures raised by the content API
    pub fn is_transport(&self) -> bool {
        matches!(
            self.root(),
            Error::Network(_) | Error::HttpStatus { .. } | Error::Serialization(_)
        )
    }

    /// True for input rejected before any network access
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Error::Validation(_))
    }

    /// HTTP status of a [`Error::HttpStatus`] failure, if that is what this is
    pub fn status(&self) -> Option<u16> {
        match self.root() {
            Error::HttpStatus { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Input validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Entity IDs must be positive integers
    #[error("entity id must be a positive integer, got {0}")]
    NonPositiveId(i64),

    /// Input could not be parsed as an integer ID
    #[error("entity id must be an integer, got {0:?}")]
    NotAnInteger(String),

    /// Step indices must fit below the composite key multiplier
    #[error("step index {index} is out of range (must be below {limit})")]
    StepIndexOutOfRange {
        /// The rejected index
        index: u32,
        /// Exclusive upper bound
        limit: u32,
    },

    /// The composite key does not fit in an i64
    #[error("composite key for lesson {parent} step {index} overflows")]
    CompositeKeyOverflow {
        /// Parent lesson ID
        parent: i64,
        /// Step index
        index: u32,
    },
}
