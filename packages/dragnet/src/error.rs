//! Typed errors for the dragnet library.
//!
//! Uses `thiserror` for library errors (not `anyhow`); the host-facing
//! trait seams (`Target`, `ResultStore`) stay on `anyhow::Result` since
//! their failures are opaque to this crate.

use thiserror::Error;

/// Errors raised by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No job is scheduled under this id
    #[error("no scheduled job with id: {id}")]
    JobNotFound { id: String },

    /// The trigger runner rejected an operation
    #[error("trigger runner error: {0}")]
    Trigger(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Why a crawl request was rejected before reaching its target.
#[derive(Debug, Error)]
pub enum RequestValidationError {
    /// Request carries no target name to resolve
    #[error("request has no target name")]
    MissingTargetName,

    /// Extraction request carries no unique key
    #[error("extraction request has no unique key")]
    MissingUniqueKey,

    /// Extraction request URL does not parse
    #[error("invalid URL: {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Result type alias for scheduler operations.
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
