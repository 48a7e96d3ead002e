//! LeadClaw error taxonomy.

use thiserror::Error;

/// All errors surfaced by the CRM core.
///
/// `NotFound` is deliberately rare: lookups that can legitimately miss return
/// `Option`/`bool` instead, so callers can map misses to a 404-equivalent
/// without unwinding.
#[derive(Debug, Error)]
pub enum LeadClawError {
    /// Rejected before anything was persisted (bad rule definition, bad config).
    #[error("Validation error: {0}")]
    Validation(String),

    /// An id that must exist does not.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The underlying SQLite store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// A configuration blob could not be read or written.
    #[error("Config error: {0}")]
    Config(String),

    /// Outbound notification (SMTP or webhook) failed terminally.
    #[error("Notify error: {0}")]
    Notify(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LeadClawError>;
