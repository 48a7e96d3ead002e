//! # LeadClaw Core
//!
//! Shared foundation for the LeadClaw CRM core: the error taxonomy, the lead
//! domain model, and the typed configuration blobs persisted by the store.

pub mod config;
pub mod error;
pub mod types;

pub use config::{EmailConfig, JobConfig, SmtpConfig, WebhookConfig};
pub use error::{LeadClawError, Result};
pub use types::{
    AssignmentOutcome, AssignmentRule, HistoryEntry, HistoryKind, JobReport, Lead, LeadState,
    WebhookLogEntry, WebhookLogPage,
};
