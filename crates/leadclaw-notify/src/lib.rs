//! # LeadClaw Notify
//!
//! The notification dispatcher: assignment emails over SMTP and outbound
//! webhooks with retry/backoff. One `Dispatcher` instance is built at startup
//! and injected into callers — there is no module-level mutable state. The
//! mail transport is lazily constructed from the persisted config and
//! replaced wholesale when the config changes.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use lettre::{AsyncSmtpTransport, Tokio1Executor};
use tokio_util::sync::CancellationToken;

use leadclaw_store::CrmDb;

mod email;
mod webhook;

pub use webhook::{RetryPolicy, build_payload};

type Mailer = AsyncSmtpTransport<Tokio1Executor>;

/// Sends assignment emails and delivers webhooks.
pub struct Dispatcher {
    db: Arc<CrmDb>,
    http: reqwest::Client,
    mailer: RwLock<Option<Arc<Mailer>>>,
    shutdown: CancellationToken,
    /// Backoff unit for webhook retries; one second in production, shrunk in
    /// tests.
    retry_base: Duration,
}

impl Dispatcher {
    pub fn new(db: Arc<CrmDb>, shutdown: CancellationToken) -> Self {
        Self {
            db,
            http: reqwest::Client::new(),
            mailer: RwLock::new(None),
            shutdown,
            retry_base: Duration::from_secs(1),
        }
    }

    /// Override the backoff unit (test hook).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    pub fn db(&self) -> &CrmDb {
        &self.db
    }
}
