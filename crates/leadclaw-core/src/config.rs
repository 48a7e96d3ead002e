//! Typed configuration blobs.
//!
//! Each config lives in the store's `configuraciones` table as a versioned
//! JSON document under a well-known key. The structs here are the only way
//! the core reads or writes those blobs — no untyped maps.

use serde::{Deserialize, Serialize};

use crate::error::{LeadClawError, Result};

/// Schema version stamped into every persisted blob.
pub const CONFIG_VERSION: u32 = 1;

/// Store key for the lifecycle-job config.
pub const KEY_JOB: &str = "job_cambio_estado";
/// Store key for the outbound-webhook config.
pub const KEY_WEBHOOKS: &str = "webhooks";
/// Store key for the SMTP/email config.
pub const KEY_EMAIL: &str = "email";

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn bool_true() -> bool {
    true
}
fn default_days_new() -> u32 {
    7
}
fn default_days_contacted() -> u32 {
    14
}
fn default_max_retries() -> u32 {
    3
}
fn default_smtp_port() -> u16 {
    587
}
fn default_org_domain() -> String {
    "empresa.com".into()
}
fn default_from() -> String {
    "crm@empresa.com".into()
}

/// Settings for the automatic state-transition job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Days a lead may sit in `nuevo` before it becomes `no_contactado`.
    #[serde(default = "default_days_new")]
    pub days_new: u32,
    /// Days since last update a `contactado` lead may sit before it becomes
    /// `en_negociacion`.
    #[serde(default = "default_days_contacted")]
    pub days_contacted: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            enabled: true,
            days_new: default_days_new(),
            days_contacted: default_days_contacted(),
        }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<()> {
        if self.days_new == 0 {
            return Err(LeadClawError::Validation(
                "days_new must be greater than 0".into(),
            ));
        }
        if self.days_contacted == 0 {
            return Err(LeadClawError::Validation(
                "days_contacted must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for outbound webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            enabled: false,
            base_url: String::new(),
            max_retries: default_max_retries(),
        }
    }
}

impl WebhookConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.base_url.trim().is_empty() {
            return Err(LeadClawError::Validation(
                "base_url is required when webhooks are enabled".into(),
            ));
        }
        if !(1..=10).contains(&self.max_retries) {
            return Err(LeadClawError::Validation(
                "max_retries must be between 1 and 10".into(),
            ));
        }
        Ok(())
    }
}

/// SMTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            user: String::new(),
            pass: String::new(),
        }
    }
}

impl SmtpConfig {
    /// Implicit-TLS port convention: 465 means TLS-wrapped, anything else
    /// negotiates STARTTLS.
    pub fn secure(&self) -> bool {
        self.port == 465
    }
}

/// Settings for assignment-notification email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp: SmtpConfig,
    /// Sender address on outgoing mail.
    #[serde(default = "default_from")]
    pub from: String,
    /// Domain appended to bare assignee identifiers to form a mailbox.
    #[serde(default = "default_org_domain")]
    pub org_domain: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            enabled: false,
            smtp: SmtpConfig::default(),
            from: default_from(),
            org_domain: default_org_domain(),
        }
    }
}

impl EmailConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled {
            if self.smtp.host.trim().is_empty() || self.smtp.user.trim().is_empty() {
                return Err(LeadClawError::Validation(
                    "SMTP host and user are required when email is enabled".into(),
                ));
            }
            if self.smtp.port == 0 {
                return Err(LeadClawError::Validation("SMTP port must be valid".into()));
            }
        }
        Ok(())
    }

    /// Copy with the password masked, for printing.
    pub fn masked(&self) -> Self {
        let mut c = self.clone();
        if !c.smtp.pass.is_empty() {
            c.smtp.pass = "***".into();
        }
        c
    }
}

/// Reject blobs written by a newer schema than this build understands.
pub fn check_version(key: &str, version: u32) -> Result<()> {
    if version > CONFIG_VERSION {
        return Err(LeadClawError::Config(format!(
            "config '{key}' has schema version {version}, this build supports up to {CONFIG_VERSION}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_config_defaults() {
        let config = JobConfig::default();
        assert!(config.enabled);
        assert_eq!(config.days_new, 7);
        assert_eq!(config.days_contacted, 14);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_job_config_missing_fields_use_defaults() {
        let config: JobConfig = serde_json::from_str("{}").unwrap();
        assert!(config.enabled);
        assert_eq!(config.days_new, 7);
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn test_job_config_rejects_zero_days() {
        let config = JobConfig { days_new: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_webhook_config_retry_bounds() {
        let mut config = WebhookConfig { enabled: true, base_url: "https://hooks.example.com".into(), ..Default::default() };
        assert!(config.validate().is_ok());
        config.max_retries = 0;
        assert!(config.validate().is_err());
        config.max_retries = 11;
        assert!(config.validate().is_err());
        config.max_retries = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_webhook_config_requires_url_when_enabled() {
        let config = WebhookConfig { enabled: true, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_smtp_secure_flag() {
        let mut smtp = SmtpConfig { port: 465, ..Default::default() };
        assert!(smtp.secure());
        smtp.port = 587;
        assert!(!smtp.secure());
    }

    #[test]
    fn test_email_masked() {
        let config = EmailConfig {
            smtp: SmtpConfig { pass: "hunter2".into(), ..Default::default() },
            ..Default::default()
        };
        assert_eq!(config.masked().smtp.pass, "***");
        assert_eq!(config.smtp.pass, "hunter2");
    }

    #[test]
    fn test_version_check() {
        assert!(check_version(KEY_JOB, CONFIG_VERSION).is_ok());
        assert!(check_version(KEY_JOB, CONFIG_VERSION + 1).is_err());
    }
}
