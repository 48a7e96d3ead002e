//! Assignment email over SMTP.
//!
//! Best-effort, single attempt: a missing/disabled config or a transport
//! failure yields `Ok(false)`, never an error and never a retry. The lettre
//! transport is built on first use and swapped whole when the configuration
//! changes.

use std::sync::Arc;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncTransport, Message};

use leadclaw_core::config::EmailConfig;
use leadclaw_core::error::{LeadClawError, Result};

use crate::{Dispatcher, Mailer};

/// Mailbox for an assignee identifier: used verbatim if it already looks
/// like an address, else completed with the organization domain.
pub(crate) fn resolve_recipient(assignee: &str, org_domain: &str) -> String {
    if assignee.contains('@') {
        assignee.to_string()
    } else {
        format!("{assignee}@{org_domain}")
    }
}

fn build_mailer(config: &EmailConfig) -> Result<Mailer> {
    // Port 465 is implicit TLS; everything else negotiates STARTTLS.
    let builder = if config.smtp.secure() {
        Mailer::relay(&config.smtp.host)
    } else {
        Mailer::starttls_relay(&config.smtp.host)
    }
    .map_err(|e| LeadClawError::Notify(format!("SMTP relay: {e}")))?;

    Ok(builder
        .port(config.smtp.port)
        .credentials(Credentials::new(
            config.smtp.user.clone(),
            config.smtp.pass.clone(),
        ))
        .build())
}

impl Dispatcher {
    /// Current transport, built lazily from the persisted config.
    /// `None` when email is disabled or unconfigured.
    fn mail_transport(&self, config: &EmailConfig) -> Result<Option<Arc<Mailer>>> {
        if let Some(mailer) = self.mailer.read().expect("mailer lock").as_ref() {
            return Ok(Some(mailer.clone()));
        }
        if !config.enabled || config.smtp.host.trim().is_empty() {
            return Ok(None);
        }
        let mailer = Arc::new(build_mailer(config)?);
        *self.mailer.write().expect("mailer lock") = Some(mailer.clone());
        Ok(Some(mailer))
    }

    /// Drop the cached transport and rebuild it from the stored config.
    /// Call after the email configuration changes.
    pub fn reinitialize_mailer(&self) -> Result<()> {
        *self.mailer.write().expect("mailer lock") = None;
        let config = self.db.email_config()?;
        if config.enabled && !config.smtp.host.trim().is_empty() {
            let mailer = Arc::new(build_mailer(&config)?);
            *self.mailer.write().expect("mailer lock") = Some(mailer);
        }
        Ok(())
    }

    /// Send a plain test message to verify the SMTP settings.
    pub async fn send_test_email(&self, to: &str) -> Result<bool> {
        let config = self.db.email_config()?;
        let Some(mailer) = self.mail_transport(&config)? else {
            tracing::debug!("SMTP not configured, cannot send test email");
            return Ok(false);
        };

        let recipient = resolve_recipient(to, &config.org_domain);
        let (to, from) = match (recipient.parse::<Mailbox>(), config.from.parse::<Mailbox>()) {
            (Ok(to), Ok(from)) => (to, from),
            _ => {
                tracing::error!(recipient, from = %config.from, "invalid test email addresses");
                return Ok(false);
            }
        };
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject("Prueba de configuración SMTP")
            .header(ContentType::TEXT_PLAIN)
            .body(String::from(
                "Este es un correo de prueba. La configuración SMTP funciona correctamente.",
            ))
            .map_err(|e| LeadClawError::Notify(format!("Build email: {e}")))?;

        match mailer.send(message).await {
            Ok(_) => {
                tracing::info!(recipient, "test email sent");
                Ok(true)
            }
            Err(e) => {
                tracing::error!(recipient, "test email failed: {e}");
                Ok(false)
            }
        }
    }

    /// Notify an assignee about their new lead. Single attempt; returns
    /// whether the mail went out.
    pub async fn send_assignment_email(&self, lead_id: &str, assignee: &str) -> Result<bool> {
        let config = self.db.email_config()?;
        let Some(mailer) = self.mail_transport(&config)? else {
            tracing::debug!("SMTP not configured, skipping assignment email");
            return Ok(false);
        };

        let Some(lead) = self.db.get_lead(lead_id)? else {
            tracing::warn!(lead_id, "assignment email for unknown lead");
            return Ok(false);
        };

        let recipient = resolve_recipient(assignee, &config.org_domain);
        let to: Mailbox = match recipient.parse() {
            Ok(mb) => mb,
            Err(e) => {
                tracing::error!(recipient, "invalid recipient address: {e}");
                return Ok(false);
            }
        };
        let from: Mailbox = match config.from.parse() {
            Ok(mb) => mb,
            Err(e) => {
                tracing::error!(from = %config.from, "invalid sender address: {e}");
                return Ok(false);
            }
        };

        let body = format!(
            "Nuevo lead asignado\n\nNombre: {}\nEmail: {}\nTeléfono: {}\nOrigen: {}\n",
            lead.name,
            lead.email,
            lead.phone.as_deref().unwrap_or("No proporcionado"),
            lead.source,
        );
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(format!("Nuevo lead asignado: {}", lead.name))
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| LeadClawError::Notify(format!("Build email: {e}")))?;

        match mailer.send(message).await {
            Ok(_) => {
                tracing::info!(lead_id, recipient, "assignment email sent");
                Ok(true)
            }
            Err(e) => {
                tracing::error!(lead_id, recipient, "assignment email failed: {e}");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadclaw_store::CrmDb;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_resolve_recipient() {
        assert_eq!(
            resolve_recipient("ana@partner.io", "empresa.com"),
            "ana@partner.io"
        );
        assert_eq!(resolve_recipient("luis", "empresa.com"), "luis@empresa.com");
    }

    #[tokio::test]
    async fn test_unconfigured_email_returns_false() {
        let db = Arc::new(CrmDb::open_in_memory().unwrap());
        let lead = leadclaw_core::Lead::new("Ana", "ana@example.com", "facebook", None);
        db.insert_lead(&lead).unwrap();

        let dispatcher = Dispatcher::new(db, CancellationToken::new());
        let sent = dispatcher.send_assignment_email(&lead.id, "luis").await.unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_reinitialize_without_config_clears_mailer() {
        let db = Arc::new(CrmDb::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new(db, CancellationToken::new());
        dispatcher.reinitialize_mailer().unwrap();
        assert!(dispatcher.mailer.read().unwrap().is_none());
    }
}
