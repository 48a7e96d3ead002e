//! Key/value configuration rows.
//!
//! Every setting the core consumes lives in the `configuraciones` table as a
//! JSON blob under a well-known key — including the email config, which older
//! deployments kept in a file next to the process. Typed accessors validate
//! and version-check on the way in and out.

use chrono::Utc;
use rusqlite::{Connection, params};

use leadclaw_core::config::{
    self, EmailConfig, JobConfig, WebhookConfig, KEY_EMAIL, KEY_JOB, KEY_WEBHOOKS,
};
use leadclaw_core::error::{LeadClawError, Result};

use crate::{CrmDb, fmt_ts, store_err};

pub fn get_raw_tx(conn: &Connection, key: &str) -> Result<Option<serde_json::Value>> {
    let mut stmt = conn
        .prepare("SELECT valor FROM configuraciones WHERE clave = ?1")
        .map_err(|e| store_err("Get config", e))?;
    let raw: Option<String> = stmt
        .query_row(params![key], |row| row.get(0))
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(store_err("Get config", other)),
        })?;
    match raw {
        Some(s) => {
            let value = serde_json::from_str(&s).map_err(|e| {
                LeadClawError::Config(format!("config '{key}' is not valid JSON: {e}"))
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

pub fn upsert_raw_tx(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
    description: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO configuraciones (clave, valor, descripcion, actualizado)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(clave) DO UPDATE SET valor = excluded.valor, actualizado = excluded.actualizado",
        params![key, value.to_string(), description, fmt_ts(&Utc::now())],
    )
    .map_err(|e| store_err("Upsert config", e))?;
    Ok(())
}

fn read_typed<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    key: &str,
) -> Result<Option<T>> {
    match get_raw_tx(conn, key)? {
        Some(value) => {
            if let Some(version) = value.get("version").and_then(|v| v.as_u64()) {
                config::check_version(key, version as u32)?;
            }
            let typed = serde_json::from_value(value).map_err(|e| {
                LeadClawError::Config(format!("config '{key}' does not match schema: {e}"))
            })?;
            Ok(Some(typed))
        }
        None => Ok(None),
    }
}

impl CrmDb {
    pub fn get_config_raw(&self, key: &str) -> Result<Option<serde_json::Value>> {
        get_raw_tx(&*self.lock()?, key)
    }

    pub fn upsert_config_raw(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        upsert_raw_tx(&*self.lock()?, key, value, "")
    }

    /// Lifecycle-job settings; written back with defaults on first read.
    pub fn job_config(&self) -> Result<JobConfig> {
        let conn = self.lock()?;
        if let Some(config) = read_typed::<JobConfig>(&conn, KEY_JOB)? {
            return Ok(config);
        }
        let config = JobConfig::default();
        upsert_raw_tx(
            &conn,
            KEY_JOB,
            &serde_json::to_value(&config)?,
            "Configuración para jobs automáticos",
        )?;
        Ok(config)
    }

    pub fn set_job_config(&self, config: &JobConfig) -> Result<()> {
        config.validate()?;
        upsert_raw_tx(
            &*self.lock()?,
            KEY_JOB,
            &serde_json::to_value(config)?,
            "Configuración para jobs automáticos",
        )
    }

    pub fn webhook_config(&self) -> Result<WebhookConfig> {
        Ok(read_typed(&*self.lock()?, KEY_WEBHOOKS)?.unwrap_or_default())
    }

    pub fn set_webhook_config(&self, config: &WebhookConfig) -> Result<()> {
        config.validate()?;
        upsert_raw_tx(
            &*self.lock()?,
            KEY_WEBHOOKS,
            &serde_json::to_value(config)?,
            "Configuración para webhooks salientes",
        )
    }

    pub fn email_config(&self) -> Result<EmailConfig> {
        Ok(read_typed(&*self.lock()?, KEY_EMAIL)?.unwrap_or_default())
    }

    pub fn set_email_config(&self, config: &EmailConfig) -> Result<()> {
        config.validate()?;
        upsert_raw_tx(
            &*self.lock()?,
            KEY_EMAIL,
            &serde_json::to_value(config)?,
            "Configuración SMTP para notificaciones",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_roundtrip_and_upsert() {
        let db = CrmDb::open_in_memory().unwrap();
        assert!(db.get_config_raw("nothing").unwrap().is_none());

        db.upsert_config_raw("k", &json!({"a": 1})).unwrap();
        assert_eq!(db.get_config_raw("k").unwrap().unwrap()["a"], 1);

        db.upsert_config_raw("k", &json!({"a": 2})).unwrap();
        assert_eq!(db.get_config_raw("k").unwrap().unwrap()["a"], 2);
    }

    #[test]
    fn test_job_config_lazily_created() {
        let db = CrmDb::open_in_memory().unwrap();
        let config = db.job_config().unwrap();
        assert!(config.enabled);
        assert_eq!(config.days_new, 7);
        // First read persisted the defaults.
        assert!(db.get_config_raw(KEY_JOB).unwrap().is_some());
    }

    #[test]
    fn test_set_job_config_validates() {
        let db = CrmDb::open_in_memory().unwrap();
        let bad = JobConfig { days_contacted: 0, ..Default::default() };
        assert!(db.set_job_config(&bad).is_err());

        let good = JobConfig { days_new: 3, days_contacted: 21, ..Default::default() };
        db.set_job_config(&good).unwrap();
        let read = db.job_config().unwrap();
        assert_eq!(read.days_new, 3);
        assert_eq!(read.days_contacted, 21);
    }

    #[test]
    fn test_webhook_config_default_when_absent() {
        let db = CrmDb::open_in_memory().unwrap();
        let config = db.webhook_config().unwrap();
        assert!(!config.enabled);
        assert_eq!(config.max_retries, 3);
        // Absent key is not written back for webhooks.
        assert!(db.get_config_raw(KEY_WEBHOOKS).unwrap().is_none());
    }

    #[test]
    fn test_version_gate() {
        let db = CrmDb::open_in_memory().unwrap();
        db.upsert_config_raw(KEY_WEBHOOKS, &json!({"version": 999, "enabled": false}))
            .unwrap();
        assert!(db.webhook_config().is_err());
    }

    #[test]
    fn test_email_config_roundtrip_in_same_store() {
        let db = CrmDb::open_in_memory().unwrap();
        let mut config = EmailConfig::default();
        config.enabled = true;
        config.smtp.host = "smtp.example.com".into();
        config.smtp.user = "crm".into();
        config.smtp.pass = "secret".into();
        db.set_email_config(&config).unwrap();

        let read = db.email_config().unwrap();
        assert_eq!(read.smtp.host, "smtp.example.com");
        assert_eq!(read.smtp.pass, "secret");
        assert!(db.get_config_raw(KEY_EMAIL).unwrap().is_some());
    }
}
