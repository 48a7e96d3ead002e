//! SQLite persistence for the CRM core.
//!
//! One database, one `Connection` behind a `Mutex`, migrated on open. All of
//! the core's state lives here: lead rows, assignment rules, the key/value
//! configuration table, the append-only history log, and webhook delivery
//! logs. Module-level free functions operate on a borrowed connection so the
//! same code runs standalone or inside a transaction via [`CrmDb::with_tx`].

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use leadclaw_core::error::{LeadClawError, Result};

pub mod config;
pub mod history;
pub mod leads;
pub mod rules;
pub mod webhook_log;

/// The CRM database.
pub struct CrmDb {
    conn: Mutex<Connection>,
}

impl CrmDb {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| LeadClawError::Store(format!("DB open: {e}")))?;
        // WAL for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LeadClawError::Store(format!("DB open: {e}")))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// Default database location (~/.leadclaw/crm.db).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".leadclaw")
            .join("crm.db")
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                nombre TEXT NOT NULL,
                email TEXT NOT NULL,
                telefono TEXT,
                origen TEXT NOT NULL,
                campana TEXT,
                estado TEXT NOT NULL DEFAULT 'nuevo',
                responsable TEXT,
                creado TEXT NOT NULL,
                actualizado TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS asignacion_reglas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                origen TEXT NOT NULL,
                campana TEXT,
                grupo_responsables TEXT NOT NULL,  -- JSON array, order is the tie-break
                activa INTEGER NOT NULL DEFAULT 1,
                creado TEXT NOT NULL,
                actualizado TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS configuraciones (
                clave TEXT PRIMARY KEY,
                valor TEXT NOT NULL,      -- JSON blob
                descripcion TEXT DEFAULT '',
                actualizado TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS historial (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lead_id TEXT NOT NULL,
                usuario_id TEXT,
                tipo TEXT NOT NULL,
                contenido TEXT NOT NULL,
                creado TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS webhook_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lead_id TEXT NOT NULL,
                url TEXT NOT NULL,
                payload TEXT NOT NULL,    -- JSON
                respuesta TEXT,           -- JSON, nullable
                status_code INTEGER NOT NULL DEFAULT 0,
                intentos INTEGER NOT NULL DEFAULT 1,
                exitoso INTEGER NOT NULL DEFAULT 0,
                creado TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_leads_estado ON leads(estado);
            CREATE INDEX IF NOT EXISTS idx_leads_responsable ON leads(responsable);
            CREATE INDEX IF NOT EXISTS idx_historial_lead ON historial(lead_id);
            CREATE INDEX IF NOT EXISTS idx_webhook_logs_creado ON webhook_logs(creado);
            ",
        )
        .map_err(|e| LeadClawError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LeadClawError::Store(format!("Lock: {e}")))
    }

    /// Run `f` inside a single transaction. The connection mutex is held for
    /// the whole closure, so a count-then-write sequence inside it cannot
    /// interleave with another in-process writer.
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| LeadClawError::Store(format!("Begin tx: {e}")))?;
        let out = f(&tx)?;
        tx.commit()
            .map_err(|e| LeadClawError::Store(format!("Commit: {e}")))?;
        Ok(out)
    }
}

/// Parse an RFC 3339 column value.
pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Format a timestamp for storage. Millisecond precision with a `Z` suffix so
/// SQLite's date functions can read the column back.
pub(crate) fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub(crate) fn store_err(context: &str, e: rusqlite::Error) -> LeadClawError {
    LeadClawError::Store(format!("{context}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_migrate() {
        let dir = std::env::temp_dir().join("leadclaw-store-open-test");
        std::fs::create_dir_all(&dir).ok();
        let db = CrmDb::open(&dir.join("crm.db")).unwrap();
        // Migration is idempotent
        db.migrate().unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_with_tx_rolls_back_on_error() {
        let db = CrmDb::open_in_memory().unwrap();
        let lead = leadclaw_core::Lead::new("Ana", "ana@example.com", "facebook", None);
        let res: Result<()> = db.with_tx(|tx| {
            leads::insert_lead_tx(tx, &lead)?;
            Err(LeadClawError::Store("boom".into()))
        });
        assert!(res.is_err());
        assert!(db.get_lead(&lead.id).unwrap().is_none());
    }
}
