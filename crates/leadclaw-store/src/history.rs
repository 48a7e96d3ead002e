//! Append-only lead history. Entries are never updated or deleted — the
//! component offers no operation to do so.

use chrono::Utc;
use rusqlite::{Connection, params};

use leadclaw_core::error::Result;
use leadclaw_core::types::{HistoryEntry, HistoryKind};

use crate::{CrmDb, fmt_ts, parse_ts, store_err};

pub fn append_tx(
    conn: &Connection,
    lead_id: &str,
    user_id: Option<&str>,
    kind: HistoryKind,
    content: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO historial (lead_id, usuario_id, tipo, contenido, creado)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![lead_id, user_id, kind.as_str(), content, fmt_ts(&Utc::now())],
    )
    .map_err(|e| store_err("Append history", e))?;
    Ok(conn.last_insert_rowid())
}

pub fn list_for_lead_tx(conn: &Connection, lead_id: &str) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, lead_id, usuario_id, tipo, contenido, creado
             FROM historial WHERE lead_id = ?1 ORDER BY id",
        )
        .map_err(|e| store_err("List history", e))?;
    let rows = stmt
        .query_map(params![lead_id], |row| {
            let tipo: String = row.get(3)?;
            Ok(HistoryEntry {
                id: row.get(0)?,
                lead_id: row.get(1)?,
                user_id: row.get(2)?,
                kind: HistoryKind::parse(&tipo).unwrap_or(HistoryKind::Note),
                content: row.get(4)?,
                created_at: parse_ts(&row.get::<_, String>(5)?),
            })
        })
        .map_err(|e| store_err("List history", e))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| store_err("List history", e))
}

impl CrmDb {
    pub fn append_history(
        &self,
        lead_id: &str,
        user_id: Option<&str>,
        kind: HistoryKind,
        content: &str,
    ) -> Result<i64> {
        append_tx(&*self.lock()?, lead_id, user_id, kind, content)
    }

    pub fn history_for_lead(&self, lead_id: &str) -> Result<Vec<HistoryEntry>> {
        list_for_lead_tx(&*self.lock()?, lead_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_list_in_order() {
        let db = CrmDb::open_in_memory().unwrap();
        let first = db
            .append_history("lead-1", None, HistoryKind::Assignment, "asignado a ana")
            .unwrap();
        let second = db
            .append_history("lead-1", Some("user-9"), HistoryKind::Note, "llamar el lunes")
            .unwrap();
        db.append_history("lead-2", None, HistoryKind::Call, "sin respuesta").unwrap();

        assert!(second > first);
        let entries = db.history_for_lead("lead-1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, HistoryKind::Assignment);
        assert_eq!(entries[1].user_id.as_deref(), Some("user-9"));
    }
}
