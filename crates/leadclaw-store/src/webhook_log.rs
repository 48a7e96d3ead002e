//! Webhook delivery log. One row per logical delivery sequence — the retry
//! engine writes it once, after the final attempt.

use chrono::Utc;
use rusqlite::{Connection, params};

use leadclaw_core::error::Result;
use leadclaw_core::types::{WebhookLogEntry, WebhookLogPage};

use crate::{CrmDb, fmt_ts, parse_ts, store_err};

#[allow(clippy::too_many_arguments)]
pub fn insert_log_tx(
    conn: &Connection,
    lead_id: &str,
    url: &str,
    payload: &serde_json::Value,
    response: Option<&serde_json::Value>,
    status_code: u16,
    attempts: u32,
    succeeded: bool,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO webhook_logs (lead_id, url, payload, respuesta, status_code, intentos, exitoso, creado)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            lead_id,
            url,
            payload.to_string(),
            response.map(|r| r.to_string()),
            status_code,
            attempts,
            succeeded as i64,
            fmt_ts(&Utc::now()),
        ],
    )
    .map_err(|e| store_err("Insert webhook log", e))?;
    Ok(conn.last_insert_rowid())
}

/// Newest-first page of delivery logs. `page` is 1-based.
pub fn list_logs_tx(conn: &Connection, page: u32, limit: u32) -> Result<WebhookLogPage> {
    let page = page.max(1);
    let limit = limit.max(1);
    let offset = (page - 1) * limit;
    let mut stmt = conn
        .prepare(
            "SELECT id, lead_id, url, payload, respuesta, status_code, intentos, exitoso, creado
             FROM webhook_logs ORDER BY id DESC LIMIT ?1 OFFSET ?2",
        )
        .map_err(|e| store_err("List webhook logs", e))?;
    let rows = stmt
        .query_map(params![limit, offset], |row| {
            let payload: String = row.get(3)?;
            let response: Option<String> = row.get(4)?;
            Ok(WebhookLogEntry {
                id: row.get(0)?,
                lead_id: row.get(1)?,
                url: row.get(2)?,
                payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                response: response.and_then(|r| serde_json::from_str(&r).ok()),
                status_code: row.get::<_, i64>(5)? as u16,
                attempts: row.get::<_, i64>(6)? as u32,
                succeeded: row.get::<_, i64>(7)? != 0,
                created_at: parse_ts(&row.get::<_, String>(8)?),
            })
        })
        .map_err(|e| store_err("List webhook logs", e))?;
    let entries = rows
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| store_err("List webhook logs", e))?;
    Ok(WebhookLogPage { entries, page, limit })
}

impl CrmDb {
    #[allow(clippy::too_many_arguments)]
    pub fn insert_webhook_log(
        &self,
        lead_id: &str,
        url: &str,
        payload: &serde_json::Value,
        response: Option<&serde_json::Value>,
        status_code: u16,
        attempts: u32,
        succeeded: bool,
    ) -> Result<i64> {
        insert_log_tx(
            &*self.lock()?,
            lead_id,
            url,
            payload,
            response,
            status_code,
            attempts,
            succeeded,
        )
    }

    pub fn webhook_logs(&self, page: u32, limit: u32) -> Result<WebhookLogPage> {
        list_logs_tx(&*self.lock()?, page, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_page_newest_first() {
        let db = CrmDb::open_in_memory().unwrap();
        for i in 0..5 {
            db.insert_webhook_log(
                &format!("lead-{i}"),
                "https://hooks.example.com/crm",
                &json!({"evento": "lead_asignado", "n": i}),
                Some(&json!({"ok": true})),
                200,
                1,
                true,
            )
            .unwrap();
        }

        let page = db.webhook_logs(1, 2).unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].payload["n"], 4);
        assert_eq!(page.entries[1].payload["n"], 3);

        let page3 = db.webhook_logs(3, 2).unwrap();
        assert_eq!(page3.entries.len(), 1);
        assert_eq!(page3.entries[0].payload["n"], 0);
    }

    #[test]
    fn test_failed_delivery_row() {
        let db = CrmDb::open_in_memory().unwrap();
        db.insert_webhook_log(
            "lead-1",
            "https://hooks.example.com/crm",
            &json!({"evento": "test_webhook"}),
            Some(&json!("connection refused")),
            0,
            3,
            false,
        )
        .unwrap();

        let page = db.webhook_logs(1, 10).unwrap();
        let entry = &page.entries[0];
        assert!(!entry.succeeded);
        assert_eq!(entry.attempts, 3);
        assert_eq!(entry.status_code, 0);
        assert_eq!(entry.response, Some(json!("connection refused")));
    }
}
