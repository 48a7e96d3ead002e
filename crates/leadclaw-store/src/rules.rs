//! Assignment rule rows. The candidate pool is a JSON-encoded column whose
//! order is preserved — it is the tie-break for the least-loaded pick.

use chrono::Utc;
use rusqlite::{Connection, params};

use leadclaw_core::error::Result;
use leadclaw_core::types::AssignmentRule;

use crate::{CrmDb, fmt_ts, parse_ts, store_err};

const RULE_COLUMNS: &str = "id, origen, campana, grupo_responsables, activa, creado, actualizado";

fn row_to_rule(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssignmentRule> {
    let pool_json: String = row.get(3)?;
    Ok(AssignmentRule {
        id: row.get(0)?,
        source: row.get(1)?,
        campaign: row.get(2)?,
        candidates: serde_json::from_str(&pool_json).unwrap_or_default(),
        active: row.get::<_, i64>(4)? != 0,
        created_at: parse_ts(&row.get::<_, String>(5)?),
        updated_at: parse_ts(&row.get::<_, String>(6)?),
    })
}

pub fn create_rule_tx(
    conn: &Connection,
    source: &str,
    campaign: Option<&str>,
    candidates: &[String],
) -> Result<i64> {
    let now = fmt_ts(&Utc::now());
    conn.execute(
        "INSERT INTO asignacion_reglas (origen, campana, grupo_responsables, activa, creado, actualizado)
         VALUES (?1, ?2, ?3, 1, ?4, ?4)",
        params![source, campaign, serde_json::to_string(candidates)?, now],
    )
    .map_err(|e| store_err("Create rule", e))?;
    Ok(conn.last_insert_rowid())
}

/// Active rules, newest first.
pub fn list_active_rules_tx(conn: &Connection) -> Result<Vec<AssignmentRule>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM asignacion_reglas WHERE activa = 1 ORDER BY id DESC"
        ))
        .map_err(|e| store_err("List rules", e))?;
    let rows = stmt
        .query_map([], row_to_rule)
        .map_err(|e| store_err("List rules", e))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| store_err("List rules", e))
}

/// Full overwrite of a rule. Returns false when the id does not exist.
pub fn update_rule_tx(
    conn: &Connection,
    id: i64,
    source: &str,
    campaign: Option<&str>,
    candidates: &[String],
    active: bool,
) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE asignacion_reglas
             SET origen = ?1, campana = ?2, grupo_responsables = ?3, activa = ?4, actualizado = ?5
             WHERE id = ?6",
            params![
                source,
                campaign,
                serde_json::to_string(candidates)?,
                active as i64,
                fmt_ts(&Utc::now()),
                id
            ],
        )
        .map_err(|e| store_err("Update rule", e))?;
    Ok(affected > 0)
}

/// Returns false when the id does not exist.
pub fn delete_rule_tx(conn: &Connection, id: i64) -> Result<bool> {
    let affected = conn
        .execute("DELETE FROM asignacion_reglas WHERE id = ?1", params![id])
        .map_err(|e| store_err("Delete rule", e))?;
    Ok(affected > 0)
}

/// Most specific active rule for a (source, campaign) pair: the exact match
/// wins; otherwise the source-level fallback (campaign NULL or ''). Newest
/// rule wins when several qualify.
pub fn find_rule_tx(
    conn: &Connection,
    source: &str,
    campaign: Option<&str>,
) -> Result<Option<AssignmentRule>> {
    if let Some(campaign) = campaign {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RULE_COLUMNS} FROM asignacion_reglas
                 WHERE origen = ?1 AND campana = ?2 AND activa = 1
                 ORDER BY id DESC LIMIT 1"
            ))
            .map_err(|e| store_err("Find rule", e))?;
        let exact = stmt
            .query_row(params![source, campaign], row_to_rule)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(store_err("Find rule", other)),
            })?;
        if exact.is_some() {
            return Ok(exact);
        }
    }
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM asignacion_reglas
             WHERE origen = ?1 AND (campana IS NULL OR campana = '') AND activa = 1
             ORDER BY id DESC LIMIT 1"
        ))
        .map_err(|e| store_err("Find rule", e))?;
    stmt.query_row(params![source], row_to_rule)
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(store_err("Find rule", other)),
        })
}

impl CrmDb {
    pub fn create_rule(
        &self,
        source: &str,
        campaign: Option<&str>,
        candidates: &[String],
    ) -> Result<i64> {
        create_rule_tx(&*self.lock()?, source, campaign, candidates)
    }

    pub fn list_active_rules(&self) -> Result<Vec<AssignmentRule>> {
        list_active_rules_tx(&*self.lock()?)
    }

    pub fn update_rule(
        &self,
        id: i64,
        source: &str,
        campaign: Option<&str>,
        candidates: &[String],
        active: bool,
    ) -> Result<bool> {
        update_rule_tx(&*self.lock()?, id, source, campaign, candidates, active)
    }

    pub fn delete_rule(&self, id: i64) -> Result<bool> {
        delete_rule_tx(&*self.lock()?, id)
    }

    pub fn find_rule(&self, source: &str, campaign: Option<&str>) -> Result<Option<AssignmentRule>> {
        find_rule_tx(&*self.lock()?, source, campaign)
    }
}
