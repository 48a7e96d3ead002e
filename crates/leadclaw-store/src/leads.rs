//! Lead row access: the slice of the lead table the core consumes.
//!
//! The full lead CRUD surface (search, CSV import, enrichment) lives in the
//! API layer; the core only reads leads, advances their state, and writes the
//! assignee.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, params};

use leadclaw_core::error::{LeadClawError, Result};
use leadclaw_core::types::{Lead, LeadState};

use crate::{CrmDb, fmt_ts, parse_ts, store_err};

const LEAD_COLUMNS: &str =
    "id, nombre, email, telefono, origen, campana, estado, responsable, creado, actualizado";

fn row_to_lead(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lead> {
    let estado: String = row.get(6)?;
    Ok(Lead {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        source: row.get(4)?,
        campaign: row.get(5)?,
        state: LeadState::parse(&estado).unwrap_or(LeadState::New),
        assignee: row.get(7)?,
        created_at: parse_ts(&row.get::<_, String>(8)?),
        updated_at: parse_ts(&row.get::<_, String>(9)?),
    })
}

pub fn insert_lead_tx(conn: &Connection, lead: &Lead) -> Result<()> {
    conn.execute(
        "INSERT INTO leads (id, nombre, email, telefono, origen, campana, estado, responsable, creado, actualizado)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            lead.id,
            lead.name,
            lead.email,
            lead.phone,
            lead.source,
            lead.campaign,
            lead.state.as_str(),
            lead.assignee,
            fmt_ts(&lead.created_at),
            fmt_ts(&lead.updated_at),
        ],
    )
    .map_err(|e| store_err("Insert lead", e))?;
    Ok(())
}

pub fn get_lead_tx(conn: &Connection, id: &str) -> Result<Option<Lead>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"))
        .map_err(|e| store_err("Get lead", e))?;
    let lead = stmt
        .query_row(params![id], row_to_lead)
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(store_err("Get lead", other)),
        })?;
    Ok(lead)
}

/// Conditionally advance a lead's state. The `WHERE estado = expected` guard
/// makes concurrent job runs lose cleanly instead of double-transitioning.
/// Returns false when the guard missed (row gone or state already changed).
pub fn update_lead_state_tx(
    conn: &Connection,
    id: &str,
    expected: LeadState,
    next: LeadState,
) -> Result<bool> {
    if !expected.can_advance_to(next) {
        return Err(LeadClawError::Validation(format!(
            "illegal transition {expected} -> {next}"
        )));
    }
    let affected = conn
        .execute(
            "UPDATE leads SET estado = ?1, actualizado = ?2 WHERE id = ?3 AND estado = ?4",
            params![next.as_str(), fmt_ts(&Utc::now()), id, expected.as_str()],
        )
        .map_err(|e| store_err("Update lead state", e))?;
    Ok(affected > 0)
}

pub fn update_lead_assignee_tx(conn: &Connection, id: &str, assignee: &str) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE leads SET responsable = ?1, actualizado = ?2 WHERE id = ?3",
            params![assignee, fmt_ts(&Utc::now()), id],
        )
        .map_err(|e| store_err("Update lead assignee", e))?;
    Ok(affected > 0)
}

/// Leads sitting in `state` longer than `threshold_days`.
///
/// Age is measured from creation for `nuevo` and from the last update for
/// `contactado` — the two phases the lifecycle job scans.
pub fn stale_leads_tx(
    conn: &Connection,
    state: LeadState,
    threshold_days: u32,
) -> Result<Vec<Lead>> {
    let age_column = match state {
        LeadState::New => "creado",
        LeadState::Contacted => "actualizado",
        other => {
            return Err(LeadClawError::Validation(format!(
                "no staleness scan defined for state '{other}'"
            )));
        }
    };
    let sql = format!(
        "SELECT {LEAD_COLUMNS} FROM leads
         WHERE estado = ?1 AND julianday('now') - julianday({age_column}) > ?2
         ORDER BY {age_column}"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| store_err("Stale leads", e))?;
    let rows = stmt
        .query_map(params![state.as_str(), threshold_days], row_to_lead)
        .map_err(|e| store_err("Stale leads", e))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| store_err("Stale leads", e))
}

/// Per-candidate count of leads assigned today (server-local calendar day).
/// Every requested candidate appears in the map; absent rows count as 0.
pub fn count_assignments_today_tx(
    conn: &Connection,
    candidates: &[String],
) -> Result<HashMap<String, i64>> {
    let mut counts: HashMap<String, i64> =
        candidates.iter().map(|c| (c.clone(), 0)).collect();
    if candidates.is_empty() {
        return Ok(counts);
    }
    let placeholders = candidates
        .iter()
        .enumerate()
        .map(|(i, _)| format!("?{}", i + 1))
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT responsable, COUNT(*) FROM leads
         WHERE responsable IN ({placeholders})
         AND date(creado, 'localtime') = date('now', 'localtime')
         GROUP BY responsable"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| store_err("Count assignments", e))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(candidates.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(|e| store_err("Count assignments", e))?;
    for row in rows {
        let (who, n) = row.map_err(|e| store_err("Count assignments", e))?;
        counts.insert(who, n);
    }
    Ok(counts)
}

impl CrmDb {
    pub fn insert_lead(&self, lead: &Lead) -> Result<()> {
        insert_lead_tx(&*self.lock()?, lead)
    }

    pub fn get_lead(&self, id: &str) -> Result<Option<Lead>> {
        get_lead_tx(&*self.lock()?, id)
    }

    pub fn update_lead_state(&self, id: &str, expected: LeadState, next: LeadState) -> Result<bool> {
        update_lead_state_tx(&*self.lock()?, id, expected, next)
    }

    pub fn update_lead_assignee(&self, id: &str, assignee: &str) -> Result<bool> {
        update_lead_assignee_tx(&*self.lock()?, id, assignee)
    }

    pub fn stale_leads(&self, state: LeadState, threshold_days: u32) -> Result<Vec<Lead>> {
        stale_leads_tx(&*self.lock()?, state, threshold_days)
    }

    pub fn count_assignments_today(&self, candidates: &[String]) -> Result<HashMap<String, i64>> {
        count_assignments_today_tx(&*self.lock()?, candidates)
    }
}
