//! # LeadClaw Jobs
//!
//! The lead lifecycle job: scans for leads that sat too long in a state and
//! advances them, recording history per transition. Runs on demand or on a
//! tokio interval. Stateless — each run is a pure function of the store and
//! the persisted [`JobConfig`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use leadclaw_core::error::Result;
use leadclaw_core::types::{HistoryKind, JobReport, LeadState};
use leadclaw_store::CrmDb;

/// Run both transition phases once.
///
/// Disabled config returns an all-zero report without touching any lead.
/// Per-lead failures (store errors, or the conditional-update guard losing to
/// a concurrent run) are logged, counted in `skipped`, and never abort the
/// batch. Immediately re-running after a successful run processes zero leads:
/// the transitioned rows no longer match the scan predicates.
pub fn run_state_transition_job(db: &CrmDb) -> Result<JobReport> {
    let config = db.job_config()?;
    if !config.enabled {
        tracing::info!("lifecycle job disabled, skipping run");
        return Ok(JobReport::default());
    }

    let mut report = JobReport::default();

    report.new_processed = advance_stale(
        db,
        LeadState::New,
        LeadState::Uncontacted,
        config.days_new,
        &format!(
            "Estado cambiado automáticamente de 'nuevo' a 'no_contactado' por inactividad de {} días",
            config.days_new
        ),
        &mut report,
    )?;

    report.contacted_processed = advance_stale(
        db,
        LeadState::Contacted,
        LeadState::Negotiating,
        config.days_contacted,
        &format!(
            "Estado cambiado automáticamente de 'contactado' a 'en_negociacion' por tiempo transcurrido de {} días",
            config.days_contacted
        ),
        &mut report,
    )?;

    tracing::info!(
        new = report.new_processed,
        contacted = report.contacted_processed,
        skipped = report.skipped,
        "lifecycle job finished"
    );
    Ok(report)
}

/// One phase: scan, then best-effort transition each matched lead.
fn advance_stale(
    db: &CrmDb,
    from: LeadState,
    to: LeadState,
    threshold_days: u32,
    message: &str,
    report: &mut JobReport,
) -> Result<u32> {
    let stale = db.stale_leads(from, threshold_days)?;
    let mut processed = 0u32;

    for lead in stale {
        match db.update_lead_state(&lead.id, from, to) {
            Ok(true) => {
                processed += 1;
                report.total_updated += 1;
                if let Err(e) =
                    db.append_history(&lead.id, None, HistoryKind::StateChange, message)
                {
                    // State already advanced; losing the audit line is the
                    // lesser evil compared to re-running the transition.
                    tracing::warn!(lead_id = %lead.id, "history append failed: {e}");
                }
            }
            Ok(false) => {
                // Guard missed: a concurrent run got there first.
                tracing::warn!(lead_id = %lead.id, %from, %to, "transition lost, already moved");
                report.skipped += 1;
            }
            Err(e) => {
                tracing::warn!(lead_id = %lead.id, "transition failed: {e}");
                report.skipped += 1;
            }
        }
    }
    Ok(processed)
}

/// Run the job on a fixed interval until the token is cancelled.
pub async fn spawn_job_loop(
    db: Arc<CrmDb>,
    check_interval_secs: u64,
    shutdown: CancellationToken,
) {
    tracing::info!("lifecycle job loop started (every {check_interval_secs}s)");
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(check_interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match run_state_transition_job(&db) {
                    Ok(report) if report.total_updated > 0 => {
                        tracing::info!(updated = report.total_updated, "leads transitioned");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("lifecycle job run failed: {e}"),
                }
            }
            _ = shutdown.cancelled() => {
                tracing::info!("lifecycle job loop stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use leadclaw_core::config::JobConfig;
    use leadclaw_core::types::Lead;

    fn aged_lead(db: &CrmDb, name: &str, state: LeadState, days_old: i64) -> Lead {
        let mut lead = Lead::new(name, &format!("{name}@example.com"), "facebook", None);
        lead.state = state;
        lead.created_at = Utc::now() - Duration::days(days_old);
        lead.updated_at = lead.created_at;
        db.insert_lead(&lead).unwrap();
        lead
    }

    #[test]
    fn test_stale_new_lead_becomes_uncontacted() {
        let db = CrmDb::open_in_memory().unwrap();
        let lead = aged_lead(&db, "old", LeadState::New, 10);

        let report = run_state_transition_job(&db).unwrap();
        assert_eq!(report.new_processed, 1);
        assert_eq!(report.total_updated, 1);
        assert_eq!(report.skipped, 0);

        let got = db.get_lead(&lead.id).unwrap().unwrap();
        assert_eq!(got.state, LeadState::Uncontacted);

        let history = db.history_for_lead(&lead.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, HistoryKind::StateChange);
        assert!(history[0].content.contains("7 días"));
    }

    #[test]
    fn test_stale_contacted_lead_enters_negotiation() {
        let db = CrmDb::open_in_memory().unwrap();
        let lead = aged_lead(&db, "quiet", LeadState::Contacted, 20);

        let report = run_state_transition_job(&db).unwrap();
        assert_eq!(report.contacted_processed, 1);
        assert_eq!(
            db.get_lead(&lead.id).unwrap().unwrap().state,
            LeadState::Negotiating
        );
        let history = db.history_for_lead(&lead.id).unwrap();
        assert!(history[0].content.contains("14 días"));
    }

    #[test]
    fn test_fresh_leads_untouched() {
        let db = CrmDb::open_in_memory().unwrap();
        aged_lead(&db, "fresh", LeadState::New, 2);
        aged_lead(&db, "recent", LeadState::Contacted, 5);

        let report = run_state_transition_job(&db).unwrap();
        assert_eq!(report, JobReport::default());
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let db = CrmDb::open_in_memory().unwrap();
        aged_lead(&db, "old", LeadState::New, 10);
        aged_lead(&db, "quiet", LeadState::Contacted, 20);

        let first = run_state_transition_job(&db).unwrap();
        assert_eq!(first.total_updated, 2);

        let second = run_state_transition_job(&db).unwrap();
        assert_eq!(second, JobReport::default());
    }

    #[test]
    fn test_disabled_config_is_a_noop() {
        let db = CrmDb::open_in_memory().unwrap();
        let lead = aged_lead(&db, "old", LeadState::New, 30);
        db.set_job_config(&JobConfig { enabled: false, ..Default::default() })
            .unwrap();

        let report = run_state_transition_job(&db).unwrap();
        assert_eq!(report, JobReport::default());
        assert_eq!(db.get_lead(&lead.id).unwrap().unwrap().state, LeadState::New);
        assert!(db.history_for_lead(&lead.id).unwrap().is_empty());
    }

    #[test]
    fn test_custom_thresholds_respected() {
        let db = CrmDb::open_in_memory().unwrap();
        aged_lead(&db, "three-days", LeadState::New, 4);
        db.set_job_config(&JobConfig { days_new: 3, ..Default::default() })
            .unwrap();

        let report = run_state_transition_job(&db).unwrap();
        assert_eq!(report.new_processed, 1);
    }
}
