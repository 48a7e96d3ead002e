//! # LeadClaw Assign
//!
//! Automatic lead assignment. A rule maps a (source, campaign) pair to an
//! ordered pool of candidates; an incoming lead is routed to whichever pool
//! member has the fewest assignments today. The count, the write, and the
//! audit entry run in one transaction so two simultaneous assignments cannot
//! both see the same counts.

use leadclaw_core::error::{LeadClawError, Result};
use leadclaw_core::types::{AssignmentOutcome, AssignmentRule, HistoryKind};
use leadclaw_store::{CrmDb, history, leads, rules};

/// Pick an assignee for a lead and record it.
///
/// Returns `Ok(None)` when no active rule matches — the lead stays
/// unassigned and nothing is written. On success the lead's `responsable` is
/// set and one `asignacion` history entry is appended, atomically.
pub fn select_assignee(
    db: &CrmDb,
    lead_id: &str,
    source: &str,
    campaign: Option<&str>,
) -> Result<Option<AssignmentOutcome>> {
    db.with_tx(|tx| {
        let Some(rule) = rules::find_rule_tx(tx, source, campaign)? else {
            tracing::debug!(lead_id, source, "no assignment rule matches");
            return Ok(None);
        };
        if rule.candidates.is_empty() {
            // Creation-time validation should make this unreachable.
            return Err(LeadClawError::Validation(format!(
                "rule {} has an empty candidate pool",
                rule.id
            )));
        }

        let counts = leads::count_assignments_today_tx(tx, &rule.candidates)?;

        // Strictly-lower scan: the first pool entry wins ties.
        let mut chosen = &rule.candidates[0];
        let mut lowest = counts[chosen];
        for candidate in &rule.candidates {
            if counts[candidate] < lowest {
                lowest = counts[candidate];
                chosen = candidate;
            }
        }

        if !leads::update_lead_assignee_tx(tx, lead_id, chosen)? {
            return Err(LeadClawError::NotFound(format!("lead {lead_id}")));
        }

        let content = format!(
            "Lead asignado automáticamente a {chosen} usando regla {} ({source}/{})",
            rule.id,
            campaign.filter(|c| !c.is_empty()).unwrap_or("general"),
        );
        history::append_tx(tx, lead_id, None, HistoryKind::Assignment, &content)?;

        tracing::info!(lead_id, assignee = %chosen, rule_id = rule.id, prior = lowest, "lead assigned");
        Ok(Some(AssignmentOutcome {
            assignee: chosen.clone(),
            rule_id: rule.id,
            prior_count: lowest,
        }))
    })
}

/// Validate a rule definition before it is persisted.
pub fn validate_rule(source: &str, candidates: &[String]) -> Result<()> {
    if source.trim().is_empty() {
        return Err(LeadClawError::Validation("source is required".into()));
    }
    if candidates.is_empty() {
        return Err(LeadClawError::Validation(
            "candidate pool must not be empty".into(),
        ));
    }
    for candidate in candidates {
        if candidate.trim().is_empty() {
            return Err(LeadClawError::Validation(
                "candidates must be non-blank identifiers".into(),
            ));
        }
    }
    let mut seen = std::collections::HashSet::new();
    for candidate in candidates {
        if !seen.insert(candidate.as_str()) {
            return Err(LeadClawError::Validation(format!(
                "duplicate candidate '{candidate}' in pool"
            )));
        }
    }
    Ok(())
}

/// Create a rule after validating it.
pub fn create_rule(
    db: &CrmDb,
    source: &str,
    campaign: Option<&str>,
    candidates: &[String],
) -> Result<i64> {
    validate_rule(source, candidates)?;
    db.create_rule(source, campaign, candidates)
}

/// Overwrite a rule after validating it. False when the id does not exist.
pub fn update_rule(
    db: &CrmDb,
    id: i64,
    source: &str,
    campaign: Option<&str>,
    candidates: &[String],
    active: bool,
) -> Result<bool> {
    validate_rule(source, candidates)?;
    db.update_rule(id, source, campaign, candidates, active)
}

pub fn list_rules(db: &CrmDb) -> Result<Vec<AssignmentRule>> {
    db.list_active_rules()
}

pub fn delete_rule(db: &CrmDb, id: i64) -> Result<bool> {
    db.delete_rule(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadclaw_core::types::Lead;

    fn pool(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn lead(db: &CrmDb, name: &str, source: &str, campaign: Option<&str>) -> Lead {
        let lead = Lead::new(name, &format!("{name}@example.com"), source, campaign);
        db.insert_lead(&lead).unwrap();
        lead
    }

    #[test]
    fn test_no_rule_leaves_lead_unassigned() {
        let db = CrmDb::open_in_memory().unwrap();
        let l = lead(&db, "solo", "tiktok", None);
        let outcome = select_assignee(&db, &l.id, "tiktok", None).unwrap();
        assert!(outcome.is_none());
        assert!(db.get_lead(&l.id).unwrap().unwrap().assignee.is_none());
        assert!(db.history_for_lead(&l.id).unwrap().is_empty());
    }

    #[test]
    fn test_least_loaded_candidate_wins() {
        let db = CrmDb::open_in_memory().unwrap();
        create_rule(&db, "facebook", None, &pool(&["ana", "luis"])).unwrap();

        // Give ana two assignments today.
        for n in 0..2 {
            let mut l = Lead::new(&format!("prev{n}"), "p@example.com", "facebook", None);
            l.assignee = Some("ana".into());
            db.insert_lead(&l).unwrap();
        }

        // The fallback rule catches an unknown campaign too.
        let l = lead(&db, "fresh", "facebook", Some("q4"));
        let outcome = select_assignee(&db, &l.id, "facebook", Some("q4"))
            .unwrap()
            .unwrap();
        assert_eq!(outcome.assignee, "luis");
        assert_eq!(outcome.prior_count, 0);
        assert_eq!(
            db.get_lead(&l.id).unwrap().unwrap().assignee.as_deref(),
            Some("luis")
        );
    }

    #[test]
    fn test_tie_break_is_pool_order() {
        let db = CrmDb::open_in_memory().unwrap();
        create_rule(&db, "facebook", None, &pool(&["ana", "luis", "eva"])).unwrap();

        let l = lead(&db, "first", "facebook", None);
        let outcome = select_assignee(&db, &l.id, "facebook", None).unwrap().unwrap();
        assert_eq!(outcome.assignee, "ana");
    }

    #[test]
    fn test_round_robin_over_a_day() {
        let db = CrmDb::open_in_memory().unwrap();
        create_rule(&db, "facebook", None, &pool(&["ana", "luis"])).unwrap();

        let mut picks = Vec::new();
        for n in 0..4 {
            let l = lead(&db, &format!("lead{n}"), "facebook", None);
            picks.push(
                select_assignee(&db, &l.id, "facebook", None)
                    .unwrap()
                    .unwrap()
                    .assignee,
            );
        }
        assert_eq!(picks, ["ana", "luis", "ana", "luis"]);
    }

    #[test]
    fn test_exact_rule_preferred_and_history_written() {
        let db = CrmDb::open_in_memory().unwrap();
        create_rule(&db, "facebook", None, &pool(&["ana"])).unwrap();
        let exact = create_rule(&db, "facebook", Some("q4"), &pool(&["luis"])).unwrap();

        let l = lead(&db, "targeted", "facebook", Some("q4"));
        let outcome = select_assignee(&db, &l.id, "facebook", Some("q4"))
            .unwrap()
            .unwrap();
        assert_eq!(outcome.rule_id, exact);
        assert_eq!(outcome.assignee, "luis");

        let history = db.history_for_lead(&l.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, HistoryKind::Assignment);
        assert!(history[0].content.contains("luis"));
        assert!(history[0].content.contains(&format!("regla {exact}")));
        assert!(history[0].content.contains("facebook/q4"));
    }

    #[test]
    fn test_inactive_rule_change_does_not_affect_matching() {
        let db = CrmDb::open_in_memory().unwrap();
        let active = create_rule(&db, "facebook", None, &pool(&["ana"])).unwrap();
        let other = create_rule(&db, "facebook", Some("q4"), &pool(&["luis"])).unwrap();
        // Deactivate the specific rule; the fallback must take over.
        update_rule(&db, other, "facebook", Some("q4"), &pool(&["luis"]), false).unwrap();

        let l = lead(&db, "x", "facebook", Some("q4"));
        let outcome = select_assignee(&db, &l.id, "facebook", Some("q4"))
            .unwrap()
            .unwrap();
        assert_eq!(outcome.rule_id, active);
    }

    #[test]
    fn test_missing_lead_is_not_found() {
        let db = CrmDb::open_in_memory().unwrap();
        create_rule(&db, "facebook", None, &pool(&["ana"])).unwrap();
        let err = select_assignee(&db, "ghost", "facebook", None);
        assert!(matches!(err, Err(LeadClawError::NotFound(_))));
    }

    #[test]
    fn test_rule_validation() {
        assert!(validate_rule("facebook", &pool(&["ana"])).is_ok());
        assert!(validate_rule("", &pool(&["ana"])).is_err());
        assert!(validate_rule("facebook", &[]).is_err());
        assert!(validate_rule("facebook", &pool(&["ana", " "])).is_err());
        assert!(validate_rule("facebook", &pool(&["ana", "ana"])).is_err());
    }
}
