//! Domain data model: leads, assignment rules, history, and delivery logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Funnel state of a lead.
///
/// Persisted with the legacy Spanish discriminants so existing rows and the
/// history messages that cite them stay coherent. Transitions are monotonic:
/// the core never moves a lead backward in the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadState {
    New,
    Uncontacted,
    Contacted,
    Negotiating,
    Won,
    Lost,
}

impl LeadState {
    /// Wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadState::New => "nuevo",
            LeadState::Uncontacted => "no_contactado",
            LeadState::Contacted => "contactado",
            LeadState::Negotiating => "en_negociacion",
            LeadState::Won => "ganado",
            LeadState::Lost => "perdido",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "nuevo" => Some(LeadState::New),
            "no_contactado" => Some(LeadState::Uncontacted),
            "contactado" => Some(LeadState::Contacted),
            "en_negociacion" => Some(LeadState::Negotiating),
            "ganado" => Some(LeadState::Won),
            "perdido" => Some(LeadState::Lost),
            _ => None,
        }
    }

    /// Position along the funnel, used to forbid backward moves.
    fn rank(&self) -> u8 {
        match self {
            LeadState::New => 0,
            LeadState::Uncontacted => 1,
            LeadState::Contacted => 2,
            LeadState::Negotiating => 3,
            LeadState::Won | LeadState::Lost => 4,
        }
    }

    /// True if moving to `next` goes forward (or sideways into a terminal state).
    pub fn can_advance_to(&self, next: LeadState) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for LeadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prospective customer record. The core only ever mutates `state` and
/// `assignee`; everything else belongs to the ingestion/CRUD layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub source: String,
    pub campaign: Option<String>,
    pub state: LeadState,
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// New unassigned lead in the initial state.
    pub fn new(name: &str, email: &str, source: &str, campaign: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            source: source.to_string(),
            campaign: campaign.map(String::from),
            state: LeadState::New,
            assignee: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Maps a (source, campaign) pair to an ordered pool of eligible assignees.
/// A rule with `campaign = None` is the source-level fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRule {
    pub id: i64,
    pub source: String,
    pub campaign: Option<String>,
    /// Ordered, non-empty, unique. Pool order is the tie-break for the
    /// least-loaded pick, so it is load-bearing.
    pub candidates: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a successful automatic assignment.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub assignee: String,
    pub rule_id: i64,
    /// How many leads the chosen candidate already had today, before this one.
    pub prior_count: i64,
}

/// Kind of audit-log entry. Persisted with the legacy discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryKind {
    Note,
    Call,
    Email,
    StateChange,
    Assignment,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::Note => "nota",
            HistoryKind::Call => "llamada",
            HistoryKind::Email => "email",
            HistoryKind::StateChange => "estado",
            HistoryKind::Assignment => "asignacion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "nota" => Some(HistoryKind::Note),
            "llamada" => Some(HistoryKind::Call),
            "email" => Some(HistoryKind::Email),
            "estado" => Some(HistoryKind::StateChange),
            "asignacion" => Some(HistoryKind::Assignment),
            _ => None,
        }
    }
}

/// Immutable audit record of an action taken on a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub lead_id: String,
    pub user_id: Option<String>,
    pub kind: HistoryKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one whole webhook delivery sequence (not one HTTP call).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookLogEntry {
    pub id: i64,
    pub lead_id: String,
    pub url: String,
    pub payload: serde_json::Value,
    /// Final response body — JSON if it parsed, else the raw text or the
    /// transport error message.
    pub response: Option<serde_json::Value>,
    /// 0 when no HTTP response was ever received.
    pub status_code: u16,
    pub attempts: u32,
    pub succeeded: bool,
    pub created_at: DateTime<Utc>,
}

/// One page of webhook log listing.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookLogPage {
    pub entries: Vec<WebhookLogEntry>,
    pub page: u32,
    pub limit: u32,
}

/// Aggregate result of one lifecycle-job run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub new_processed: u32,
    pub contacted_processed: u32,
    pub total_updated: u32,
    /// Leads the scan matched but whose update was lost to a concurrent run
    /// or a per-lead store error. Surfaced for observability.
    pub skipped: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for s in [
            LeadState::New,
            LeadState::Uncontacted,
            LeadState::Contacted,
            LeadState::Negotiating,
            LeadState::Won,
            LeadState::Lost,
        ] {
            assert_eq!(LeadState::parse(s.as_str()), Some(s));
        }
        assert_eq!(LeadState::parse("bogus"), None);
    }

    #[test]
    fn test_state_monotonic() {
        assert!(LeadState::New.can_advance_to(LeadState::Uncontacted));
        assert!(LeadState::Contacted.can_advance_to(LeadState::Negotiating));
        assert!(LeadState::Negotiating.can_advance_to(LeadState::Won));
        // Never backward.
        assert!(!LeadState::Contacted.can_advance_to(LeadState::New));
        assert!(!LeadState::Won.can_advance_to(LeadState::Lost));
    }

    #[test]
    fn test_history_kind_roundtrip() {
        assert_eq!(HistoryKind::parse("asignacion"), Some(HistoryKind::Assignment));
        assert_eq!(HistoryKind::parse("estado"), Some(HistoryKind::StateChange));
        assert_eq!(HistoryKind::Assignment.as_str(), "asignacion");
        assert_eq!(HistoryKind::parse("unknown"), None);
    }

    #[test]
    fn test_new_lead_defaults() {
        let lead = Lead::new("Ana Pérez", "ana@example.com", "facebook", Some("q4"));
        assert_eq!(lead.state, LeadState::New);
        assert!(lead.assignee.is_none());
        assert_eq!(lead.campaign.as_deref(), Some("q4"));
    }
}
