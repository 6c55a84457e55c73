//! Append-only audit rows for incident and responder status changes.
//!
//! Rows are written by the recorder in the server crate, always inside the
//! same transaction as the entity update they describe, and never mutated
//! afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{IncidentStatus, ResponderStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentStatusHistory {
    pub id: i64,
    pub incident_id: i64,
    pub status: IncidentStatus,
    pub notes: String,
    pub timestamp: DateTime<Utc>,
}

impl IncidentStatusHistory {
    /// Notes for a history row: the caller's words when given, otherwise the
    /// canonical description of the status.
    pub fn notes_for(status: IncidentStatus, notes: Option<&str>) -> String {
        match notes {
            Some(n) if !n.trim().is_empty() => n.to_string(),
            _ => status.description().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderAvailabilityHistory {
    pub id: i64,
    pub responder_id: i64,
    pub status: ResponderStatus,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notes_fall_back_to_canonical_description() {
        assert_eq!(
            IncidentStatusHistory::notes_for(IncidentStatus::EnRoute, None),
            "Responder is en route"
        );
        assert_eq!(
            IncidentStatusHistory::notes_for(IncidentStatus::EnRoute, Some("  ")),
            "Responder is en route"
        );
        assert_eq!(
            IncidentStatusHistory::notes_for(
                IncidentStatus::OnScene,
                Some("Arrived, assessing two patients")
            ),
            "Arrived, assessing two patients"
        );
    }
}
