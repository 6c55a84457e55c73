//! Incident model and creation-time validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::severity::Severity;
use crate::status::IncidentStatus;

// ============================================================================
// Incident Type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    Medical,
    Fire,
    Accident,
    Crime,
    Natural,
    Other,
}

impl IncidentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::Medical => "medical",
            IncidentType::Fire => "fire",
            IncidentType::Accident => "accident",
            IncidentType::Crime => "crime",
            IncidentType::Natural => "natural",
            IncidentType::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "medical" => Some(IncidentType::Medical),
            "fire" => Some(IncidentType::Fire),
            "accident" => Some(IncidentType::Accident),
            "crime" => Some(IncidentType::Crime),
            "natural" => Some(IncidentType::Natural),
            "other" => Some(IncidentType::Other),
            _ => None,
        }
    }

    /// Human-readable form used in notifications and listings.
    pub fn label(&self) -> &'static str {
        match self {
            IncidentType::Medical => "Medical Emergency",
            IncidentType::Fire => "Fire Hazard",
            IncidentType::Accident => "Accident",
            IncidentType::Crime => "Crime/Security",
            IncidentType::Natural => "Natural Disaster",
            IncidentType::Other => "Other",
        }
    }
}

impl std::fmt::Display for IncidentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Incident
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub reporter_id: i64,
    pub assigned_responder_id: Option<i64>,
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub location: String,
    pub description: String,
    pub contact_phone: String,
    pub people_involved: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub immediate_action: Option<String>,
    pub status: IncidentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    /// Display reference, e.g. INC-007.
    pub fn incident_ref(&self) -> String {
        format!("INC-{:03}", self.id)
    }

    /// Apply a status and keep `resolved_at` consistent with it.
    ///
    /// `resolved_at` is an invariant of the status, not a one-shot event:
    /// entering resolved stamps it once, any open or active status clears it
    /// so reopened incidents read as unresolved, and closing keeps whatever
    /// stamp the incident carried.
    pub fn apply_status(&mut self, status: IncidentStatus, now: DateTime<Utc>) {
        self.status = status;
        match status {
            IncidentStatus::Resolved => {
                if self.resolved_at.is_none() {
                    self.resolved_at = Some(now);
                }
            }
            IncidentStatus::Closed => {}
            _ => self.resolved_at = None,
        }
        self.updated_at = now;
    }
}

// ============================================================================
// New Incident
// ============================================================================

fn default_people_involved() -> u32 {
    1
}

/// Input for reporting a new incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIncident {
    pub reporter_id: i64,
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub location: String,
    pub description: String,
    pub contact_phone: String,
    #[serde(default = "default_people_involved")]
    pub people_involved: u32,
    #[serde(default)]
    pub immediate_action: Option<String>,
}

impl NewIncident {
    /// Reject the report before anything is written: every required field
    /// must be present and the contact phone must be exactly ten digits.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.location.trim().is_empty() {
            return Err(WorkflowError::validation("Location is required"));
        }
        if self.description.trim().is_empty() {
            return Err(WorkflowError::validation("Description is required"));
        }
        if self.people_involved == 0 {
            return Err(WorkflowError::validation(
                "At least one person must be involved",
            ));
        }
        if self.contact_phone.len() != 10
            || !self.contact_phone.chars().all(|c| c.is_ascii_digit())
        {
            return Err(WorkflowError::validation(
                "Contact phone must be a 10-digit number",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
