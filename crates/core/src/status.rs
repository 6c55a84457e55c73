//! Status vocabularies for incidents and responders, and the rules for
//! moving between them.
//!
//! The incident pipeline is linear:
//! open -> en_route -> on_scene -> providing_aid -> transporting -> resolved,
//! with `closed` as an administrative terminal reachable from any state and
//! `in_progress` as the marker applied when an administrator assigns a
//! responder to an open incident.

use serde::{Deserialize, Serialize};

// ============================================================================
// Incident Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Reported, waiting for a responder
    Open,
    /// Administratively assigned, not yet dispatched
    InProgress,
    /// Responder heading to the location
    EnRoute,
    /// Responder on scene
    OnScene,
    /// Aid being given
    ProvidingAid,
    /// Patient being transported
    Transporting,
    /// Completed by the responder
    Resolved,
    /// Closed administratively
    Closed,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::InProgress => "in_progress",
            IncidentStatus::EnRoute => "en_route",
            IncidentStatus::OnScene => "on_scene",
            IncidentStatus::ProvidingAid => "providing_aid",
            IncidentStatus::Transporting => "transporting",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(IncidentStatus::Open),
            "in_progress" => Some(IncidentStatus::InProgress),
            "en_route" => Some(IncidentStatus::EnRoute),
            "on_scene" => Some(IncidentStatus::OnScene),
            "providing_aid" => Some(IncidentStatus::ProvidingAid),
            "transporting" => Some(IncidentStatus::Transporting),
            "resolved" => Some(IncidentStatus::Resolved),
            "closed" => Some(IncidentStatus::Closed),
            _ => None,
        }
    }

    /// Human-readable form for messages and listings.
    pub fn label(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "Open",
            IncidentStatus::InProgress => "In Progress",
            IncidentStatus::EnRoute => "En Route",
            IncidentStatus::OnScene => "On Scene",
            IncidentStatus::ProvidingAid => "Providing Aid",
            IncidentStatus::Transporting => "Transporting",
            IncidentStatus::Resolved => "Resolved",
            IncidentStatus::Closed => "Closed",
        }
    }

    /// Canonical audit-trail description recorded when no caller notes are
    /// supplied.
    pub fn description(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "Incident reported and open",
            IncidentStatus::InProgress => "Incident under review",
            IncidentStatus::EnRoute => "Responder is en route",
            IncidentStatus::OnScene => "Responder arrived on scene",
            IncidentStatus::ProvidingAid => "Responder is providing aid",
            IncidentStatus::Transporting => "Transporting patient to hospital",
            IncidentStatus::Resolved => "Incident resolved",
            IncidentStatus::Closed => "Case closed",
        }
    }

    /// Terminal incidents only change through an administrative override.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::Closed)
    }

    /// Active = assigned work in flight: anything but open, resolved, closed.
    /// An incident in an active status counts toward its responder's
    /// single-active-assignment limit.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            IncidentStatus::Open | IncidentStatus::Resolved | IncidentStatus::Closed
        )
    }

    /// Position in the responder pipeline. Open and in_progress both sit
    /// before dispatch; closed is not on the pipeline at all.
    fn pipeline_rank(&self) -> Option<u8> {
        match self {
            IncidentStatus::Open | IncidentStatus::InProgress => Some(0),
            IncidentStatus::EnRoute => Some(1),
            IncidentStatus::OnScene => Some(2),
            IncidentStatus::ProvidingAid => Some(3),
            IncidentStatus::Transporting => Some(4),
            IncidentStatus::Resolved => Some(5),
            IncidentStatus::Closed => None,
        }
    }

    /// Whether the responder-driven path may move an incident from `self`
    /// to `target`. Responders walk the pipeline forward only; open,
    /// in_progress and closed are never responder targets. Re-submitting the
    /// current status is allowed and recorded as a no-op by the caller.
    pub fn responder_may_set(&self, target: IncidentStatus) -> bool {
        let (Some(current), Some(next)) = (self.pipeline_rank(), target.pipeline_rank()) else {
            return false;
        };
        next >= 1 && next >= current
    }

    /// Map a user-facing token from the status-update form to its internal
    /// status.
    pub fn from_update_token(token: &str) -> Option<Self> {
        match token {
            "en-route" => Some(IncidentStatus::EnRoute),
            "on-scene" => Some(IncidentStatus::OnScene),
            "providing-aid" => Some(IncidentStatus::ProvidingAid),
            "transporting" => Some(IncidentStatus::Transporting),
            "completed" => Some(IncidentStatus::Resolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Transition Authority
// ============================================================================

/// Who is driving a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAuthority {
    /// The assigned responder: forward pipeline moves only.
    Responder,
    /// Administrative or facility override: any recognised status, any
    /// direction, including terminal incidents.
    Override,
}

// ============================================================================
// Responder Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderStatus {
    Available,
    OnDuty,
    OffDuty,
    Unavailable,
}

impl ResponderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponderStatus::Available => "available",
            ResponderStatus::OnDuty => "on_duty",
            ResponderStatus::OffDuty => "off_duty",
            ResponderStatus::Unavailable => "unavailable",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(ResponderStatus::Available),
            "on_duty" => Some(ResponderStatus::OnDuty),
            "off_duty" => Some(ResponderStatus::OffDuty),
            "unavailable" => Some(ResponderStatus::Unavailable),
            _ => None,
        }
    }

    /// Canonical availability-history description.
    pub fn description(&self) -> &'static str {
        match self {
            ResponderStatus::Available => "Ready for new incidents",
            ResponderStatus::OnDuty => "Responding to active incident",
            ResponderStatus::OffDuty => "Shift ended",
            ResponderStatus::Unavailable => "Not accepting new incidents",
        }
    }
}

impl std::fmt::Display for ResponderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Status Flags
// ============================================================================

/// Additional actions a responder can report alongside a status update.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatusFlags {
    #[serde(default)]
    pub backup_requested: bool,
    #[serde(default)]
    pub equipment_needed: bool,
    #[serde(default)]
    pub family_notified: bool,
}

impl StatusFlags {
    /// Fold the ticked actions into the history notes as an
    /// " | Actions: ..." suffix, matching the status-form convention.
    pub fn apply_to_notes(&self, notes: Option<String>) -> Option<String> {
        let mut actions = Vec::new();
        if self.backup_requested {
            actions.push("Backup Requested");
        }
        if self.equipment_needed {
            actions.push("Additional Equipment Needed");
        }
        if self.family_notified {
            actions.push("Family Notified");
        }

        if actions.is_empty() {
            return notes.filter(|n| !n.trim().is_empty());
        }

        let action_str = format!(" | Actions: {}", actions.join(", "));
        match notes.filter(|n| !n.trim().is_empty()) {
            Some(n) => Some(format!("{}\n{}", n, action_str)),
            None => Some(action_str),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
