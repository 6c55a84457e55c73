//! Notifications produced by incident events.
//!
//! Drafts carry the synthesized title/message for each dispatch rule; the
//! dispatcher in the server crate resolves recipients and stores one row per
//! recipient.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::incident::Incident;

// ============================================================================
// Notification Type / Category
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Critical => "critical",
            NotificationType::High => "high",
            NotificationType::Medium => "medium",
            NotificationType::Low => "low",
            NotificationType::Info => "info",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(NotificationType::Critical),
            "high" => Some(NotificationType::High),
            "medium" => Some(NotificationType::Medium),
            "low" => Some(NotificationType::Low),
            "info" => Some(NotificationType::Info),
            _ => None,
        }
    }
}

impl From<crate::severity::Severity> for NotificationType {
    fn from(severity: crate::severity::Severity) -> Self {
        use crate::severity::Severity;
        match severity {
            Severity::Critical => NotificationType::Critical,
            Severity::High => NotificationType::High,
            Severity::Medium => NotificationType::Medium,
            Severity::Low => NotificationType::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Incident,
    System,
    Maintenance,
    Staff,
    Equipment,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Incident => "incident",
            NotificationCategory::System => "system",
            NotificationCategory::Maintenance => "maintenance",
            NotificationCategory::Staff => "staff",
            NotificationCategory::Equipment => "equipment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "incident" => Some(NotificationCategory::Incident),
            "system" => Some(NotificationCategory::System),
            "maintenance" => Some(NotificationCategory::Maintenance),
            "staff" => Some(NotificationCategory::Staff),
            "equipment" => Some(NotificationCategory::Equipment),
            _ => None,
        }
    }
}

// ============================================================================
// Notification
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub category: NotificationCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_incident_id: Option<i64>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Drafts
// ============================================================================

/// Content of a notification before it is stored.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub recipient_id: i64,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub category: NotificationCategory,
    pub related_incident_id: Option<i64>,
}

impl NotificationDraft {
    /// Creation fan-out to facility users for critical/high incidents.
    pub fn incident_created(recipient_id: i64, incident: &Incident) -> Self {
        Self {
            recipient_id,
            title: format!("New {} Incident", incident.severity.label()),
            message: format!(
                "Type: {}. Location: {}",
                incident.incident_type.label(),
                incident.location
            ),
            notification_type: incident.severity.into(),
            category: NotificationCategory::Incident,
            related_incident_id: Some(incident.id),
        }
    }

    /// Responder-triggered escalation to facility users.
    pub fn critical_escalation(
        recipient_id: i64,
        incident: &Incident,
        notes: Option<&str>,
    ) -> Self {
        let mut message = format!(
            "Responder requested escalation for {}. Type: {}. Location: {}",
            incident.incident_ref(),
            incident.incident_type.label(),
            incident.location
        );
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            message.push_str(&format!(" Notes: {}", notes));
        }
        Self {
            recipient_id,
            title: format!("Critical Escalation: {}", incident.incident_ref()),
            message,
            notification_type: NotificationType::Critical,
            category: NotificationCategory::Incident,
            related_incident_id: Some(incident.id),
        }
    }

    /// Facility-triggered escalation to admin users.
    pub fn facility_escalation(recipient_id: i64, incident: &Incident) -> Self {
        Self {
            recipient_id,
            title: format!("Facility Escalation: {}", incident.incident_ref()),
            message: format!(
                "A facility manager escalated {}. Type: {}. Location: {}",
                incident.incident_ref(),
                incident.incident_type.label(),
                incident.location
            ),
            notification_type: NotificationType::Critical,
            category: NotificationCategory::System,
            related_incident_id: Some(incident.id),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
