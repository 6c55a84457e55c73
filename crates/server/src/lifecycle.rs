//! Incident lifecycle: creation and status transitions.
//!
//! The state mutation and its audit row are one visible, transactional step;
//! notification fan-out happens after the commit and is best-effort.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use aidalert_core::{
    Incident, IncidentStatus, NewIncident, TransitionAuthority, WorkflowError,
};

use crate::db::{self, Database};
use crate::dispatch::NotificationDispatcher;
use crate::recorder;

pub struct IncidentLifecycle {
    db: Arc<Database>,
    dispatcher: NotificationDispatcher,
}

impl IncidentLifecycle {
    pub fn new(db: Arc<Database>) -> Self {
        let dispatcher = NotificationDispatcher::new(db.clone());
        Self { db, dispatcher }
    }

    /// Report a new incident: validate, insert with status open and the
    /// initial history row, then fan out creation notifications for
    /// critical/high severities.
    pub fn create(&self, report: NewIncident) -> Result<Incident, WorkflowError> {
        report.validate()?;

        let incident = self.db.with_tx(|tx| {
            let now = Utc::now();
            let incident = db::insert_incident(tx, &report, now)?;
            recorder::record_incident_transition(
                tx,
                incident.id,
                None,
                IncidentStatus::Open,
                None,
                now,
            )?;
            Ok(incident)
        })?;

        tracing::info!(
            incident = %incident.incident_ref(),
            severity = %incident.severity,
            "incident reported"
        );

        // Losing a notification must not lose the incident, so dispatch runs
        // after the commit and failures only get logged.
        if let Err(err) = self.dispatcher.notify_incident_created(&incident) {
            tracing::warn!(
                incident = %incident.incident_ref(),
                "creation notification dispatch failed: {err}"
            );
        }

        Ok(incident)
    }

    /// Move an incident to `target`. Responder-path callers are held to the
    /// forward pipeline; override callers may set any recognised status.
    pub fn transition(
        &self,
        incident_id: i64,
        target: IncidentStatus,
        notes: Option<&str>,
        authority: TransitionAuthority,
    ) -> Result<Incident, WorkflowError> {
        self.db.with_tx(|tx| {
            let mut incident = db::incident_by_id(tx, incident_id)?
                .ok_or_else(|| WorkflowError::not_found("incident", incident_id))?;
            transition_in_tx(tx, &mut incident, target, notes, authority, Utc::now())?;
            Ok(incident)
        })
    }
}

/// Shared transition core for the lifecycle and assignment paths. Runs
/// inside the caller's transaction; returns whether the status changed
/// (re-applying the current status is a recorded-nowhere no-op).
pub(crate) fn transition_in_tx(
    conn: &Connection,
    incident: &mut Incident,
    target: IncidentStatus,
    notes: Option<&str>,
    authority: TransitionAuthority,
    now: DateTime<Utc>,
) -> Result<bool, WorkflowError> {
    if authority != TransitionAuthority::Override {
        if incident.status.is_terminal() {
            return Err(WorkflowError::AlreadyTerminal {
                incident_id: incident.id,
                status: incident.status,
            });
        }
        if incident.status != target && !incident.status.responder_may_set(target) {
            return Err(WorkflowError::InvalidTransition {
                value: target.as_str().to_string(),
            });
        }
    }

    if incident.status == target {
        return Ok(false);
    }

    let previous = incident.status;
    incident.apply_status(target, now);
    db::update_incident(conn, incident)?;
    recorder::record_incident_transition(conn, incident.id, Some(previous), target, notes, now)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aidalert_core::{IncidentType, Severity, UserRole};

    fn lifecycle() -> (Arc<Database>, IncidentLifecycle) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let lifecycle = IncidentLifecycle::new(db.clone());
        (db, lifecycle)
    }

    fn report(reporter_id: i64, severity: Severity) -> NewIncident {
        NewIncident {
            reporter_id,
            incident_type: IncidentType::Medical,
            severity,
            location: "Main St".to_string(),
            description: "chest pain".to_string(),
            contact_phone: "5551234567".to_string(),
            people_involved: 1,
            immediate_action: None,
        }
    }

    #[test]
    fn test_create_writes_initial_history() {
        let (db, lifecycle) = lifecycle();
        let reporter = db.create_user("reporter", UserRole::User, None).unwrap();

        let incident = lifecycle.create(report(reporter.id, Severity::Low)).unwrap();
        assert_eq!(incident.status, IncidentStatus::Open);

        let rows = db.incident_history(incident.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, IncidentStatus::Open);
        assert_eq!(rows[0].notes, "Incident reported and open");
    }

    #[test]
    fn test_create_rejects_invalid_report() {
        let (_db, lifecycle) = lifecycle();
        let mut bad = report(1, Severity::Low);
        bad.contact_phone = "123".to_string();
        assert!(matches!(
            lifecycle.create(bad),
            Err(WorkflowError::Validation { .. })
        ));
    }

    #[test]
    fn test_override_may_reopen_resolved() {
        let (db, lifecycle) = lifecycle();
        let reporter = db.create_user("reporter", UserRole::User, None).unwrap();
        let incident = lifecycle.create(report(reporter.id, Severity::Low)).unwrap();

        lifecycle
            .transition(
                incident.id,
                IncidentStatus::Resolved,
                None,
                TransitionAuthority::Override,
            )
            .unwrap();
        let resolved = db.incident(incident.id).unwrap().unwrap();
        assert!(resolved.resolved_at.is_some());

        let reopened = lifecycle
            .transition(
                incident.id,
                IncidentStatus::OnScene,
                Some("Reopened after follow-up call"),
                TransitionAuthority::Override,
            )
            .unwrap();
        assert_eq!(reopened.status, IncidentStatus::OnScene);
        assert!(reopened.resolved_at.is_none());
    }

    #[test]
    fn test_responder_path_rejects_terminal_and_backward() {
        let (db, lifecycle) = lifecycle();
        let reporter = db.create_user("reporter", UserRole::User, None).unwrap();
        let incident = lifecycle.create(report(reporter.id, Severity::Low)).unwrap();

        lifecycle
            .transition(
                incident.id,
                IncidentStatus::OnScene,
                None,
                TransitionAuthority::Override,
            )
            .unwrap();

        assert!(matches!(
            lifecycle.transition(
                incident.id,
                IncidentStatus::EnRoute,
                None,
                TransitionAuthority::Responder,
            ),
            Err(WorkflowError::InvalidTransition { .. })
        ));

        lifecycle
            .transition(
                incident.id,
                IncidentStatus::Closed,
                None,
                TransitionAuthority::Override,
            )
            .unwrap();
        assert!(matches!(
            lifecycle.transition(
                incident.id,
                IncidentStatus::OnScene,
                None,
                TransitionAuthority::Responder,
            ),
            Err(WorkflowError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn test_same_status_is_a_silent_noop() {
        let (db, lifecycle) = lifecycle();
        let reporter = db.create_user("reporter", UserRole::User, None).unwrap();
        let incident = lifecycle.create(report(reporter.id, Severity::Low)).unwrap();

        lifecycle
            .transition(
                incident.id,
                IncidentStatus::Open,
                None,
                TransitionAuthority::Override,
            )
            .unwrap();
        assert_eq!(db.incident_history(incident.id).unwrap().len(), 1);
    }
}
