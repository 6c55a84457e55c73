//! Acceptance tests for the incident workflow
//!
//! Drives the lifecycle and assignment services against an in-memory store
//! and checks the system's invariants:
//! - resolved_at tracks the resolved status, including reopening
//! - one responder, one active assignment; one incident, one responder
//! - every status change writes exactly one history row
//! - creation notifications fan out by severity and role

use std::sync::Arc;

use aidalert_core::{
    IncidentStatus, IncidentType, NewIncident, ResponderStatus, Severity, StatusFlags,
    TransitionAuthority, UserRole, WorkflowError,
};
use aidalert_server::{AssignmentService, Database, IncidentLifecycle, NotificationDispatcher};

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    db: Arc<Database>,
    lifecycle: IncidentLifecycle,
    assignments: AssignmentService,
    dispatcher: NotificationDispatcher,
    reporter_id: i64,
    facility_ids: Vec<i64>,
}

fn setup() -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let reporter = db.create_user("reporter", UserRole::User, None).unwrap();
    let clinic = db.create_user("clinic", UserRole::Facility, None).unwrap();
    let depot = db.create_user("depot", UserRole::Facility, None).unwrap();
    Harness {
        lifecycle: IncidentLifecycle::new(db.clone()),
        assignments: AssignmentService::new(db.clone()),
        dispatcher: NotificationDispatcher::new(db.clone()),
        db,
        reporter_id: reporter.id,
        facility_ids: vec![clinic.id, depot.id],
    }
}

impl Harness {
    fn report(&self, severity: Severity) -> aidalert_core::Incident {
        self.lifecycle
            .create(NewIncident {
                reporter_id: self.reporter_id,
                incident_type: IncidentType::Medical,
                severity,
                location: "Main St".to_string(),
                description: "chest pain".to_string(),
                contact_phone: "5551234567".to_string(),
                people_involved: 1,
                immediate_action: None,
            })
            .unwrap()
    }

    fn provision_responder(&self, username: &str) -> aidalert_core::Responder {
        let user = self
            .db
            .create_user(username, UserRole::Responder, Some("5550001111"))
            .unwrap();
        self.assignments.ensure_responder_profile(user.id).unwrap()
    }

    fn notification_total(&self) -> usize {
        self.facility_ids
            .iter()
            .map(|id| self.db.notifications_for_user(*id, false).unwrap().len())
            .sum()
    }
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn test_report_critical_incident() {
    let h = setup();
    let incident = h.report(Severity::Critical);

    assert_eq!(incident.status, IncidentStatus::Open);
    assert!(incident.assigned_responder_id.is_none());
    assert!(incident.resolved_at.is_none());

    let history = h.db.incident_history(incident.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, IncidentStatus::Open);

    // one notification per facility user
    assert_eq!(h.notification_total(), h.facility_ids.len());
}

#[test]
fn test_low_severity_creates_no_notifications() {
    let h = setup();
    h.report(Severity::Low);
    assert_eq!(h.notification_total(), 0);
}

#[test]
fn test_provisioning_is_idempotent() {
    let h = setup();
    let user = h
        .db
        .create_user("rescuer", UserRole::Responder, None)
        .unwrap();

    let first = h.assignments.ensure_responder_profile(user.id).unwrap();
    let second = h.assignments.ensure_responder_profile(user.id).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.status, ResponderStatus::Available);

    // exactly one initial availability row
    assert_eq!(h.db.responder_history(first.id).unwrap().len(), 1);
}

// ============================================================================
// Accept
// ============================================================================

#[test]
fn test_accept_binds_and_dispatches() {
    let h = setup();
    let incident = h.report(Severity::Medium);
    let responder = h.provision_responder("rescuer");

    let incident_rows_before = h.db.incident_history(incident.id).unwrap().len();
    let responder_rows_before = h.db.responder_history(responder.id).unwrap().len();

    let accepted = h.assignments.accept(responder.id, incident.id).unwrap();
    assert_eq!(accepted.status, IncidentStatus::EnRoute);
    assert_eq!(accepted.assigned_responder_id, Some(responder.id));

    let responder = h.db.responder(responder.id).unwrap().unwrap();
    assert_eq!(responder.status, ResponderStatus::OnDuty);

    // one incident row and one responder row
    assert_eq!(
        h.db.incident_history(incident.id).unwrap().len(),
        incident_rows_before + 1
    );
    assert_eq!(
        h.db.responder_history(responder.id).unwrap().len(),
        responder_rows_before + 1
    );

    // no longer listed as open/unassigned
    assert!(h.db.open_unassigned_incidents().unwrap().is_empty());
}

#[test]
fn test_accept_assigned_incident_fails_cleanly() {
    let h = setup();
    let incident = h.report(Severity::Medium);
    let first = h.provision_responder("first");
    let second = h.provision_responder("second");

    h.assignments.accept(first.id, incident.id).unwrap();
    let rows_before = h.db.incident_history(incident.id).unwrap().len();

    let err = h.assignments.accept(second.id, incident.id).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::AlreadyAssigned { incident_id } if incident_id == incident.id
    ));

    // nothing was written
    assert_eq!(h.db.incident_history(incident.id).unwrap().len(), rows_before);
    let second = h.db.responder(second.id).unwrap().unwrap();
    assert_eq!(second.status, ResponderStatus::Available);
}

#[test]
fn test_busy_responder_is_redirected() {
    let h = setup();
    let first_incident = h.report(Severity::Medium);
    let second_incident = h.report(Severity::Medium);
    let responder = h.provision_responder("rescuer");

    h.assignments.accept(responder.id, first_incident.id).unwrap();

    let err = h
        .assignments
        .accept(responder.id, second_incident.id)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ResponderBusy { active_incident_id } if active_incident_id == first_incident.id
    ));

    // the second incident is untouched
    let second = h.db.incident(second_incident.id).unwrap().unwrap();
    assert_eq!(second.status, IncidentStatus::Open);
    assert!(second.assigned_responder_id.is_none());
    assert_eq!(h.db.incident_history(second.id).unwrap().len(), 1);
}

// ============================================================================
// Responder Progression
// ============================================================================

#[test]
fn test_full_pipeline_to_resolution() {
    let h = setup();
    let incident = h.report(Severity::High);
    let responder = h.provision_responder("rescuer");

    h.assignments.accept(responder.id, incident.id).unwrap();

    for token in ["on-scene", "providing-aid", "transporting", "completed"] {
        h.assignments
            .advance_by_responder(responder.id, incident.id, token, None, StatusFlags::default())
            .unwrap();
    }

    let incident = h.db.incident(incident.id).unwrap().unwrap();
    assert_eq!(incident.status, IncidentStatus::Resolved);
    assert!(incident.resolved_at.is_some());

    let responder = h.db.responder(responder.id).unwrap().unwrap();
    assert_eq!(responder.status, ResponderStatus::Available);
    assert_eq!(responder.handled_incidents, 1);

    // open + en_route + the four advances
    assert_eq!(h.db.incident_history(incident.id).unwrap().len(), 6);
}

#[test]
fn test_flags_are_folded_into_history_notes() {
    let h = setup();
    let incident = h.report(Severity::High);
    let responder = h.provision_responder("rescuer");
    h.assignments.accept(responder.id, incident.id).unwrap();

    h.assignments
        .advance_by_responder(
            responder.id,
            incident.id,
            "on-scene",
            Some("Two patients".to_string()),
            StatusFlags {
                backup_requested: true,
                equipment_needed: true,
                family_notified: false,
            },
        )
        .unwrap();

    let history = h.db.incident_history(incident.id).unwrap();
    assert_eq!(
        history[0].notes,
        "Two patients\n | Actions: Backup Requested, Additional Equipment Needed"
    );
}

#[test]
fn test_advance_requires_assignment() {
    let h = setup();
    let incident = h.report(Severity::Medium);
    let assigned = h.provision_responder("assigned");
    let stranger = h.provision_responder("stranger");

    h.assignments.accept(assigned.id, incident.id).unwrap();

    let err = h
        .assignments
        .advance_by_responder(
            stranger.id,
            incident.id,
            "on-scene",
            None,
            StatusFlags::default(),
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotAssigned { .. }));
}

#[test]
fn test_advance_rejects_unknown_token_and_backward_moves() {
    let h = setup();
    let incident = h.report(Severity::Medium);
    let responder = h.provision_responder("rescuer");
    h.assignments.accept(responder.id, incident.id).unwrap();

    let err = h
        .assignments
        .advance_by_responder(
            responder.id,
            incident.id,
            "paused",
            None,
            StatusFlags::default(),
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

    h.assignments
        .advance_by_responder(
            responder.id,
            incident.id,
            "transporting",
            None,
            StatusFlags::default(),
        )
        .unwrap();
    let err = h
        .assignments
        .advance_by_responder(
            responder.id,
            incident.id,
            "on-scene",
            None,
            StatusFlags::default(),
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
}

#[test]
fn test_repeated_token_writes_no_history() {
    let h = setup();
    let incident = h.report(Severity::Medium);
    let responder = h.provision_responder("rescuer");
    h.assignments.accept(responder.id, incident.id).unwrap();

    h.assignments
        .advance_by_responder(responder.id, incident.id, "on-scene", None, StatusFlags::default())
        .unwrap();
    let rows = h.db.incident_history(incident.id).unwrap().len();

    h.assignments
        .advance_by_responder(responder.id, incident.id, "on-scene", None, StatusFlags::default())
        .unwrap();
    assert_eq!(h.db.incident_history(incident.id).unwrap().len(), rows);
}

// ============================================================================
// Administrative Paths
// ============================================================================

#[test]
fn test_admin_assign_marks_open_incident_in_progress() {
    let h = setup();
    let incident = h.report(Severity::Medium);
    let responder = h.provision_responder("rescuer");

    let assigned = h
        .assignments
        .admin_assign(incident.id, Some(responder.id))
        .unwrap();
    assert_eq!(assigned.status, IncidentStatus::InProgress);
    assert_eq!(assigned.assigned_responder_id, Some(responder.id));
    assert!(h.db.open_unassigned_incidents().unwrap().is_empty());

    // admin assignment does not force the responder on duty
    let responder = h.db.responder(responder.id).unwrap().unwrap();
    assert_eq!(responder.status, ResponderStatus::Available);

    // unassigning clears the binding but keeps the status
    let unassigned = h.assignments.admin_assign(incident.id, None).unwrap();
    assert!(unassigned.assigned_responder_id.is_none());
    assert_eq!(unassigned.status, IncidentStatus::InProgress);
}

#[test]
fn test_admin_reopen_clears_resolved_at() {
    let h = setup();
    let incident = h.report(Severity::Medium);
    let responder = h.provision_responder("rescuer");
    h.assignments.accept(responder.id, incident.id).unwrap();
    h.assignments
        .advance_by_responder(responder.id, incident.id, "completed", None, StatusFlags::default())
        .unwrap();

    let resolved = h.db.incident(incident.id).unwrap().unwrap();
    assert!(resolved.resolved_at.is_some());

    let reopened = h
        .lifecycle
        .transition(
            incident.id,
            IncidentStatus::OnScene,
            Some("Caller reports the situation is ongoing"),
            TransitionAuthority::Override,
        )
        .unwrap();
    assert_eq!(reopened.status, IncidentStatus::OnScene);
    assert!(reopened.resolved_at.is_none());
}

#[test]
fn test_terminal_incident_needs_override() {
    let h = setup();
    let incident = h.report(Severity::Medium);
    let responder = h.provision_responder("rescuer");
    h.assignments.accept(responder.id, incident.id).unwrap();
    h.assignments
        .advance_by_responder(responder.id, incident.id, "completed", None, StatusFlags::default())
        .unwrap();

    let err = h
        .assignments
        .advance_by_responder(responder.id, incident.id, "on-scene", None, StatusFlags::default())
        .unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadyTerminal { .. }));

    // override can still close the case
    let closed = h
        .lifecycle
        .transition(
            incident.id,
            IncidentStatus::Closed,
            None,
            TransitionAuthority::Override,
        )
        .unwrap();
    assert_eq!(closed.status, IncidentStatus::Closed);
}

// ============================================================================
// Availability
// ============================================================================

#[test]
fn test_toggle_rejected_while_on_duty() {
    let h = setup();
    let incident = h.report(Severity::Medium);
    let responder = h.provision_responder("rescuer");
    h.assignments.accept(responder.id, incident.id).unwrap();

    let err = h
        .assignments
        .toggle_availability(responder.id, false)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ResponderOnDuty));

    let responder = h.db.responder(responder.id).unwrap().unwrap();
    assert_eq!(responder.status, ResponderStatus::OnDuty);
}

#[test]
fn test_toggle_records_availability_history() {
    let h = setup();
    let responder = h.provision_responder("rescuer");

    let toggled = h.assignments.toggle_availability(responder.id, false).unwrap();
    assert_eq!(toggled.status, ResponderStatus::Unavailable);

    let toggled = h.assignments.toggle_availability(responder.id, true).unwrap();
    assert_eq!(toggled.status, ResponderStatus::Available);

    // initial row plus the two toggles
    let history = h.db.responder_history(responder.id).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].description, "Ready for new incidents");
    assert_eq!(history[1].description, "Not accepting new incidents");

    // toggling to the current state writes nothing
    h.assignments.toggle_availability(responder.id, true).unwrap();
    assert_eq!(h.db.responder_history(responder.id).unwrap().len(), 3);
}

// ============================================================================
// Invariants Across Flows
// ============================================================================

#[test]
fn test_single_active_assignment_per_responder() {
    let h = setup();
    let responder = h.provision_responder("rescuer");

    // resolve one incident, then accept a second: history never shows two
    // active assignments at once
    let first = h.report(Severity::Medium);
    h.assignments.accept(responder.id, first.id).unwrap();
    h.assignments
        .advance_by_responder(responder.id, first.id, "completed", None, StatusFlags::default())
        .unwrap();

    let second = h.report(Severity::Medium);
    h.assignments.accept(responder.id, second.id).unwrap();

    let active = h.db.incidents_for_responder(responder.id, true).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);

    let all = h.db.incidents_for_responder(responder.id, false).unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn test_resolved_at_iff_resolved() {
    let h = setup();
    let incident = h.report(Severity::Medium);
    let responder = h.provision_responder("rescuer");
    h.assignments.accept(responder.id, incident.id).unwrap();

    let check = |id: i64, h: &Harness| {
        let incident = h.db.incident(id).unwrap().unwrap();
        assert_eq!(
            incident.resolved_at.is_some(),
            incident.status == IncidentStatus::Resolved,
            "resolved_at out of step in status {}",
            incident.status
        );
    };

    check(incident.id, &h);
    h.assignments
        .advance_by_responder(responder.id, incident.id, "completed", None, StatusFlags::default())
        .unwrap();
    check(incident.id, &h);
    h.lifecycle
        .transition(
            incident.id,
            IncidentStatus::EnRoute,
            None,
            TransitionAuthority::Override,
        )
        .unwrap();
    check(incident.id, &h);
}

#[test]
fn test_escalations_do_not_touch_incident_state() {
    let h = setup();
    let incident = h.report(Severity::Low);
    let admin = h.db.create_user("ops", UserRole::Admin, None).unwrap();

    let notified = h
        .dispatcher
        .notify_critical_escalation(&incident, Some("send backup"))
        .unwrap();
    assert_eq!(notified, h.facility_ids.len());

    let notified = h.dispatcher.notify_facility_escalation(&incident).unwrap();
    assert_eq!(notified, 1);
    assert_eq!(h.db.notifications_for_user(admin.id, true).unwrap().len(), 1);

    let loaded = h.db.incident(incident.id).unwrap().unwrap();
    assert_eq!(loaded.status, IncidentStatus::Open);
    assert_eq!(h.db.incident_history(incident.id).unwrap().len(), 1);
}
