//! Notification fan-out for qualifying incident events.
//!
//! Recipients are resolved by role at dispatch time and one row is stored
//! per recipient. Dispatch is synchronous and best-effort: callers invoke it
//! after their own transaction commits and treat failures as log-worthy, not
//! fatal.

use std::sync::Arc;

use chrono::Utc;

use aidalert_core::{Incident, NotificationDraft, UserRecord, UserRole, WorkflowError};

use crate::db::{self, Database};

pub struct NotificationDispatcher {
    db: Arc<Database>,
}

impl NotificationDispatcher {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Creation fan-out: critical/high incidents notify every facility user.
    /// Returns the number of notifications created (zero for lower
    /// severities).
    pub fn notify_incident_created(&self, incident: &Incident) -> Result<usize, WorkflowError> {
        if !incident.severity.notifies_on_create() {
            return Ok(0);
        }
        self.fan_out(UserRole::Facility, |user| {
            NotificationDraft::incident_created(user.id, incident)
        })
    }

    /// Responder-triggered escalation: every facility user gets a critical
    /// notification, with the responder's notes folded in.
    pub fn notify_critical_escalation(
        &self,
        incident: &Incident,
        notes: Option<&str>,
    ) -> Result<usize, WorkflowError> {
        self.fan_out(UserRole::Facility, |user| {
            NotificationDraft::critical_escalation(user.id, incident, notes)
        })
    }

    /// Facility-triggered escalation: every admin user gets a critical
    /// system notification.
    pub fn notify_facility_escalation(&self, incident: &Incident) -> Result<usize, WorkflowError> {
        self.fan_out(UserRole::Admin, |user| {
            NotificationDraft::facility_escalation(user.id, incident)
        })
    }

    fn fan_out(
        &self,
        role: UserRole,
        draft_for: impl Fn(&UserRecord) -> NotificationDraft,
    ) -> Result<usize, WorkflowError> {
        self.db.with_tx(|tx| {
            let recipients = db::users_by_role(tx, role)?;
            let now = Utc::now();
            for user in &recipients {
                db::insert_notification(tx, &draft_for(user), now)?;
            }
            if !recipients.is_empty() {
                tracing::debug!(count = recipients.len(), role = %role, "notifications dispatched");
            }
            Ok(recipients.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aidalert_core::{IncidentStatus, IncidentType, NewIncident, Severity};

    fn setup() -> (Arc<Database>, NotificationDispatcher) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = NotificationDispatcher::new(db.clone());
        (db, dispatcher)
    }

    fn stored_incident(db: &Database, reporter: &str, severity: Severity) -> Incident {
        let reporter = db.create_user(reporter, UserRole::User, None).unwrap();
        db.with_read(|conn| {
            db::insert_incident(
                conn,
                &NewIncident {
                    reporter_id: reporter.id,
                    incident_type: IncidentType::Natural,
                    severity,
                    location: "River Rd".to_string(),
                    description: "flooding".to_string(),
                    contact_phone: "5553332222".to_string(),
                    people_involved: 6,
                    immediate_action: None,
                },
                Utc::now(),
            )
        })
        .unwrap()
    }

    #[test]
    fn test_creation_fan_out_by_severity() {
        let (db, dispatcher) = setup();
        let clinic = db.create_user("clinic", UserRole::Facility, None).unwrap();
        let depot = db.create_user("depot", UserRole::Facility, None).unwrap();
        db.create_user("bystander", UserRole::User, None).unwrap();

        let critical = stored_incident(&db, "first_caller", Severity::Critical);
        assert_eq!(dispatcher.notify_incident_created(&critical).unwrap(), 2);
        assert_eq!(db.notifications_for_user(clinic.id, true).unwrap().len(), 1);
        assert_eq!(db.notifications_for_user(depot.id, true).unwrap().len(), 1);

        let low = stored_incident(&db, "second_caller", Severity::Low);
        assert_eq!(dispatcher.notify_incident_created(&low).unwrap(), 0);
        assert_eq!(db.notifications_for_user(clinic.id, true).unwrap().len(), 1);
    }

    #[test]
    fn test_escalations_target_their_roles() {
        let (db, dispatcher) = setup();
        let clinic = db.create_user("clinic", UserRole::Facility, None).unwrap();
        let admin = db.create_user("ops", UserRole::Admin, None).unwrap();

        let incident = stored_incident(&db, "caller", Severity::Medium);

        assert_eq!(
            dispatcher
                .notify_critical_escalation(&incident, Some("backup needed"))
                .unwrap(),
            1
        );
        let clinic_inbox = db.notifications_for_user(clinic.id, true).unwrap();
        assert_eq!(clinic_inbox.len(), 1);
        assert!(clinic_inbox[0].message.contains("backup needed"));
        assert!(db.notifications_for_user(admin.id, true).unwrap().is_empty());

        assert_eq!(dispatcher.notify_facility_escalation(&incident).unwrap(), 1);
        let admin_inbox = db.notifications_for_user(admin.id, true).unwrap();
        assert_eq!(admin_inbox.len(), 1);
        assert_eq!(
            admin_inbox[0].category,
            aidalert_core::NotificationCategory::System
        );

        // untouched incident state
        let loaded = db.incident(incident.id).unwrap().unwrap();
        assert_eq!(loaded.status, IncidentStatus::Open);
    }
}
