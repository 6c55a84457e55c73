//! Responder assignment workflow.
//!
//! Binds responders to incidents while holding two invariants: a responder
//! has at most one incident in an active status, and an incident has at most
//! one responder. Both are enforced inside the operation's transaction, with
//! the accept claim done as an atomic conditional update so racing accepts
//! cannot double-assign.

use std::sync::Arc;

use chrono::Utc;

use aidalert_core::{
    Incident, IncidentStatus, Responder, ResponderStatus, StatusFlags, TransitionAuthority,
    WorkflowError,
};

use crate::db::{self, Database};
use crate::lifecycle;
use crate::recorder;

pub struct AssignmentService {
    db: Arc<Database>,
}

impl AssignmentService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Idempotent get-or-create of a user's responder profile, invoked by
    /// the boundary before any responder operation. A fresh profile starts
    /// available and gets its initial availability-history row.
    pub fn ensure_responder_profile(&self, user_id: i64) -> Result<Responder, WorkflowError> {
        self.db.with_tx(|tx| {
            if let Some(existing) = db::responder_by_user(tx, user_id)? {
                return Ok(existing);
            }
            let user = db::user_by_id(tx, user_id)?
                .ok_or_else(|| WorkflowError::not_found("user", user_id))?;
            let phone = user.phone.as_deref().unwrap_or("Pending");
            let responder = db::insert_responder(tx, user_id, phone)?;
            recorder::record_responder_transition(
                tx,
                responder.id,
                None,
                responder.status,
                Utc::now(),
            )?;
            tracing::info!(responder = %responder.responder_ref, "responder profile provisioned");
            Ok(responder)
        })
    }

    /// Self-service accept of an open incident. On success the incident is
    /// en_route and the responder on_duty, each with its history row.
    pub fn accept(&self, responder_id: i64, incident_id: i64) -> Result<Incident, WorkflowError> {
        self.db.with_tx(|tx| {
            let responder = db::responder_by_id(tx, responder_id)?
                .ok_or_else(|| WorkflowError::not_found("responder", responder_id))?;

            if let Some(active) = db::active_assignment_for(tx, responder.id)? {
                return Err(WorkflowError::ResponderBusy {
                    active_incident_id: active.id,
                });
            }

            let incident = db::incident_by_id(tx, incident_id)?
                .ok_or_else(|| WorkflowError::not_found("incident", incident_id))?;
            if incident.assigned_responder_id.is_some() {
                return Err(WorkflowError::AlreadyAssigned { incident_id });
            }
            if incident.status.is_terminal() {
                return Err(WorkflowError::AlreadyTerminal {
                    incident_id,
                    status: incident.status,
                });
            }
            if incident.status != IncidentStatus::Open {
                return Err(WorkflowError::InvalidTransition {
                    value: incident.status.as_str().to_string(),
                });
            }

            let now = Utc::now();
            if db::claim_incident(tx, incident_id, responder.id, now)? == 0 {
                // lost the claim between the read above and the update
                return Err(WorkflowError::AlreadyAssigned { incident_id });
            }

            let mut incident = db::incident_by_id(tx, incident_id)?
                .ok_or_else(|| WorkflowError::not_found("incident", incident_id))?;
            lifecycle::transition_in_tx(
                tx,
                &mut incident,
                IncidentStatus::EnRoute,
                None,
                TransitionAuthority::Responder,
                now,
            )?;

            db::update_responder_status(tx, responder.id, ResponderStatus::OnDuty, now)?;
            recorder::record_responder_transition(
                tx,
                responder.id,
                Some(responder.status),
                ResponderStatus::OnDuty,
                now,
            )?;

            tracing::info!(
                incident = %incident.incident_ref(),
                responder = %responder.responder_ref,
                "incident accepted"
            );
            Ok(incident)
        })
    }

    /// Administrative assign/unassign. Assigning an open incident advances
    /// it to in_progress so it leaves the open-unassigned listings;
    /// unassigning clears the binding and deliberately leaves both the
    /// incident status and the responder state alone.
    pub fn admin_assign(
        &self,
        incident_id: i64,
        responder_id: Option<i64>,
    ) -> Result<Incident, WorkflowError> {
        self.db.with_tx(|tx| {
            let mut incident = db::incident_by_id(tx, incident_id)?
                .ok_or_else(|| WorkflowError::not_found("incident", incident_id))?;
            let now = Utc::now();

            match responder_id {
                Some(responder_id) => {
                    let responder = db::responder_by_id(tx, responder_id)?
                        .ok_or_else(|| WorkflowError::not_found("responder", responder_id))?;
                    incident.assigned_responder_id = Some(responder.id);
                    incident.updated_at = now;
                    db::update_incident(tx, &incident)?;
                    if incident.status == IncidentStatus::Open {
                        lifecycle::transition_in_tx(
                            tx,
                            &mut incident,
                            IncidentStatus::InProgress,
                            None,
                            TransitionAuthority::Override,
                            now,
                        )?;
                    }
                }
                None => {
                    incident.assigned_responder_id = None;
                    incident.updated_at = now;
                    db::update_incident(tx, &incident)?;
                }
            }
            Ok(incident)
        })
    }

    /// Status progression by the assigned responder. Maps the status-form
    /// token to an internal status, folds the action flags into the notes,
    /// and on completion returns the responder to available.
    pub fn advance_by_responder(
        &self,
        responder_id: i64,
        incident_id: i64,
        token: &str,
        notes: Option<String>,
        flags: StatusFlags,
    ) -> Result<Incident, WorkflowError> {
        let target = IncidentStatus::from_update_token(token).ok_or_else(|| {
            WorkflowError::InvalidTransition {
                value: token.to_string(),
            }
        })?;

        self.db.with_tx(|tx| {
            let responder = db::responder_by_id(tx, responder_id)?
                .ok_or_else(|| WorkflowError::not_found("responder", responder_id))?;
            let mut incident = db::incident_by_id(tx, incident_id)?
                .ok_or_else(|| WorkflowError::not_found("incident", incident_id))?;

            if incident.assigned_responder_id != Some(responder.id) {
                return Err(WorkflowError::NotAssigned { incident_id });
            }
            if incident.status.is_terminal() {
                return Err(WorkflowError::AlreadyTerminal {
                    incident_id,
                    status: incident.status,
                });
            }

            let now = Utc::now();
            let notes = flags.apply_to_notes(notes);
            let changed = lifecycle::transition_in_tx(
                tx,
                &mut incident,
                target,
                notes.as_deref(),
                TransitionAuthority::Responder,
                now,
            )?;

            if changed && target == IncidentStatus::Resolved {
                db::update_responder_status(tx, responder.id, ResponderStatus::Available, now)?;
                recorder::record_responder_transition(
                    tx,
                    responder.id,
                    Some(responder.status),
                    ResponderStatus::Available,
                    now,
                )?;
                db::increment_handled_incidents(tx, responder.id, now)?;
                tracing::info!(
                    incident = %incident.incident_ref(),
                    responder = %responder.responder_ref,
                    "incident resolved by responder"
                );
            }

            Ok(incident)
        })
    }

    /// Availability self-toggle. Busy responders must finish their
    /// assignment first.
    pub fn toggle_availability(
        &self,
        responder_id: i64,
        desired_active: bool,
    ) -> Result<Responder, WorkflowError> {
        self.db.with_tx(|tx| {
            let responder = db::responder_by_id(tx, responder_id)?
                .ok_or_else(|| WorkflowError::not_found("responder", responder_id))?;
            if responder.status == ResponderStatus::OnDuty {
                return Err(WorkflowError::ResponderOnDuty);
            }

            let target = if desired_active {
                ResponderStatus::Available
            } else {
                ResponderStatus::Unavailable
            };
            let now = Utc::now();
            if target != responder.status {
                db::update_responder_status(tx, responder.id, target, now)?;
                recorder::record_responder_transition(
                    tx,
                    responder.id,
                    Some(responder.status),
                    target,
                    now,
                )?;
            }
            db::responder_by_id(tx, responder.id)?
                .ok_or_else(|| WorkflowError::not_found("responder", responder.id))
        })
    }
}
