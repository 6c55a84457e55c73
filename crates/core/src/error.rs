//! Error taxonomy for the incident workflow.
//!
//! Every variant is recoverable at the boundary: the HTTP layer maps them to
//! status codes and user-facing messages, and none should abort the process.

use thiserror::Error;

use crate::status::IncidentStatus;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed input: missing required field, bad phone format.
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Accept attempted while the responder already has an active
    /// assignment. Carries the existing incident so the caller can redirect
    /// to it instead of treating this as a hard failure.
    #[error("Responder already has an active assignment (incident {active_incident_id})")]
    ResponderBusy { active_incident_id: i64 },

    /// Accept attempted on an incident that already has a responder bound.
    #[error("Incident {incident_id} is already assigned to another responder")]
    AlreadyAssigned { incident_id: i64 },

    /// Unrecognised status value, or a move the acting party may not make.
    #[error("Invalid status value: {value}")]
    InvalidTransition { value: String },

    /// Non-override attempt to mutate a resolved or closed incident.
    #[error("Incident {incident_id} is {status} and can no longer be updated")]
    AlreadyTerminal {
        incident_id: i64,
        status: IncidentStatus,
    },

    /// A responder tried to advance an incident they are not bound to.
    #[error("Incident {incident_id} is not assigned to this responder")]
    NotAssigned { incident_id: i64 },

    /// Self-toggle attempted while on duty.
    #[error("Cannot change availability while on duty")]
    ResponderOnDuty,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Storage error: {message}")]
    Persistence { message: String },
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        WorkflowError::Validation {
            message: message.into(),
        }
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        WorkflowError::Persistence {
            message: err.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        WorkflowError::NotFound { entity, id }
    }
}
