//! Status-change recorder.
//!
//! Replaces the implicit save-hook tracking of the original system with an
//! explicit step: callers hand over the persisted-before status and the
//! about-to-be-persisted status, and exactly one history row is appended
//! when they differ (or when the record is newly created, `previous` =
//! `None`). Runs inside the caller's transaction so the entity update and
//! its audit row land or fail together.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use aidalert_core::{IncidentStatus, IncidentStatusHistory, ResponderStatus, WorkflowError};

use crate::db;

/// Record an incident status change. Notes fall back to the canonical
/// description of the new status. Returns whether a row was written.
pub fn record_incident_transition(
    conn: &Connection,
    incident_id: i64,
    previous: Option<IncidentStatus>,
    new: IncidentStatus,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, WorkflowError> {
    if previous == Some(new) {
        return Ok(false);
    }
    let notes = IncidentStatusHistory::notes_for(new, notes);
    db::insert_incident_history(conn, incident_id, new, &notes, now)?;
    Ok(true)
}

/// Record a responder availability change with the canonical description.
pub fn record_responder_transition(
    conn: &Connection,
    responder_id: i64,
    previous: Option<ResponderStatus>,
    new: ResponderStatus,
    now: DateTime<Utc>,
) -> Result<bool, WorkflowError> {
    if previous == Some(new) {
        return Ok(false);
    }
    db::insert_responder_history(conn, responder_id, new, new.description(), now)?;
    Ok(true)
}
