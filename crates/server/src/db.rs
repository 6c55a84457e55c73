// Database persistence layer using SQLite

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;

use aidalert_core::{
    Feedback, FeedbackStatus, Incident, IncidentStatus, IncidentStatusHistory, IncidentType,
    NewFeedback, NewIncident, Notification, NotificationCategory, NotificationDraft,
    NotificationType, Responder, ResponderAvailabilityHistory, ResponderStatus, Severity,
    UserRecord, UserRole, WorkflowError,
};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                phone TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS responders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                responder_ref TEXT NOT NULL UNIQUE,
                phone TEXT NOT NULL,
                specialization TEXT,
                certification TEXT,
                status TEXT NOT NULL DEFAULT 'available',
                current_location TEXT,
                rating REAL NOT NULL DEFAULT 0.0,
                handled_incidents INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS incidents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reporter_id INTEGER NOT NULL,
                assigned_responder_id INTEGER,
                incident_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                location TEXT NOT NULL,
                description TEXT NOT NULL,
                contact_phone TEXT NOT NULL,
                people_involved INTEGER NOT NULL DEFAULT 1,
                immediate_action TEXT,
                status TEXT NOT NULL DEFAULT 'open',
                resolved_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (reporter_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (assigned_responder_id)
                    REFERENCES responders(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS incident_status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                timestamp TEXT NOT NULL,
                FOREIGN KEY (incident_id) REFERENCES incidents(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS responder_availability_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                responder_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                timestamp TEXT NOT NULL,
                FOREIGN KEY (responder_id) REFERENCES responders(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                notification_type TEXT NOT NULL DEFAULT 'info',
                category TEXT NOT NULL DEFAULT 'system',
                related_incident_id INTEGER,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (recipient_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (related_incident_id)
                    REFERENCES incidents(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                incident_id INTEGER,
                rating INTEGER NOT NULL,
                message TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                reply TEXT,
                replied_at TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (incident_id) REFERENCES incidents(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_role
                ON users(role);

            CREATE INDEX IF NOT EXISTS idx_incidents_status
                ON incidents(status);

            CREATE INDEX IF NOT EXISTS idx_incidents_responder
                ON incidents(assigned_responder_id);

            CREATE INDEX IF NOT EXISTS idx_incident_history_incident
                ON incident_status_history(incident_id);

            CREATE INDEX IF NOT EXISTS idx_availability_history_responder
                ON responder_availability_history(responder_id);

            CREATE INDEX IF NOT EXISTS idx_notifications_recipient
                ON notifications(recipient_id, is_read);
        "#,
        )?;
        Ok(())
    }

    /// Run `f` inside one transaction; commit on Ok, roll back on Err.
    ///
    /// Every workflow operation goes through here so the entity update, its
    /// history rows and any notifications land or fail together.
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(WorkflowError::persistence)?;
        let value = f(&tx)?;
        tx.commit().map_err(WorkflowError::persistence)?;
        Ok(value)
    }

    /// Run `f` against the connection without a transaction (read paths).
    pub fn with_read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    /// Health check - verify database is accessible
    pub fn health_check(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // Convenience surfaces used by the HTTP layer and tests. The workflow
    // services compose the connection-level functions below inside with_tx.

    pub fn create_user(
        &self,
        username: &str,
        role: UserRole,
        phone: Option<&str>,
    ) -> Result<UserRecord, WorkflowError> {
        self.with_read(|conn| insert_user(conn, username, role, phone))
    }

    pub fn user(&self, id: i64) -> Result<Option<UserRecord>, WorkflowError> {
        self.with_read(|conn| user_by_id(conn, id))
    }

    pub fn users_with_role(&self, role: UserRole) -> Result<Vec<UserRecord>, WorkflowError> {
        self.with_read(|conn| users_by_role(conn, role))
    }

    pub fn incident(&self, id: i64) -> Result<Option<Incident>, WorkflowError> {
        self.with_read(|conn| incident_by_id(conn, id))
    }

    pub fn open_unassigned_incidents(&self) -> Result<Vec<Incident>, WorkflowError> {
        self.with_read(list_open_unassigned)
    }

    pub fn responder(&self, id: i64) -> Result<Option<Responder>, WorkflowError> {
        self.with_read(|conn| responder_by_id(conn, id))
    }

    pub fn responder_for_user(&self, user_id: i64) -> Result<Option<Responder>, WorkflowError> {
        self.with_read(|conn| responder_by_user(conn, user_id))
    }

    pub fn incidents_for_responder(
        &self,
        responder_id: i64,
        active_only: bool,
    ) -> Result<Vec<Incident>, WorkflowError> {
        self.with_read(|conn| incidents_by_responder(conn, responder_id, active_only))
    }

    pub fn incident_history(
        &self,
        incident_id: i64,
    ) -> Result<Vec<IncidentStatusHistory>, WorkflowError> {
        self.with_read(|conn| incident_history_rows(conn, incident_id))
    }

    pub fn responder_history(
        &self,
        responder_id: i64,
    ) -> Result<Vec<ResponderAvailabilityHistory>, WorkflowError> {
        self.with_read(|conn| responder_history_rows(conn, responder_id))
    }

    pub fn notifications_for_user(
        &self,
        user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, WorkflowError> {
        self.with_read(|conn| notifications_by_user(conn, user_id, unread_only))
    }

    pub fn mark_notification_read(
        &self,
        notification_id: i64,
        user_id: i64,
    ) -> Result<bool, WorkflowError> {
        self.with_read(|conn| set_notification_read(conn, notification_id, user_id))
    }

    pub fn create_feedback(&self, entry: &NewFeedback) -> Result<Feedback, WorkflowError> {
        entry.validate()?;
        self.with_read(|conn| insert_feedback(conn, entry, Utc::now()))
    }

    pub fn feedback_for_incident(
        &self,
        incident_id: i64,
    ) -> Result<Vec<Feedback>, WorkflowError> {
        self.with_read(|conn| feedback_by_incident(conn, incident_id))
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn parse_ts(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn bad_value(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unrecognised value: {value}").into(),
    )
}

fn row_to_user(row: &Row) -> rusqlite::Result<UserRecord> {
    let role: String = row.get(2)?;
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        role: UserRole::parse(&role).ok_or_else(|| bad_value(2, &role))?,
        phone: row.get(3)?,
    })
}

fn row_to_responder(row: &Row) -> rusqlite::Result<Responder> {
    let status: String = row.get(6)?;
    Ok(Responder {
        id: row.get(0)?,
        user_id: row.get(1)?,
        responder_ref: row.get(2)?,
        phone: row.get(3)?,
        specialization: row.get(4)?,
        certification: row.get(5)?,
        status: ResponderStatus::parse(&status).ok_or_else(|| bad_value(6, &status))?,
        current_location: row.get(7)?,
        rating: row.get(8)?,
        handled_incidents: row.get(9)?,
        created_at: parse_ts(10, row.get(10)?)?,
        updated_at: parse_ts(11, row.get(11)?)?,
    })
}

fn row_to_incident(row: &Row) -> rusqlite::Result<Incident> {
    let incident_type: String = row.get(3)?;
    let severity: String = row.get(4)?;
    let status: String = row.get(10)?;
    let resolved_at: Option<String> = row.get(11)?;
    Ok(Incident {
        id: row.get(0)?,
        reporter_id: row.get(1)?,
        assigned_responder_id: row.get(2)?,
        incident_type: IncidentType::parse(&incident_type)
            .ok_or_else(|| bad_value(3, &incident_type))?,
        severity: Severity::parse(&severity).ok_or_else(|| bad_value(4, &severity))?,
        location: row.get(5)?,
        description: row.get(6)?,
        contact_phone: row.get(7)?,
        people_involved: row.get(8)?,
        immediate_action: row.get(9)?,
        status: IncidentStatus::parse(&status).ok_or_else(|| bad_value(10, &status))?,
        resolved_at: resolved_at.map(|ts| parse_ts(11, ts)).transpose()?,
        created_at: parse_ts(12, row.get(12)?)?,
        updated_at: parse_ts(13, row.get(13)?)?,
    })
}

const INCIDENT_COLUMNS: &str = "id, reporter_id, assigned_responder_id, incident_type, severity, \
     location, description, contact_phone, people_involved, immediate_action, status, \
     resolved_at, created_at, updated_at";

const RESPONDER_COLUMNS: &str = "id, user_id, responder_ref, phone, specialization, \
     certification, status, current_location, rating, handled_incidents, created_at, updated_at";

fn row_to_incident_history(row: &Row) -> rusqlite::Result<IncidentStatusHistory> {
    let status: String = row.get(2)?;
    Ok(IncidentStatusHistory {
        id: row.get(0)?,
        incident_id: row.get(1)?,
        status: IncidentStatus::parse(&status).ok_or_else(|| bad_value(2, &status))?,
        notes: row.get(3)?,
        timestamp: parse_ts(4, row.get(4)?)?,
    })
}

fn row_to_responder_history(row: &Row) -> rusqlite::Result<ResponderAvailabilityHistory> {
    let status: String = row.get(2)?;
    Ok(ResponderAvailabilityHistory {
        id: row.get(0)?,
        responder_id: row.get(1)?,
        status: ResponderStatus::parse(&status).ok_or_else(|| bad_value(2, &status))?,
        description: row.get(3)?,
        timestamp: parse_ts(4, row.get(4)?)?,
    })
}

fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    let notification_type: String = row.get(4)?;
    let category: String = row.get(5)?;
    Ok(Notification {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        notification_type: NotificationType::parse(&notification_type)
            .ok_or_else(|| bad_value(4, &notification_type))?,
        category: NotificationCategory::parse(&category)
            .ok_or_else(|| bad_value(5, &category))?,
        related_incident_id: row.get(6)?,
        is_read: row.get(7)?,
        created_at: parse_ts(8, row.get(8)?)?,
    })
}

fn row_to_feedback(row: &Row) -> rusqlite::Result<Feedback> {
    let status: String = row.get(5)?;
    let replied_at: Option<String> = row.get(7)?;
    Ok(Feedback {
        id: row.get(0)?,
        user_id: row.get(1)?,
        incident_id: row.get(2)?,
        rating: row.get(3)?,
        message: row.get(4)?,
        status: FeedbackStatus::parse(&status).ok_or_else(|| bad_value(5, &status))?,
        reply: row.get(6)?,
        replied_at: replied_at.map(|ts| parse_ts(7, ts)).transpose()?,
        created_at: parse_ts(8, row.get(8)?)?,
    })
}

// ============================================================================
// User Operations
// ============================================================================

pub fn insert_user(
    conn: &Connection,
    username: &str,
    role: UserRole,
    phone: Option<&str>,
) -> Result<UserRecord, WorkflowError> {
    conn.execute(
        "INSERT INTO users (username, role, phone, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![username, role.as_str(), phone, Utc::now().to_rfc3339()],
    )
    .map_err(WorkflowError::persistence)?;
    Ok(UserRecord {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        role,
        phone: phone.map(str::to_string),
    })
}

pub fn user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRecord>, WorkflowError> {
    conn.query_row(
        "SELECT id, username, role, phone FROM users WHERE id = ?1",
        params![id],
        row_to_user,
    )
    .optional()
    .map_err(WorkflowError::persistence)
}

pub fn users_by_role(
    conn: &Connection,
    role: UserRole,
) -> Result<Vec<UserRecord>, WorkflowError> {
    let mut stmt = conn
        .prepare("SELECT id, username, role, phone FROM users WHERE role = ?1 ORDER BY id")
        .map_err(WorkflowError::persistence)?;
    let rows = stmt
        .query_map(params![role.as_str()], row_to_user)
        .map_err(WorkflowError::persistence)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(WorkflowError::persistence)
}

// ============================================================================
// Responder Operations
// ============================================================================

pub fn insert_responder(
    conn: &Connection,
    user_id: i64,
    phone: &str,
) -> Result<Responder, WorkflowError> {
    let now = Utc::now();
    conn.execute(
        r#"INSERT INTO responders
           (user_id, responder_ref, phone, status, created_at, updated_at)
           VALUES (?1, ?2, ?3, 'available', ?4, ?4)"#,
        params![
            user_id,
            Responder::ref_for_user(user_id),
            phone,
            now.to_rfc3339()
        ],
    )
    .map_err(WorkflowError::persistence)?;
    let id = conn.last_insert_rowid();
    responder_by_id(conn, id)?.ok_or_else(|| WorkflowError::not_found("responder", id))
}

pub fn responder_by_id(conn: &Connection, id: i64) -> Result<Option<Responder>, WorkflowError> {
    conn.query_row(
        &format!("SELECT {RESPONDER_COLUMNS} FROM responders WHERE id = ?1"),
        params![id],
        row_to_responder,
    )
    .optional()
    .map_err(WorkflowError::persistence)
}

pub fn responder_by_user(
    conn: &Connection,
    user_id: i64,
) -> Result<Option<Responder>, WorkflowError> {
    conn.query_row(
        &format!("SELECT {RESPONDER_COLUMNS} FROM responders WHERE user_id = ?1"),
        params![user_id],
        row_to_responder,
    )
    .optional()
    .map_err(WorkflowError::persistence)
}

pub fn update_responder_status(
    conn: &Connection,
    responder_id: i64,
    status: ResponderStatus,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    conn.execute(
        "UPDATE responders SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now.to_rfc3339(), responder_id],
    )
    .map_err(WorkflowError::persistence)?;
    Ok(())
}

pub fn increment_handled_incidents(
    conn: &Connection,
    responder_id: i64,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    conn.execute(
        r#"UPDATE responders
           SET handled_incidents = handled_incidents + 1, updated_at = ?1
           WHERE id = ?2"#,
        params![now.to_rfc3339(), responder_id],
    )
    .map_err(WorkflowError::persistence)?;
    Ok(())
}

// ============================================================================
// Incident Operations
// ============================================================================

pub fn insert_incident(
    conn: &Connection,
    report: &NewIncident,
    now: DateTime<Utc>,
) -> Result<Incident, WorkflowError> {
    conn.execute(
        r#"INSERT INTO incidents
           (reporter_id, incident_type, severity, location, description, contact_phone,
            people_involved, immediate_action, status, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'open', ?9, ?9)"#,
        params![
            report.reporter_id,
            report.incident_type.as_str(),
            report.severity.as_str(),
            report.location,
            report.description,
            report.contact_phone,
            report.people_involved,
            report.immediate_action,
            now.to_rfc3339()
        ],
    )
    .map_err(WorkflowError::persistence)?;
    let id = conn.last_insert_rowid();
    incident_by_id(conn, id)?.ok_or_else(|| WorkflowError::not_found("incident", id))
}

pub fn incident_by_id(conn: &Connection, id: i64) -> Result<Option<Incident>, WorkflowError> {
    conn.query_row(
        &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?1"),
        params![id],
        row_to_incident,
    )
    .optional()
    .map_err(WorkflowError::persistence)
}

/// Persist the mutable fields of an incident (assignment, status and the
/// timestamps that follow them).
pub fn update_incident(conn: &Connection, incident: &Incident) -> Result<(), WorkflowError> {
    conn.execute(
        r#"UPDATE incidents
           SET assigned_responder_id = ?1, status = ?2, resolved_at = ?3, updated_at = ?4
           WHERE id = ?5"#,
        params![
            incident.assigned_responder_id,
            incident.status.as_str(),
            incident.resolved_at.map(|ts| ts.to_rfc3339()),
            incident.updated_at.to_rfc3339(),
            incident.id
        ],
    )
    .map_err(WorkflowError::persistence)?;
    Ok(())
}

/// Atomically claim an open, unassigned incident for a responder. Returns
/// the number of rows changed; zero means another responder won the race.
pub fn claim_incident(
    conn: &Connection,
    incident_id: i64,
    responder_id: i64,
    now: DateTime<Utc>,
) -> Result<usize, WorkflowError> {
    conn.execute(
        r#"UPDATE incidents
           SET assigned_responder_id = ?1, updated_at = ?2
           WHERE id = ?3 AND assigned_responder_id IS NULL AND status = 'open'"#,
        params![responder_id, now.to_rfc3339(), incident_id],
    )
    .map_err(WorkflowError::persistence)
}

pub fn list_open_unassigned(conn: &Connection) -> Result<Vec<Incident>, WorkflowError> {
    let mut stmt = conn
        .prepare(&format!(
            r#"SELECT {INCIDENT_COLUMNS} FROM incidents
               WHERE status = 'open' AND assigned_responder_id IS NULL
               ORDER BY created_at DESC"#
        ))
        .map_err(WorkflowError::persistence)?;
    let rows = stmt
        .query_map([], row_to_incident)
        .map_err(WorkflowError::persistence)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(WorkflowError::persistence)
}

pub fn incidents_by_responder(
    conn: &Connection,
    responder_id: i64,
    active_only: bool,
) -> Result<Vec<Incident>, WorkflowError> {
    let sql = if active_only {
        format!(
            r#"SELECT {INCIDENT_COLUMNS} FROM incidents
               WHERE assigned_responder_id = ?1
                 AND status NOT IN ('open', 'resolved', 'closed')
               ORDER BY created_at DESC"#
        )
    } else {
        format!(
            r#"SELECT {INCIDENT_COLUMNS} FROM incidents
               WHERE assigned_responder_id = ?1
               ORDER BY created_at DESC"#
        )
    };
    let mut stmt = conn.prepare(&sql).map_err(WorkflowError::persistence)?;
    let rows = stmt
        .query_map(params![responder_id], row_to_incident)
        .map_err(WorkflowError::persistence)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(WorkflowError::persistence)
}

/// The responder's current assignment, if any: an incident bound to them in
/// an active status. The schema cannot express "at most one", so readers
/// take the most recent and the accept path refuses to create a second.
pub fn active_assignment_for(
    conn: &Connection,
    responder_id: i64,
) -> Result<Option<Incident>, WorkflowError> {
    conn.query_row(
        &format!(
            r#"SELECT {INCIDENT_COLUMNS} FROM incidents
               WHERE assigned_responder_id = ?1
                 AND status NOT IN ('open', 'resolved', 'closed')
               ORDER BY updated_at DESC LIMIT 1"#
        ),
        params![responder_id],
        row_to_incident,
    )
    .optional()
    .map_err(WorkflowError::persistence)
}

// ============================================================================
// History Operations
// ============================================================================

pub fn insert_incident_history(
    conn: &Connection,
    incident_id: i64,
    status: IncidentStatus,
    notes: &str,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    conn.execute(
        r#"INSERT INTO incident_status_history (incident_id, status, notes, timestamp)
           VALUES (?1, ?2, ?3, ?4)"#,
        params![incident_id, status.as_str(), notes, now.to_rfc3339()],
    )
    .map_err(WorkflowError::persistence)?;
    Ok(())
}

pub fn incident_history_rows(
    conn: &Connection,
    incident_id: i64,
) -> Result<Vec<IncidentStatusHistory>, WorkflowError> {
    let mut stmt = conn
        .prepare(
            r#"SELECT id, incident_id, status, notes, timestamp
               FROM incident_status_history
               WHERE incident_id = ?1
               ORDER BY timestamp DESC, id DESC"#,
        )
        .map_err(WorkflowError::persistence)?;
    let rows = stmt
        .query_map(params![incident_id], row_to_incident_history)
        .map_err(WorkflowError::persistence)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(WorkflowError::persistence)
}

pub fn insert_responder_history(
    conn: &Connection,
    responder_id: i64,
    status: ResponderStatus,
    description: &str,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    conn.execute(
        r#"INSERT INTO responder_availability_history
           (responder_id, status, description, timestamp)
           VALUES (?1, ?2, ?3, ?4)"#,
        params![responder_id, status.as_str(), description, now.to_rfc3339()],
    )
    .map_err(WorkflowError::persistence)?;
    Ok(())
}

pub fn responder_history_rows(
    conn: &Connection,
    responder_id: i64,
) -> Result<Vec<ResponderAvailabilityHistory>, WorkflowError> {
    let mut stmt = conn
        .prepare(
            r#"SELECT id, responder_id, status, description, timestamp
               FROM responder_availability_history
               WHERE responder_id = ?1
               ORDER BY timestamp DESC, id DESC"#,
        )
        .map_err(WorkflowError::persistence)?;
    let rows = stmt
        .query_map(params![responder_id], row_to_responder_history)
        .map_err(WorkflowError::persistence)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(WorkflowError::persistence)
}

// ============================================================================
// Notification Operations
// ============================================================================

pub fn insert_notification(
    conn: &Connection,
    draft: &NotificationDraft,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    conn.execute(
        r#"INSERT INTO notifications
           (recipient_id, title, message, notification_type, category,
            related_incident_id, is_read, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)"#,
        params![
            draft.recipient_id,
            draft.title,
            draft.message,
            draft.notification_type.as_str(),
            draft.category.as_str(),
            draft.related_incident_id,
            now.to_rfc3339()
        ],
    )
    .map_err(WorkflowError::persistence)?;
    Ok(())
}

pub fn notifications_by_user(
    conn: &Connection,
    user_id: i64,
    unread_only: bool,
) -> Result<Vec<Notification>, WorkflowError> {
    let sql = if unread_only {
        r#"SELECT id, recipient_id, title, message, notification_type, category,
                  related_incident_id, is_read, created_at
           FROM notifications
           WHERE recipient_id = ?1 AND is_read = 0
           ORDER BY created_at DESC, id DESC"#
    } else {
        r#"SELECT id, recipient_id, title, message, notification_type, category,
                  related_incident_id, is_read, created_at
           FROM notifications
           WHERE recipient_id = ?1
           ORDER BY created_at DESC, id DESC"#
    };
    let mut stmt = conn.prepare(sql).map_err(WorkflowError::persistence)?;
    let rows = stmt
        .query_map(params![user_id], row_to_notification)
        .map_err(WorkflowError::persistence)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(WorkflowError::persistence)
}

/// Mark a notification read. Scoped to the recipient so one user cannot
/// touch another's inbox.
pub fn set_notification_read(
    conn: &Connection,
    notification_id: i64,
    user_id: i64,
) -> Result<bool, WorkflowError> {
    let count = conn
        .execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2",
            params![notification_id, user_id],
        )
        .map_err(WorkflowError::persistence)?;
    Ok(count > 0)
}

// ============================================================================
// Feedback Operations
// ============================================================================

pub fn insert_feedback(
    conn: &Connection,
    entry: &NewFeedback,
    now: DateTime<Utc>,
) -> Result<Feedback, WorkflowError> {
    conn.execute(
        r#"INSERT INTO feedback (user_id, incident_id, rating, message, status, created_at)
           VALUES (?1, ?2, ?3, ?4, 'pending', ?5)"#,
        params![
            entry.user_id,
            entry.incident_id,
            entry.rating,
            entry.message,
            now.to_rfc3339()
        ],
    )
    .map_err(WorkflowError::persistence)?;
    Ok(Feedback {
        id: conn.last_insert_rowid(),
        user_id: entry.user_id,
        incident_id: entry.incident_id,
        rating: entry.rating,
        message: entry.message.clone(),
        status: FeedbackStatus::Pending,
        reply: None,
        replied_at: None,
        created_at: now,
    })
}

pub fn feedback_by_incident(
    conn: &Connection,
    incident_id: i64,
) -> Result<Vec<Feedback>, WorkflowError> {
    let mut stmt = conn
        .prepare(
            r#"SELECT id, user_id, incident_id, rating, message, status, reply, replied_at,
                      created_at
               FROM feedback
               WHERE incident_id = ?1
               ORDER BY created_at DESC, id DESC"#,
        )
        .map_err(WorkflowError::persistence)?;
    let rows = stmt
        .query_map(params![incident_id], row_to_feedback)
        .map_err(WorkflowError::persistence)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(WorkflowError::persistence)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report(reporter_id: i64) -> NewIncident {
        NewIncident {
            reporter_id,
            incident_type: IncidentType::Medical,
            severity: Severity::High,
            location: "Main St".to_string(),
            description: "chest pain".to_string(),
            contact_phone: "5551234567".to_string(),
            people_involved: 1,
            immediate_action: None,
        }
    }

    #[test]
    fn test_user_and_responder_crud() {
        let db = Database::open_in_memory().unwrap();

        let user = db
            .create_user("rescuer", UserRole::Responder, Some("5550001111"))
            .unwrap();
        assert_eq!(user.role, UserRole::Responder);

        let responder = db
            .with_read(|conn| insert_responder(conn, user.id, "5550001111"))
            .unwrap();
        assert_eq!(responder.responder_ref, Responder::ref_for_user(user.id));
        assert_eq!(responder.status, ResponderStatus::Available);
        assert_eq!(responder.handled_incidents, 0);

        let loaded = db.responder_for_user(user.id).unwrap().unwrap();
        assert_eq!(loaded.id, responder.id);
    }

    #[test]
    fn test_incident_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let reporter = db.create_user("reporter", UserRole::User, None).unwrap();

        let incident = db
            .with_read(|conn| insert_incident(conn, &sample_report(reporter.id), Utc::now()))
            .unwrap();
        assert_eq!(incident.status, IncidentStatus::Open);
        assert!(incident.assigned_responder_id.is_none());
        assert!(incident.resolved_at.is_none());

        let loaded = db.incident(incident.id).unwrap().unwrap();
        assert_eq!(loaded.incident_type, IncidentType::Medical);
        assert_eq!(loaded.contact_phone, "5551234567");

        let open = db.open_unassigned_incidents().unwrap();
        assert_eq!(open.len(), 1);
    }

    #[test]
    fn test_claim_is_conditional() {
        let db = Database::open_in_memory().unwrap();
        let reporter = db.create_user("reporter", UserRole::User, None).unwrap();
        let user = db.create_user("rescuer", UserRole::Responder, None).unwrap();
        let responder = db
            .with_read(|conn| insert_responder(conn, user.id, "5550001111"))
            .unwrap();
        let incident = db
            .with_read(|conn| insert_incident(conn, &sample_report(reporter.id), Utc::now()))
            .unwrap();

        let claimed = db
            .with_read(|conn| claim_incident(conn, incident.id, responder.id, Utc::now()))
            .unwrap();
        assert_eq!(claimed, 1);

        // second claim loses
        let claimed = db
            .with_read(|conn| claim_incident(conn, incident.id, responder.id, Utc::now()))
            .unwrap();
        assert_eq!(claimed, 0);
    }

    #[test]
    fn test_notifications_scoped_to_recipient() {
        let db = Database::open_in_memory().unwrap();
        let reporter = db.create_user("reporter", UserRole::User, None).unwrap();
        let facility = db.create_user("clinic", UserRole::Facility, None).unwrap();
        let other = db.create_user("other", UserRole::Facility, None).unwrap();

        let incident = db
            .with_read(|conn| insert_incident(conn, &sample_report(reporter.id), Utc::now()))
            .unwrap();
        db.with_read(|conn| {
            insert_notification(
                conn,
                &NotificationDraft::incident_created(facility.id, &incident),
                Utc::now(),
            )
        })
        .unwrap();

        let unread = db.notifications_for_user(facility.id, true).unwrap();
        assert_eq!(unread.len(), 1);
        assert!(db.notifications_for_user(other.id, true).unwrap().is_empty());

        // another user cannot mark it read
        assert!(!db.mark_notification_read(unread[0].id, other.id).unwrap());
        assert!(db.mark_notification_read(unread[0].id, facility.id).unwrap());
        assert!(db.notifications_for_user(facility.id, true).unwrap().is_empty());
        assert_eq!(db.notifications_for_user(facility.id, false).unwrap().len(), 1);
    }

    #[test]
    fn test_feedback_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let reporter = db.create_user("reporter", UserRole::User, None).unwrap();
        let incident = db
            .with_read(|conn| insert_incident(conn, &sample_report(reporter.id), Utc::now()))
            .unwrap();

        let entry = NewFeedback {
            user_id: reporter.id,
            incident_id: Some(incident.id),
            rating: 4,
            message: "Quick arrival".to_string(),
        };
        let stored = db.create_feedback(&entry).unwrap();
        assert_eq!(stored.status, FeedbackStatus::Pending);

        let listed = db.feedback_for_incident(incident.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].rating, 4);
    }
}
