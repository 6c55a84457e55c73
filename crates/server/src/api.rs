//! HTTP boundary for the workflow core.
//!
//! Thin JSON handlers over the lifecycle/assignment services and the query
//! surfaces. Authentication and role enforcement live in the surrounding
//! deployment; the handlers only enforce what the operations themselves
//! require.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};

use aidalert_core::{
    Feedback, Incident, IncidentStatus, IncidentStatusHistory, NewFeedback, NewIncident,
    Notification, Responder, ResponderAvailabilityHistory, StatusFlags, TransitionAuthority,
    UserRecord, UserRole, WorkflowError,
};

use crate::assignment::AssignmentService;
use crate::db::Database;
use crate::dispatch::NotificationDispatcher;
use crate::lifecycle::IncidentLifecycle;

// ============================================================================
// Application State
// ============================================================================

pub struct AppState {
    pub db: Arc<Database>,
    pub lifecycle: IncidentLifecycle,
    pub assignments: AssignmentService,
    pub dispatcher: NotificationDispatcher,
}

impl AppState {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            lifecycle: IncidentLifecycle::new(db.clone()),
            assignments: AssignmentService::new(db.clone()),
            dispatcher: NotificationDispatcher::new(db.clone()),
            db,
        }
    }
}

pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/incidents", post(report_incident))
        .route("/api/incidents/open", get(list_open_incidents))
        .route("/api/incidents/:id", get(get_incident))
        .route("/api/incidents/:id/history", get(get_incident_history))
        .route("/api/incidents/:id/accept", post(accept_incident))
        .route("/api/incidents/:id/status", post(advance_incident))
        .route("/api/incidents/:id/assignment", put(set_assignment))
        .route("/api/incidents/:id/override", put(override_status))
        .route("/api/incidents/:id/escalate", post(escalate_incident))
        .route("/api/incidents/:id/feedback", get(list_incident_feedback))
        .route("/api/responders/:user_id/profile", post(ensure_profile))
        .route("/api/responders/:id/availability", post(toggle_availability))
        .route("/api/responders/:id/incidents", get(list_responder_incidents))
        .route("/api/responders/:id/history", get(get_responder_history))
        .route("/api/users/:id/notifications", get(list_notifications))
        .route("/api/notifications/:id/read", post(mark_notification_read))
        .route("/api/feedback", post(create_feedback))
        .route("/health", get(health))
        .with_state(state)
}

// ============================================================================
// Error Mapping
// ============================================================================

pub struct ApiError(WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WorkflowError::Validation { .. } | WorkflowError::InvalidTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
            WorkflowError::NotAssigned { .. } => StatusCode::FORBIDDEN,
            WorkflowError::ResponderBusy { .. }
            | WorkflowError::AlreadyAssigned { .. }
            | WorkflowError::AlreadyTerminal { .. }
            | WorkflowError::ResponderOnDuty => StatusCode::CONFLICT,
            WorkflowError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if let WorkflowError::Persistence { message } = &self.0 {
            tracing::error!("storage failure surfaced at the API: {message}");
        }

        let mut body = serde_json::json!({
            "success": false,
            "error": self.0.to_string(),
        });
        // let the client redirect to the assignment they already hold
        if let WorkflowError::ResponderBusy { active_incident_id } = &self.0 {
            body["active_incident_id"] = serde_json::json!(active_incident_id);
        }

        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
    role: UserRole,
    #[serde(default)]
    phone: Option<String>,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<UserRecord> {
    if req.username.trim().is_empty() {
        return Err(WorkflowError::validation("Username is required").into());
    }
    let user = state
        .db
        .create_user(&req.username, req.role, req.phone.as_deref())?;
    Ok(Json(user))
}

// ============================================================================
// Incidents
// ============================================================================

async fn report_incident(
    State(state): State<Arc<AppState>>,
    Json(report): Json<NewIncident>,
) -> ApiResult<Incident> {
    Ok(Json(state.lifecycle.create(report)?))
}

async fn list_open_incidents(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Incident>> {
    Ok(Json(state.db.open_unassigned_incidents()?))
}

async fn get_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Incident> {
    let incident = state
        .db
        .incident(id)?
        .ok_or(WorkflowError::NotFound { entity: "incident", id })?;
    Ok(Json(incident))
}

async fn get_incident_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<IncidentStatusHistory>> {
    Ok(Json(state.db.incident_history(id)?))
}

#[derive(Debug, Deserialize)]
struct AcceptRequest {
    responder_id: i64,
}

async fn accept_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AcceptRequest>,
) -> ApiResult<Incident> {
    Ok(Json(state.assignments.accept(req.responder_id, id)?))
}

#[derive(Debug, Deserialize)]
struct AdvanceRequest {
    responder_id: i64,
    status: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(flatten)]
    flags: StatusFlags,
}

async fn advance_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AdvanceRequest>,
) -> ApiResult<Incident> {
    let incident = state.assignments.advance_by_responder(
        req.responder_id,
        id,
        &req.status,
        req.notes,
        req.flags,
    )?;
    Ok(Json(incident))
}

#[derive(Debug, Deserialize)]
struct AssignmentRequest {
    /// Omit or null to unassign.
    #[serde(default)]
    responder_id: Option<i64>,
}

async fn set_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AssignmentRequest>,
) -> ApiResult<Incident> {
    Ok(Json(state.assignments.admin_assign(id, req.responder_id)?))
}

#[derive(Debug, Deserialize)]
struct OverrideRequest {
    status: String,
    #[serde(default)]
    notes: Option<String>,
}

async fn override_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<OverrideRequest>,
) -> ApiResult<Incident> {
    let target = IncidentStatus::parse(&req.status).ok_or(WorkflowError::InvalidTransition {
        value: req.status.clone(),
    })?;
    let incident = state.lifecycle.transition(
        id,
        target,
        req.notes.as_deref(),
        TransitionAuthority::Override,
    )?;
    Ok(Json(incident))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EscalationSource {
    Responder,
    Facility,
}

#[derive(Debug, Deserialize)]
struct EscalateRequest {
    source: EscalationSource,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct EscalateResponse {
    success: bool,
    notified: usize,
}

async fn escalate_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<EscalateRequest>,
) -> ApiResult<EscalateResponse> {
    let incident = state
        .db
        .incident(id)?
        .ok_or(WorkflowError::NotFound { entity: "incident", id })?;
    let notified = match req.source {
        EscalationSource::Responder => state
            .dispatcher
            .notify_critical_escalation(&incident, req.notes.as_deref())?,
        EscalationSource::Facility => state.dispatcher.notify_facility_escalation(&incident)?,
    };
    Ok(Json(EscalateResponse {
        success: true,
        notified,
    }))
}

async fn list_incident_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<Feedback>> {
    Ok(Json(state.db.feedback_for_incident(id)?))
}

// ============================================================================
// Responders
// ============================================================================

async fn ensure_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> ApiResult<Responder> {
    Ok(Json(state.assignments.ensure_responder_profile(user_id)?))
}

#[derive(Debug, Deserialize)]
struct ToggleRequest {
    active: bool,
}

async fn toggle_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ToggleRequest>,
) -> ApiResult<Responder> {
    Ok(Json(state.assignments.toggle_availability(id, req.active)?))
}

#[derive(Debug, Deserialize)]
struct ActiveFilter {
    #[serde(default)]
    active: bool,
}

async fn list_responder_incidents(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(filter): Query<ActiveFilter>,
) -> ApiResult<Vec<Incident>> {
    Ok(Json(state.db.incidents_for_responder(id, filter.active)?))
}

async fn get_responder_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<ResponderAvailabilityHistory>> {
    Ok(Json(state.db.responder_history(id)?))
}

// ============================================================================
// Notifications & Feedback
// ============================================================================

#[derive(Debug, Deserialize)]
struct UnreadFilter {
    #[serde(default)]
    unread: bool,
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(filter): Query<UnreadFilter>,
) -> ApiResult<Vec<Notification>> {
    Ok(Json(state.db.notifications_for_user(id, filter.unread)?))
}

#[derive(Debug, Deserialize)]
struct MarkReadRequest {
    user_id: i64,
}

#[derive(Debug, Serialize)]
struct MarkReadResponse {
    success: bool,
}

async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<MarkReadRequest>,
) -> ApiResult<MarkReadResponse> {
    let updated = state.db.mark_notification_read(id, req.user_id)?;
    if !updated {
        return Err(WorkflowError::NotFound { entity: "notification", id }.into());
    }
    Ok(Json(MarkReadResponse { success: true }))
}

async fn create_feedback(
    State(state): State<Arc<AppState>>,
    Json(entry): Json<NewFeedback>,
) -> ApiResult<Feedback> {
    Ok(Json(state.db.create_feedback(&entry)?))
}

// ============================================================================
// Health
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.db.health_check() {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ok"})),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "degraded", "error": err.to_string()})),
        ),
    }
}
