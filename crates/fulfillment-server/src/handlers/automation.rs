// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `/tasks` — automation task claim/complete/cascade endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fulfillment_core::persistence::{AutomationTask, TaskAssignment, TaskEvent};
use fulfillment_core::types::{AssignmentStatus, AutomationTaskStatus, Role, TaskEventType};

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    id: i64,
    task_type: String,
    status: AutomationTaskStatus,
    title: String,
    created_by_user_id: i64,
    related_order_id: Option<i64>,
    required_role: Option<Role>,
    claimed_by_user_id: Option<i64>,
    claimed_at: Option<DateTime<Utc>>,
    is_order_root: bool,
    completed_at: Option<DateTime<Utc>>,
    metadata: Value,
}

impl From<AutomationTask> for TaskResponse {
    fn from(t: AutomationTask) -> Self {
        Self {
            id: t.id,
            task_type: t.task_type,
            status: t.status,
            title: t.title,
            created_by_user_id: t.created_by_user_id,
            related_order_id: t.related_order_id,
            required_role: t.required_role,
            claimed_by_user_id: t.claimed_by_user_id,
            claimed_at: t.claimed_at,
            is_order_root: t.is_order_root,
            completed_at: t.completed_at,
            metadata: t.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResponse {
    id: i64,
    automation_task_id: i64,
    user_id: Option<i64>,
    role_hint: Role,
    status: AssignmentStatus,
    notes: Option<String>,
    assigned_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<TaskAssignment> for AssignmentResponse {
    fn from(a: TaskAssignment) -> Self {
        Self {
            id: a.id,
            automation_task_id: a.automation_task_id,
            user_id: a.user_id,
            role_hint: a.role_hint,
            status: a.status,
            notes: a.notes,
            assigned_at: a.assigned_at,
            completed_at: a.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEventResponse {
    id: i64,
    automation_task_id: i64,
    user_id: Option<i64>,
    event_type: TaskEventType,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl From<TaskEvent> for TaskEventResponse {
    fn from(e: TaskEvent) -> Self {
        Self {
            id: e.id,
            automation_task_id: e.automation_task_id,
            user_id: e.user_id,
            event_type: e.event_type,
            metadata: e.metadata,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithAssignmentsResponse {
    task: TaskResponse,
    assignments: Vec<AssignmentResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    task_type: String,
    title: String,
    #[serde(default)]
    related_order_id: Option<i64>,
    #[serde(default)]
    required_role: Option<Role>,
    #[serde(default)]
    is_order_root: bool,
    #[serde(default)]
    assignment_roles: Vec<Role>,
    #[serde(default)]
    metadata: Value,
}

/// `POST /tasks`. Ad-hoc task creation for roles not covered by the Trigger
/// Layer's order-creation template (e.g. manually opened admin work items).
pub async fn create_task(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state
        .automation
        .create_task(
            req.task_type,
            req.title,
            actor.user_id,
            req.related_order_id,
            req.required_role,
            req.is_order_root,
            &req.assignment_roles,
            req.metadata,
            Some(&actor),
        )
        .await?;
    Ok(Json(task.into()))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    #[serde(default, rename = "override")]
    override_: bool,
}

/// `POST /tasks/:id/claim`.
pub async fn claim_task(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<i64>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.automation.claim(id, &actor, req.override_).await?;
    Ok(Json(task.into()))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompleteAssignmentRequest {
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    assignment_id: Option<i64>,
}

/// `POST /tasks/:id/complete`.
pub async fn complete_assignment(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<i64>,
    Json(req): Json<CompleteAssignmentRequest>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let assignment = state
        .automation
        .complete_assignment(id, &actor, req.notes, req.assignment_id)
        .await?;
    Ok(Json(assignment.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignClaimRequest {
    new_user_id: i64,
}

/// `POST /tasks/:id/reassign-claim`. Admin-only.
pub async fn reassign_claim(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<i64>,
    Json(req): Json<ReassignClaimRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.automation.reassign_claim(id, req.new_user_id, &actor).await?;
    Ok(Json(task.into()))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReassignAssignmentRequest {
    #[serde(default)]
    new_user_id: Option<i64>,
}

/// `POST /assignments/:id/reassign`. Admin-only.
pub async fn reassign_assignment(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<i64>,
    Json(req): Json<ReassignAssignmentRequest>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let assignment = state
        .automation
        .reassign_assignment(id, req.new_user_id, &actor)
        .await?;
    Ok(Json(assignment.into()))
}

/// `POST /tasks/:id/cancel`.
pub async fn cancel_task(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<i64>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.automation.cancel(id, &actor).await?;
    Ok(Json(task.into()))
}

/// `POST /tasks/:id/force-complete`. Admin-only.
pub async fn force_complete_task(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<i64>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.automation.admin_force_complete(id, &actor).await?;
    Ok(Json(task.into()))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    status: Option<AutomationTaskStatus>,
    task_type: Option<String>,
    creator_id: Option<i64>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// `GET /tasks`. Visibility-scoped per §4.7.6: the caller only sees tasks
/// they created, are assigned to, or hold the required role for, unless
/// they're a system admin.
pub async fn list_tasks(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(q): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let tasks = state
        .automation
        .list_tasks(q.status, q.task_type, q.creator_id, &actor, q.limit, q.offset)
        .await?;
    Ok(Json(tasks.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
pub struct AvailableTasksQuery {
    role: Role,
}

/// `GET /tasks/available`. The claimable queue for a role.
pub async fn available_tasks(
    State(state): State<AppState>,
    Query(q): Query<AvailableTasksQuery>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let tasks = state.automation.available_tasks_for_role(q.role).await?;
    Ok(Json(tasks.into_iter().map(Into::into).collect()))
}

/// `GET /tasks/:id`. Eager-fetches assignments alongside the task.
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TaskWithAssignmentsResponse>, ApiError> {
    let (task, assignments) = state.automation.get_task_with_assignments(id).await?;
    Ok(Json(TaskWithAssignmentsResponse {
        task: task.into(),
        assignments: assignments.into_iter().map(Into::into).collect(),
    }))
}

/// `GET /tasks/:id/events`. The task's append-only audit trail.
pub async fn list_task_events(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TaskEventResponse>>, ApiError> {
    let events = state.automation.list_events(id).await?;
    Ok(Json(events.into_iter().map(Into::into).collect()))
}
