// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `POST /orders`, `GET /orders/:id`, `POST /workflow-steps/:id/complete`.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fulfillment_core::orders::CreateOrderInput;
use fulfillment_core::persistence::{Order, WorkflowStepTask};
use fulfillment_core::types::{OrderStatus, OrderType, WorkflowStepStatus};

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    order_type: OrderType,
    #[serde(default)]
    metadata: Value,
    #[serde(default)]
    related_channel_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    id: i64,
    order_type: OrderType,
    status: OrderStatus,
    created_by_user_id: i64,
    related_channel_id: Option<i64>,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            order_type: o.order_type,
            status: o.status,
            created_by_user_id: o.created_by_user_id,
            related_channel_id: o.related_channel_id,
            metadata: o.metadata,
            created_at: o.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepTaskResponse {
    id: i64,
    order_id: i64,
    step_key: String,
    title: String,
    assigned_user_id: Option<i64>,
    status: WorkflowStepStatus,
    required: bool,
    activated_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<WorkflowStepTask> for WorkflowStepTaskResponse {
    fn from(s: WorkflowStepTask) -> Self {
        Self {
            id: s.id,
            order_id: s.order_id,
            step_key: s.step_key,
            title: s.title,
            assigned_user_id: s.assigned_user_id,
            status: s.status,
            required: s.required,
            activated_at: s.activated_at,
            completed_at: s.completed_at,
        }
    }
}

/// `POST /orders`. Publishes `order.created`; the Trigger Layer reacts
/// out-of-band to instantiate the order's automation tasks.
pub async fn create_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .orders
        .create_order(
            CreateOrderInput {
                order_type: req.order_type,
                creator_id: actor.user_id,
                metadata: req.metadata,
                related_channel_id: req.related_channel_id,
            },
            Some(&actor),
        )
        .await?;
    Ok(Json(order.into()))
}

/// `GET /orders/:id`.
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .persistence
        .get_order(id)
        .await?
        .ok_or_else(|| fulfillment_core::error::CoreError::not_found("order", id))?;
    Ok(Json(order.into()))
}

/// `POST /workflow-steps/:id/complete`. Completes the step on behalf of the
/// caller; advancement to the next step and order-status recomputation
/// happen inside `OrderEngine::complete_step`.
pub async fn complete_step(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<i64>,
) -> Result<Json<WorkflowStepTaskResponse>, ApiError> {
    let step = state.orders.complete_step(id, actor.user_id, Some(&actor)).await?;
    Ok(Json(step.into()))
}
