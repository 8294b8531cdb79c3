// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `/inventory` — stock creation, restock, adjustment, low-stock queries.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use fulfillment_core::persistence::Inventory;
use fulfillment_core::types::InventoryTransactionReason;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    id: i64,
    product_id: i64,
    product_name: String,
    total_stock: i64,
    total_sold: i64,
    low_stock_threshold: i64,
    version: i64,
}

impl From<Inventory> for InventoryResponse {
    fn from(i: Inventory) -> Self {
        Self {
            id: i.id,
            product_id: i.product_id,
            product_name: i.product_name,
            total_stock: i.total_stock,
            total_sold: i.total_sold,
            low_stock_threshold: i.low_stock_threshold,
            version: i.version,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInventoryItemRequest {
    product_id: i64,
    name: String,
    #[serde(default)]
    initial_stock: i64,
    low_stock_threshold: i64,
}

/// `POST /inventory`.
pub async fn create_item(
    State(state): State<AppState>,
    Json(req): Json<CreateInventoryItemRequest>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let item = state
        .inventory
        .create_item(req.product_id, req.name, req.initial_stock, req.low_stock_threshold)
        .await?;
    Ok(Json(item.into()))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RestockRequest {
    quantity: i64,
    #[serde(default)]
    notes: Option<String>,
}

/// `POST /inventory/:productId/restock`.
pub async fn restock(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(product_id): Path<i64>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let item = state
        .inventory
        .restock(product_id, req.quantity, actor.user_id, req.notes)
        .await?;
    Ok(Json(item.into()))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdjustRequest {
    delta: i64,
    reason: InventoryTransactionReason,
    #[serde(default)]
    notes: Option<String>,
}

/// `POST /inventory/:productId/adjust`.
pub async fn adjust(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(product_id): Path<i64>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let item = state
        .inventory
        .adjust(product_id, req.delta, req.reason, actor.user_id, req.notes)
        .await?;
    Ok(Json(item.into()))
}

#[derive(Debug, Deserialize)]
pub struct ThresholdRequest {
    threshold: i64,
}

/// `POST /inventory/:productId/threshold`.
pub async fn set_threshold(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Json(req): Json<ThresholdRequest>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let item = state.inventory.set_threshold(product_id, req.threshold).await?;
    Ok(Json(item.into()))
}

#[derive(Debug, Deserialize, Default)]
pub struct LowStockQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// `GET /inventory/low-stock`.
pub async fn list_low_stock(
    State(state): State<AppState>,
    Query(q): Query<LowStockQuery>,
) -> Result<Json<Vec<InventoryResponse>>, ApiError> {
    let items = state.inventory.list_low_stock(q.limit).await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}
