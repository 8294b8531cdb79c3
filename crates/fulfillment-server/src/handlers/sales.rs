// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `/sales` — recording sales and reading commission-relevant aggregates.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use fulfillment_core::persistence::{AgentPerformance, DateRange, Sale, SalesSummary};
use fulfillment_core::sales::{RecordSaleInput, SaleClassification};
use fulfillment_core::types::{SaleChannel, SaleExclusionReason};

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    id: i64,
    product_id: i64,
    quantity: i64,
    unit_price: Decimal,
    total_amount: Decimal,
    sold_by_user_id: i64,
    sale_channel: SaleChannel,
    related_order_id: Option<i64>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<Sale> for SaleResponse {
    fn from(s: Sale) -> Self {
        Self {
            id: s.id,
            product_id: s.product_id,
            quantity: s.quantity,
            unit_price: s.unit_price,
            total_amount: s.total_amount,
            sold_by_user_id: s.sold_by_user_id,
            sale_channel: s.sale_channel,
            related_order_id: s.related_order_id,
            idempotency_key: s.idempotency_key,
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSaleRequest {
    product_id: i64,
    quantity: i64,
    unit_price: Decimal,
    sale_channel: SaleChannel,
    #[serde(default)]
    related_order_id: Option<i64>,
    #[serde(default)]
    idempotency_key: Option<String>,
}

/// `POST /sales`.
pub async fn record_sale(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<RecordSaleRequest>,
) -> Result<Json<SaleResponse>, ApiError> {
    let sale = state
        .sales
        .record_sale(
            RecordSaleInput {
                product_id: req.product_id,
                quantity: req.quantity,
                unit_price: req.unit_price,
                sold_by: actor.user_id,
                sale_channel: req.sale_channel,
                related_order_id: req.related_order_id,
                idempotency_key: req.idempotency_key,
            },
            Some(&actor),
        )
        .await?;
    Ok(Json(sale.into()))
}

#[derive(Debug, Deserialize, Default)]
pub struct DateRangeQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl DateRangeQuery {
    fn into_range(self) -> Option<DateRange> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Some(DateRange { from, to }),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummaryResponse {
    count: i64,
    total_quantity: i64,
    total_amount: Decimal,
}

impl From<SalesSummary> for SalesSummaryResponse {
    fn from(s: SalesSummary) -> Self {
        Self {
            count: s.count,
            total_quantity: s.total_quantity,
            total_amount: s.total_amount,
        }
    }
}

/// `GET /sales/summary?from=...&to=...`.
pub async fn sales_summary(
    State(state): State<AppState>,
    Query(q): Query<DateRangeQuery>,
) -> Result<Json<SalesSummaryResponse>, ApiError> {
    let summary = state.sales.summary(q.into_range()).await?;
    Ok(Json(summary.into()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformanceResponse {
    user_id: i64,
    count: i64,
    total_quantity: i64,
    total_amount: Decimal,
}

impl From<AgentPerformance> for AgentPerformanceResponse {
    fn from(a: AgentPerformance) -> Self {
        Self {
            user_id: a.user_id,
            count: a.count,
            total_quantity: a.total_quantity,
            total_amount: a.total_amount,
        }
    }
}

/// `GET /sales/agent-performance?from=...&to=...`.
pub async fn agent_performance(
    State(state): State<AppState>,
    Query(q): Query<DateRangeQuery>,
) -> Result<Json<Vec<AgentPerformanceResponse>>, ApiError> {
    let rows = state.sales.agent_performance(q.into_range()).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleClassificationResponse {
    commission_eligible: bool,
    exclusion_reason: Option<SaleExclusionReason>,
}

impl From<SaleClassification> for SaleClassificationResponse {
    fn from(c: SaleClassification) -> Self {
        Self {
            commission_eligible: c.commission_eligible,
            exclusion_reason: c.exclusion_reason,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationQuery {
    amount_threshold: Decimal,
}

/// `GET /sales/:id/classification?amountThreshold=...`.
pub async fn classify_sale(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<ClassificationQuery>,
) -> Result<Json<SaleClassificationResponse>, ApiError> {
    let classification = state.sales.classify_sale(id, q.amount_threshold).await?;
    Ok(Json(classification.into()))
}
