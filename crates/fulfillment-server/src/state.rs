// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared application state and route table.

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use fulfillment_core::automation::AutomationEngine;
use fulfillment_core::inventory::InventoryService;
use fulfillment_core::orders::OrderEngine;
use fulfillment_core::persistence::Persistence;
use fulfillment_core::sales::SalesService;

use crate::handlers::{automation, health, inventory, orders, sales};
use crate::request_id;

/// Everything a handler needs, cloned cheaply per request via `Arc`s
/// underneath. Mirrors the shared-state pattern of the management handlers
/// this crate's health check is grounded on.
#[derive(Clone)]
pub struct AppState {
    pub persistence: Arc<dyn Persistence>,
    pub orders: Arc<OrderEngine>,
    pub automation: Arc<AutomationEngine>,
    pub inventory: Arc<InventoryService>,
    pub sales: Arc<SalesService>,
    pub start_time: Instant,
}

/// Assemble the full route table over `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/orders", post(orders::create_order))
        .route("/orders/{id}", get(orders::get_order))
        .route("/workflow-steps/{id}/complete", post(orders::complete_step))
        .route("/tasks", post(automation::create_task).get(automation::list_tasks))
        .route("/tasks/available", get(automation::available_tasks))
        .route("/tasks/{id}", get(automation::get_task))
        .route("/tasks/{id}/claim", post(automation::claim_task))
        .route("/tasks/{id}/complete", post(automation::complete_assignment))
        .route("/tasks/{id}/reassign-claim", post(automation::reassign_claim))
        .route("/tasks/{id}/cancel", post(automation::cancel_task))
        .route("/tasks/{id}/force-complete", post(automation::force_complete_task))
        .route("/tasks/{id}/events", get(automation::list_task_events))
        .route("/assignments/{id}/reassign", post(automation::reassign_assignment))
        .route("/inventory", post(inventory::create_item))
        .route("/inventory/low-stock", get(inventory::list_low_stock))
        .route("/inventory/{productId}/restock", post(inventory::restock))
        .route("/inventory/{productId}/adjust", post(inventory::adjust))
        .route("/inventory/{productId}/threshold", post(inventory::set_threshold))
        .route("/sales", post(sales::record_sale))
        .route("/sales/summary", get(sales::sales_summary))
        .route("/sales/agent-performance", get(sales::agent_performance))
        .route("/sales/{id}/classification", get(sales::classify_sale))
        .layer(request_id::propagate_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(request_id::set_layer())
        .with_state(state)
}
