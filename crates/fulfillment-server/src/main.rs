// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fulfillment Server — HTTP entry point.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use fulfillment_core::automation::{AutomationEngine, AutomationHookSlot};
use fulfillment_core::config::Config;
use fulfillment_core::events::EventBus;
use fulfillment_core::inventory::InventoryService;
use fulfillment_core::migrations;
use fulfillment_core::notifications::NotificationDispatcher;
use fulfillment_core::orders::OrderEngine;
use fulfillment_core::persistence::{Persistence, PostgresPersistence};
use fulfillment_core::sales::SalesService;
use fulfillment_core::triggers::TriggerLayer;
use fulfillment_core::webhook::WebhookEmitter;

use fulfillment_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fulfillment_server=info".parse().unwrap())
                .add_directive("fulfillment_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting Fulfillment Server");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(environment = %config.environment, "Configuration loaded");

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
    info!(result = row.0, "Database health check passed");

    info!("Running database migrations...");
    migrations::run_postgres(&pool).await?;
    info!("Migrations completed");

    let persistence: Arc<dyn Persistence> = Arc::new(PostgresPersistence::new(pool));
    let events = Arc::new(EventBus::new());

    let webhook_emitter = Arc::new(WebhookEmitter::new(
        config.webhook_url.clone(),
        config.environment.clone(),
        Duration::from_millis(config.webhook_timeout_ms),
        config.webhook_idempotency_cache_size,
    ));
    events.subscribe(webhook_emitter);

    let notifications = Arc::new(NotificationDispatcher::new(persistence.clone()));
    events.subscribe(notifications);

    // C6 and C7 construct each other via a slot: OrderEngine gets a handle
    // to the slot now, AutomationEngine fills it once it exists.
    let hook_slot = AutomationHookSlot::empty();
    let orders = Arc::new(OrderEngine::new(persistence.clone(), events.clone(), hook_slot.clone()));
    let automation = Arc::new(AutomationEngine::new(persistence.clone(), events.clone(), orders.clone()));
    hook_slot.set(automation.clone());

    let triggers = Arc::new(TriggerLayer::new(automation.clone(), events.clone()));
    events.subscribe(triggers);

    let inventory = Arc::new(InventoryService::new(persistence.clone(), events.clone()));
    let sales = Arc::new(SalesService::new(persistence.clone(), inventory.clone(), events.clone()));

    let state = AppState {
        persistence,
        orders,
        automation,
        inventory,
        sales,
        start_time: Instant::now(),
    };

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let router = build_router(state);

    info!(addr = %bind_addr, "Fulfillment Server initialized successfully");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    server_handle.abort();

    info!("Shutdown complete");

    Ok(())
}
