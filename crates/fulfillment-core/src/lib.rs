// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fulfillment Core — Workflow & Automation Engine
//!
//! This crate implements the core described by the Workflow & Automation
//! Engine specification: it compiles business orders into ordered,
//! role-scoped step graphs, coordinates role-based claiming and completion
//! of work items, propagates state transitions across two parallel task
//! models (per-step workflow tasks and per-role automation tasks), fans out
//! domain events into notifications and outbound webhooks, and keeps
//! inventory consistent with sales.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                      fulfillment-server (axum)                    │
//! └───────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         fulfillment-core                          │
//! │                                                                    │
//! │  registry ──▶ orders ──▶ automation ──▶ triggers                  │
//! │                 │            │                                    │
//! │                 ▼            ▼                                    │
//! │               events ◀───────┘ ──▶ webhook, notifications         │
//! │                 │                                                  │
//! │  inventory ◀── sales                                               │
//! └───────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//!                            PostgreSQL
//! ```
//!
//! # Modules
//!
//! - [`config`]: process configuration loaded from environment variables.
//! - [`error`]: the structured error taxonomy shared by every public
//!   operation.
//! - [`types`]: tagged enums for every status/role/reason field — conversion
//!   between external strings and these variants happens only at the
//!   persistence and HTTP boundaries.
//! - [`registry`]: the immutable, process-wide workflow step registry (C1).
//! - [`events`]: the in-process domain event bus (C2).
//! - [`webhook`]: the outbound webhook emitter (C3).
//! - [`inventory`]: per-product stock with atomic mutation and low-stock
//!   triggers (C4).
//! - [`sales`]: atomic, idempotent sale recording (C5).
//! - [`orders`]: order creation and workflow-step completion (C6).
//! - [`automation`]: automation task claim/complete/cascade (C7).
//! - [`triggers`]: order-creation → automation-task instantiation glue (C8).
//! - [`notifications`]: recipient resolution and notification persistence
//!   (C9).
//! - [`persistence`]: the `Persistence` trait and its PostgreSQL
//!   implementation.

#![deny(missing_docs)]

/// Process configuration loaded from environment variables.
pub mod config;

/// Structured error taxonomy for every public core operation.
pub mod error;

/// Tagged domain enums shared across modules.
pub mod types;

/// C1 — the immutable workflow step registry.
pub mod registry;

/// C2 — the in-process domain event bus.
pub mod events;

/// C3 — the outbound webhook emitter.
pub mod webhook;

/// C4 — inventory stock and low-stock triggers.
pub mod inventory;

/// C5 — sales recording and reporting.
pub mod sales;

/// C6 — order creation and workflow-step completion.
pub mod orders;

/// C7 — automation task claim/complete/cascade.
pub mod automation;

/// C8 — order-creation trigger glue.
pub mod triggers;

/// C9 — notification recipient resolution and persistence.
pub mod notifications;

/// Persistence trait and PostgreSQL-backed implementation.
pub mod persistence;

/// Embedded PostgreSQL migrations.
pub mod migrations {
    /// PostgreSQL migrator with all core migrations embedded.
    pub static POSTGRES: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgres");

    /// Run PostgreSQL migrations. Safe to call repeatedly.
    pub async fn run_postgres(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        POSTGRES.run(pool).await
    }
}
