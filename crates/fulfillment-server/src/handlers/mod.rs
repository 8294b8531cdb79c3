// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP handlers, one module per core component they front.

/// C7 automation-task endpoints.
pub mod automation;

/// Process health.
pub mod health;

/// C4 inventory endpoints.
pub mod inventory;

/// C6 order and workflow-step endpoints.
pub mod orders;

/// C5 sales endpoints.
pub mod sales;
