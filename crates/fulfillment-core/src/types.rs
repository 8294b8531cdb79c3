// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tagged domain enums shared across modules.
//!
//! Every status/role/reason field in the data model is represented here as a
//! single Rust enum rather than a string. Conversion from external
//! representations (HTTP JSON bodies, stored `sqlx::Type` columns) happens
//! only at the persistence and HTTP boundaries; internal code always matches
//! on the variant, never on a string constant.

use serde::{Deserialize, Serialize};

/// The four order types the Workflow Registry (C1) knows how to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_type", rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    /// An agent-initiated restock order.
    AgentRestock,
    /// A retail order fulfilled directly to a walk-in customer.
    AgentRetail,
    /// A store-keeper-initiated restock order.
    StoreKeeperRestock,
    /// A wholesale order placed by an external customer.
    CustomerWholesale,
}

/// Order lifecycle status, recomputed by C6 after every workflow-step change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    /// Just created; step 1 is active.
    Submitted,
    /// At least one workflow step is active.
    InProgress,
    /// `deliverItems` is done but `confirmReceived` has not happened yet.
    AwaitingConfirmation,
    /// Every required workflow step is done.
    Completed,
    /// Terminal, non-success state.
    Cancelled,
}

/// Workflow-step task status. Transitions only `pending` → `active` → `done`,
/// or `pending` → `skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "workflow_step_status", rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum WorkflowStepStatus {
    /// Not yet reachable.
    Pending,
    /// The single currently-actionable step for its order.
    Active,
    /// Completed.
    Done,
    /// Bypassed (e.g. `confirmReceived` on `customerWholesale` orders, which
    /// do not include that step at all — `Skipped` exists for future
    /// registry entries that may be conditionally omitted per order).
    Skipped,
}

/// The operational role a workflow step or automation task is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "operational_role", rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// Assembles and hands off items.
    Foreman,
    /// Accepts and delivers items.
    Delivery,
    /// The original requester, who confirms final receipt.
    Requester,
    /// Holds stock, resolves low-stock restock tasks.
    Warehouse,
}

/// Automation task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "automation_task_status", rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum AutomationTaskStatus {
    /// Claimable, `claimedByUserId` is null.
    Open,
    /// Claimed by exactly one user.
    Claimed,
    /// Work is underway (set on non-claim-based tasks once work starts).
    InProgress,
    /// Created but not yet claim-eligible (no `requiredRole`).
    Pending,
    /// Terminal success state.
    Completed,
    /// Terminal, soft-deleted state.
    Cancelled,
}

/// TaskAssignment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "assignment_status", rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum AssignmentStatus {
    /// Not yet started.
    Pending,
    /// Bound to a user and underway.
    InProgress,
    /// Completed, either directly or via cross-role acknowledgement.
    Done,
    /// Bypassed.
    Skipped,
}

/// TaskEvent audit-trail event kind. Append-only, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_event_type", rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum TaskEventType {
    /// The task was created.
    Created,
    /// The task became claimable.
    Opened,
    /// The task was claimed.
    Claimed,
    /// The task or an assignment was reassigned.
    Reassigned,
    /// An assignment was created or bound to a user.
    Assigned,
    /// A linked workflow step was completed through this task.
    StepCompleted,
    /// The task reached a terminal completed state.
    Closed,
    /// The task was soft-deleted.
    Cancelled,
}

/// Reason code for an inventory transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "inventory_transaction_reason", rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum InventoryTransactionReason {
    /// Stock consumed by a sale.
    Sale,
    /// Stock added by a restock.
    Restock,
    /// Manual adjustment.
    Adjustment,
    /// Stock returned by a customer.
    Return,
    /// Stock written off as damaged.
    Damage,
    /// A correction to a prior erroneous transaction.
    Correction,
    /// Stock consumed into a processing step (out of scope for this core;
    /// retained so the reason enum matches external systems that may write
    /// transactions this core only reads).
    ProcessingIn,
    /// Stock produced out of a processing step.
    ProcessingOut,
}

/// Sale channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sale_channel", rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum SaleChannel {
    /// Sold by a field agent.
    Agent,
    /// Sold at a physical store.
    Store,
    /// Sold through an online storefront.
    Online,
    /// Sold to a wholesale customer.
    Wholesale,
}

/// A reason a sale is excluded from commission eligibility, returned by
/// `sales::classify_sale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SaleExclusionReason {
    /// The sale channel is not eligible for commission.
    ChannelNotEligible,
    /// The sale amount is below the configured threshold.
    AmountBelowThreshold,
    /// The product is on a commission-exclusion list.
    ProductExcluded,
}

/// Domain event names published on the event bus (C2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    /// An order was created.
    OrderCreated,
    /// An order's status changed.
    OrderStatusChanged,
    /// An order reached `completed`.
    OrderCompleted,
    /// An automation task was created.
    TaskCreated,
    /// An automation task became claimable.
    TaskOpened,
    /// An automation task was claimed.
    TaskClaimed,
    /// An automation task or assignment was reassigned.
    TaskReassigned,
    /// An automation task (or workflow step, per subscriber interpretation)
    /// was completed.
    TaskCompleted,
    /// C8 successfully instantiated automation tasks for an order.
    AutomationTriggered,
    /// C8 failed to instantiate automation tasks for an order.
    AutomationFailed,
    /// A sale was recorded.
    SaleCompleted,
    /// Inventory for a product fell at or below its low-stock threshold.
    InventoryLowStock,
}

impl EventName {
    /// The wire name used in the webhook envelope's `event` field and in
    /// `tracing` fields, e.g. `"order.created"`.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::OrderCreated => "order.created",
            Self::OrderStatusChanged => "order.statusChanged",
            Self::OrderCompleted => "order.completed",
            Self::TaskCreated => "task.created",
            Self::TaskOpened => "task.opened",
            Self::TaskClaimed => "task.claimed",
            Self::TaskReassigned => "task.reassigned",
            Self::TaskCompleted => "task.completed",
            Self::AutomationTriggered => "automation.triggered",
            Self::AutomationFailed => "automation.failed",
            Self::SaleCompleted => "sale.completed",
            Self::InventoryLowStock => "inventory.lowStock",
        }
    }
}

/// The identity of the caller making a request, as resolved by the external
/// authentication collaborator (`getCurrentUser`). The core trusts this
/// struct but always re-queries operational roles itself (§9 design note on
/// cached-role staleness).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    /// The caller's user id.
    pub user_id: i64,
    /// The caller's display username, echoed into webhook `actor` fields.
    pub username: String,
    /// Whether the caller is a system administrator, granting override
    /// paths throughout C7.
    pub is_system_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_names_are_dotted() {
        assert_eq!(EventName::OrderCreated.wire_name(), "order.created");
        assert_eq!(EventName::InventoryLowStock.wire_name(), "inventory.lowStock");
    }
}
