// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The `Persistence` trait and the row types it reads and writes.
//!
//! Every entity in §3 of the data model gets a row struct here. All of C4
//! through C9's business logic is written against this trait, not against
//! `sqlx` directly, so that the atomic-update and locking discipline (§5)
//! lives in exactly one place: [`postgres::PostgresPersistence`].

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::Result;
use crate::types::{
    AssignmentStatus, AutomationTaskStatus, InventoryTransactionReason, OrderStatus, OrderType,
    Role, SaleChannel, TaskEventType, WorkflowStepStatus,
};

/// An order, as defined in §3.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Order {
    /// Primary key.
    pub id: i64,
    /// Order type, immutable after creation.
    pub order_type: OrderType,
    /// Current lifecycle status, owned exclusively by C6.
    pub status: OrderStatus,
    /// The user who created the order.
    pub created_by_user_id: i64,
    /// An optional chat channel this order is associated with.
    pub related_channel_id: Option<i64>,
    /// Free-form, normalised metadata (see C6 createOrder step 2).
    pub metadata: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Order type.
    pub order_type: OrderType,
    /// Creating user.
    pub created_by_user_id: i64,
    /// Optional chat channel association.
    pub related_channel_id: Option<i64>,
    /// Normalised metadata.
    pub metadata: Value,
}

/// A per-step workflow task, instantiated in bulk from the registry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkflowStepTask {
    /// Primary key.
    pub id: i64,
    /// The order this step belongs to.
    pub order_id: i64,
    /// Stable step key from the registry.
    pub step_key: String,
    /// User-visible title.
    pub title: String,
    /// The user bound to this step, if any (null means any holder of
    /// `assignedTo`'s role may complete it).
    pub assigned_user_id: Option<i64>,
    /// Current status.
    pub status: WorkflowStepStatus,
    /// Whether this step is required for order completion.
    pub required: bool,
    /// When this step became `active`.
    pub activated_at: Option<DateTime<Utc>>,
    /// When this step became `done`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version counter.
    pub version: i64,
}

/// An automation task, as defined in §3.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AutomationTask {
    /// Primary key.
    pub id: i64,
    /// A freeform type label, e.g. `"restock"`, `"delivery"`.
    pub task_type: String,
    /// Current status.
    pub status: AutomationTaskStatus,
    /// User-visible title.
    pub title: String,
    /// The user who created this task.
    pub created_by_user_id: i64,
    /// The order this task belongs to, if any.
    pub related_order_id: Option<i64>,
    /// The operational role required to claim/complete this task, if any.
    pub required_role: Option<Role>,
    /// The user who has claimed this task, if any.
    pub claimed_by_user_id: Option<i64>,
    /// When the task was claimed.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Whether this is the single order-root task for its order.
    pub is_order_root: bool,
    /// When the task reached `completed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Arbitrary metadata, e.g. `{trigger:"low_stock", inventory_id}` for
    /// restock tasks created by the low-stock hook.
    pub metadata: Value,
}

/// Fields required to create a new automation task.
#[derive(Debug, Clone)]
pub struct NewAutomationTask {
    /// Task type label.
    pub task_type: String,
    /// Initial status (`pending` unless `required_role` is set, in which
    /// case the caller should pass `open`).
    pub status: AutomationTaskStatus,
    /// Title.
    pub title: String,
    /// Creator.
    pub created_by_user_id: i64,
    /// Linked order, if any.
    pub related_order_id: Option<i64>,
    /// Required operational role, if any.
    pub required_role: Option<Role>,
    /// Whether this is an order-root task.
    pub is_order_root: bool,
    /// Metadata.
    pub metadata: Value,
}

/// A task assignment, binding an automation task to a user or role
/// placeholder.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskAssignment {
    /// Primary key.
    pub id: i64,
    /// The automation task this assignment belongs to.
    pub automation_task_id: i64,
    /// The bound user, or `None` for a role placeholder.
    pub user_id: Option<i64>,
    /// The role this assignment represents.
    pub role_hint: Role,
    /// Current status.
    pub status: AssignmentStatus,
    /// Free-form notes.
    pub notes: Option<String>,
    /// When the assignment was created.
    pub assigned_at: DateTime<Utc>,
    /// When the assignment reached `done`.
    pub completed_at: Option<DateTime<Utc>>,
}

/// An append-only automation-task audit event.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskEvent {
    /// Primary key.
    pub id: i64,
    /// The automation task this event concerns.
    pub automation_task_id: i64,
    /// The user who caused the event, if any.
    pub user_id: Option<i64>,
    /// The event kind.
    pub event_type: TaskEventType,
    /// Event-specific metadata.
    pub metadata: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Fields required to write a new task event.
#[derive(Debug, Clone)]
pub struct NewTaskEvent {
    /// The automation task this event concerns.
    pub automation_task_id: i64,
    /// The user who caused the event, if any.
    pub user_id: Option<i64>,
    /// The event kind.
    pub event_type: TaskEventType,
    /// Event-specific metadata.
    pub metadata: Value,
}

/// Per-product inventory.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Inventory {
    /// Primary key.
    pub id: i64,
    /// Unique product id.
    pub product_id: i64,
    /// Display name.
    pub product_name: String,
    /// Current stock on hand. Never negative.
    pub total_stock: i64,
    /// Lifetime units sold.
    pub total_sold: i64,
    /// Threshold at or below which the low-stock hook fires.
    pub low_stock_threshold: i64,
    /// Optimistic-concurrency version counter.
    pub version: i64,
}

/// An append-only inventory audit row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InventoryTransaction {
    /// Primary key.
    pub id: i64,
    /// The inventory row this transaction mutated.
    pub inventory_id: i64,
    /// Signed stock delta.
    pub change: i64,
    /// Reason code.
    pub reason: InventoryTransactionReason,
    /// The sale this transaction is associated with, if `reason = sale`.
    pub related_sale_id: Option<i64>,
    /// The order this transaction is associated with, if any.
    pub related_order_id: Option<i64>,
    /// A related processing batch id, if any (out of scope for this core;
    /// retained for cross-system referential consistency).
    pub related_batch_id: Option<i64>,
    /// The user who performed this mutation (system actor for hook-driven
    /// mutations, see [`crate::inventory::SYSTEM_ACTOR`]).
    pub performed_by_user_id: i64,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A recorded sale.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Sale {
    /// Primary key.
    pub id: i64,
    /// The product sold.
    pub product_id: i64,
    /// Quantity sold.
    pub quantity: i64,
    /// Unit price at time of sale.
    pub unit_price: Decimal,
    /// `quantity * unit_price`.
    pub total_amount: Decimal,
    /// The user who made the sale.
    pub sold_by_user_id: i64,
    /// The sale channel.
    pub sale_channel: SaleChannel,
    /// The order this sale fulfils, if any.
    pub related_order_id: Option<i64>,
    /// Caller-provided idempotency key, if any.
    pub idempotency_key: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Fields required to record a new sale.
#[derive(Debug, Clone)]
pub struct NewSale {
    /// The product sold.
    pub product_id: i64,
    /// Quantity sold.
    pub quantity: i64,
    /// Unit price.
    pub unit_price: Decimal,
    /// The selling user.
    pub sold_by_user_id: i64,
    /// The sale channel.
    pub sale_channel: SaleChannel,
    /// The order this sale fulfils, if any.
    pub related_order_id: Option<i64>,
    /// Caller-provided idempotency key, if any.
    pub idempotency_key: Option<String>,
}

/// A persisted notification, as produced by C9.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Notification {
    /// Primary key.
    pub id: i64,
    /// The recipient user.
    pub recipient_user_id: i64,
    /// Dotted event name that produced this notification.
    pub event: String,
    /// The entity type the notification concerns.
    pub entity_type: String,
    /// The entity id.
    pub entity_id: i64,
    /// Notification-specific payload.
    pub data: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// An append-only audit log row (the external audit sink's persisted
/// counterpart, also kept locally for traceability of admin overrides).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditLog {
    /// Primary key.
    pub id: i64,
    /// The acting user, if any.
    pub actor_user_id: Option<i64>,
    /// The action name, e.g. `"claimOverride"`, `"adminForceComplete"`.
    pub action: String,
    /// The resource type acted upon.
    pub resource_type: String,
    /// The resource id acted upon.
    pub resource_id: i64,
    /// Whether the action succeeded.
    pub success: bool,
    /// A human-readable reason, especially for failures.
    pub reason: Option<String>,
    /// Structured metadata.
    pub meta: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Filter parameters for [`Persistence::list_automation_tasks`].
#[derive(Debug, Clone, Default)]
pub struct TaskListFilter {
    /// Restrict to this status.
    pub status: Option<AutomationTaskStatus>,
    /// Restrict to this task type.
    pub task_type: Option<String>,
    /// Restrict to tasks created by this user.
    pub creator_id: Option<i64>,
    /// The caller, for visibility scoping (§4.7.6).
    pub current_user_id: i64,
    /// Whether the caller is a system admin (sees everything).
    pub current_user_is_admin: bool,
    /// The caller's operational roles, for the completed-task visibility
    /// widening rule.
    pub current_user_roles: Vec<Role>,
    /// Maximum rows to return.
    pub limit: i64,
    /// Rows to skip.
    pub offset: i64,
}

/// An inclusive date range for reporting queries.
#[derive(Debug, Clone, Copy)]
pub struct DateRange {
    /// Range start, inclusive.
    pub from: DateTime<Utc>,
    /// Range end, inclusive.
    pub to: DateTime<Utc>,
}

/// Aggregate sales summary, per [`crate::sales::SalesService::summary`].
#[derive(Debug, Clone)]
pub struct SalesSummary {
    /// Number of sale rows in range.
    pub count: i64,
    /// Total quantity across those rows.
    pub total_quantity: i64,
    /// Total amount across those rows.
    pub total_amount: Decimal,
}

/// Per-seller aggregate, per [`crate::sales::SalesService::agent_performance`].
#[derive(Debug, Clone)]
pub struct AgentPerformance {
    /// The selling user.
    pub user_id: i64,
    /// Number of sales by this user in range.
    pub count: i64,
    /// Total quantity sold by this user in range.
    pub total_quantity: i64,
    /// Total amount sold by this user in range.
    pub total_amount: Decimal,
}

/// The full persistence surface the engine is written against.
///
/// Implementations MUST honour the locking order Order → AutomationTask →
/// TaskAssignment → Inventory (§5) for any operation that touches more than
/// one of these tables, and MUST implement every `*_guarded` method as a
/// single WHERE-guarded UPDATE statement — never read-modify-write across
/// two round trips.
#[async_trait]
pub trait Persistence: Send + Sync {
    // ---- Orders ------------------------------------------------------
    /// Insert a new order with status `submitted`.
    async fn create_order(&self, new_order: NewOrder) -> Result<Order>;
    /// Fetch an order by id.
    async fn get_order(&self, id: i64) -> Result<Option<Order>>;
    /// Overwrite an order's status unconditionally (only C6 calls this,
    /// from within its own recomputation logic, which already holds the
    /// order-row lock).
    async fn set_order_status(&self, id: i64, status: OrderStatus) -> Result<()>;

    // ---- Workflow step tasks ------------------------------------------
    /// Bulk-insert the step tasks for a newly created order, in registry
    /// order, with index 0 `active` (and `activatedAt` set) and the rest
    /// `pending`.
    async fn create_workflow_step_tasks(
        &self,
        order_id: i64,
        steps: &[crate::registry::StepDef],
    ) -> Result<Vec<WorkflowStepTask>>;
    /// List every workflow step task for an order, in creation order.
    async fn list_workflow_step_tasks(&self, order_id: i64) -> Result<Vec<WorkflowStepTask>>;
    /// Fetch a single workflow step task by id.
    async fn get_workflow_step_task(&self, id: i64) -> Result<Option<WorkflowStepTask>>;
    /// The single atomic conditional update implementing §4.6's
    /// `completeStep`: `SET status='done' ... WHERE id=:id AND
    /// status='active' AND (assigned_user_id IS NULL OR assigned_user_id=:user_id)`.
    /// Returns the number of rows affected (0 or 1).
    async fn complete_workflow_step_guarded(&self, id: i64, user_id: i64) -> Result<u64>;
    /// The single atomic conditional update activating a pending step:
    /// `SET status='active', activated_at=now WHERE id=:id AND status='pending'`.
    async fn activate_workflow_step_guarded(&self, id: i64) -> Result<u64>;

    // ---- Automation tasks ----------------------------------------------
    /// Insert a new automation task.
    async fn create_automation_task(&self, new_task: NewAutomationTask) -> Result<AutomationTask>;
    /// Fetch an automation task by id, taking a row-level lock for update.
    /// Must be called within a transaction.
    async fn get_automation_task_for_update(&self, id: i64) -> Result<Option<AutomationTask>>;
    /// Fetch an automation task by id without locking.
    async fn get_automation_task(&self, id: i64) -> Result<Option<AutomationTask>>;
    /// The single atomic conditional update implementing the claim's
    /// normal path (§4.7.2 step 8): `SET claimed_by_user_id=:user_id,
    /// claimed_at=now, status='claimed' WHERE id=:id AND status IN
    /// ('open','pending') AND claimed_by_user_id IS NULL`.
    async fn claim_automation_task_guarded(&self, id: i64, user_id: i64) -> Result<u64>;
    /// Unconditional claim, used only by the admin override path, which has
    /// already validated the precondition under a row lock.
    async fn override_claim_automation_task(&self, id: i64, user_id: i64) -> Result<()>;
    /// Overwrite an automation task's status unconditionally (cascade
    /// completion, chaining). Caller must already hold the appropriate row
    /// lock within a transaction.
    async fn set_automation_task_status(&self, id: i64, status: AutomationTaskStatus) -> Result<()>;
    /// Find the single order-root automation task for an order.
    async fn find_order_root_task(&self, order_id: i64) -> Result<Option<AutomationTask>>;
    /// Find an automation task in the active set (`open`, `claimed`,
    /// `pending`) with the given required role for an order — used both to
    /// enforce the foreman→delivery chaining idempotency and to back the
    /// partial unique index with a pre-check for a clearer error message.
    async fn find_active_task_for_role(
        &self,
        order_id: i64,
        role: Role,
    ) -> Result<Option<AutomationTask>>;
    /// List every non-root automation task for an order still in `open`,
    /// `claimed`, or `inProgress`.
    async fn list_open_non_root_tasks_for_order(&self, order_id: i64) -> Result<Vec<AutomationTask>>;
    /// List automation tasks matching a scoped filter (§4.7.6).
    async fn list_automation_tasks(&self, filter: TaskListFilter) -> Result<Vec<AutomationTask>>;
    /// List the claimable queue for a role (§4.7.6's `availableTasksForRole`).
    async fn list_available_tasks_for_role(&self, role: Role) -> Result<Vec<AutomationTask>>;
    /// Find an open restock automation task whose metadata references the
    /// given inventory id (used by the low-stock hook's idempotency check).
    async fn find_open_restock_task_for_inventory(
        &self,
        inventory_id: i64,
    ) -> Result<Option<AutomationTask>>;

    // ---- Task assignments -----------------------------------------------
    /// Insert a new task assignment.
    async fn create_task_assignment(&self, new: NewTaskAssignment) -> Result<TaskAssignment>;
    /// Fetch an assignment by id.
    async fn get_task_assignment(&self, id: i64) -> Result<Option<TaskAssignment>>;
    /// List every assignment on a task.
    async fn list_task_assignments(&self, automation_task_id: i64) -> Result<Vec<TaskAssignment>>;
    /// Find an assignment already bound to `user_id` on this task, if any.
    async fn find_assignment_for_user(
        &self,
        automation_task_id: i64,
        user_id: i64,
    ) -> Result<Option<TaskAssignment>>;
    /// Find a placeholder assignment for `role_hint` on this task with no
    /// bound user, if any — used to bind the claimer to an existing
    /// placeholder rather than creating a duplicate row.
    async fn find_placeholder_assignment(
        &self,
        automation_task_id: i64,
        role_hint: Role,
    ) -> Result<Option<TaskAssignment>>;
    /// Find the first non-done assignment on a task ordered by id (used by
    /// the admin force-complete parameter-resolution path).
    async fn find_first_non_done_assignment(
        &self,
        automation_task_id: i64,
    ) -> Result<Option<TaskAssignment>>;
    /// Overwrite an assignment's status and bound user. Caller must already
    /// hold the appropriate row lock.
    async fn update_task_assignment(
        &self,
        id: i64,
        status: AssignmentStatus,
        user_id: Option<i64>,
        notes: Option<String>,
    ) -> Result<()>;

    // ---- Task events (append-only) ---------------------------------------
    /// Append a task event.
    async fn insert_task_event(&self, new: NewTaskEvent) -> Result<TaskEvent>;
    /// List every event for a task, oldest first.
    async fn list_task_events(&self, automation_task_id: i64) -> Result<Vec<TaskEvent>>;

    // ---- Inventory -----------------------------------------------------
    /// Insert a new inventory row. Fails with `Conflict` if `product_id`
    /// already has a row.
    async fn create_inventory_item(
        &self,
        product_id: i64,
        product_name: String,
        initial_stock: i64,
        low_stock_threshold: i64,
    ) -> Result<Inventory>;
    /// Fetch inventory by product id.
    async fn get_inventory_by_product(&self, product_id: i64) -> Result<Option<Inventory>>;
    /// Fetch inventory by its own id.
    async fn get_inventory(&self, id: i64) -> Result<Option<Inventory>>;
    /// Version-guarded stock mutation: `SET total_stock = total_stock +
    /// :delta, total_sold = total_sold + :sold_delta, version = version + 1
    /// WHERE id = :id AND version = :expected_version`. Returns rows
    /// affected.
    async fn mutate_inventory_guarded(
        &self,
        id: i64,
        expected_version: i64,
        stock_delta: i64,
        sold_delta: i64,
    ) -> Result<u64>;
    /// Version-guarded threshold mutation.
    async fn set_inventory_threshold_guarded(
        &self,
        id: i64,
        expected_version: i64,
        threshold: i64,
    ) -> Result<u64>;
    /// List inventory rows at or below their threshold.
    async fn list_low_stock(&self, limit: i64) -> Result<Vec<Inventory>>;
    /// Append an inventory transaction row.
    async fn insert_inventory_transaction(
        &self,
        inventory_id: i64,
        change: i64,
        reason: InventoryTransactionReason,
        related_sale_id: Option<i64>,
        related_order_id: Option<i64>,
        performed_by_user_id: i64,
        notes: Option<String>,
    ) -> Result<InventoryTransaction>;

    // ---- Sales -----------------------------------------------------------
    /// Find a sale by its idempotency key, if any.
    async fn find_sale_by_idempotency_key(&self, key: &str) -> Result<Option<Sale>>;
    /// Insert a new sale row.
    async fn insert_sale(&self, new: NewSale) -> Result<Sale>;
    /// Delete a sale row. Used only as a compensating action by
    /// [`crate::sales::SalesService::record_sale`] when the sale row was
    /// optimistically inserted but the subsequent stock decrement lost a
    /// concurrency race — never called on a sale a caller has observed.
    async fn delete_sale(&self, id: i64) -> Result<()>;
    /// Fetch a sale by id.
    async fn get_sale(&self, id: i64) -> Result<Option<Sale>>;
    /// Aggregate sales summary over an optional range.
    async fn sales_summary(&self, range: Option<DateRange>) -> Result<SalesSummary>;
    /// Per-seller aggregate over an optional range.
    async fn agent_performance(&self, range: Option<DateRange>) -> Result<Vec<AgentPerformance>>;

    // ---- Operational roles -------------------------------------------------
    /// Fetch a user's current operational roles, always read fresh (no
    /// caching layer — §9 design note on stale cached roles).
    async fn get_user_operational_roles(&self, user_id: i64) -> Result<Vec<Role>>;

    // ---- Notifications -----------------------------------------------------
    /// Persist a notification for one recipient.
    async fn insert_notification(
        &self,
        recipient_user_id: i64,
        event: &str,
        entity_type: &str,
        entity_id: i64,
        data: Value,
    ) -> Result<Notification>;
    /// List every user id that ever participated in an order: its creator,
    /// plus every user bound to an assignment on any automation task linked
    /// to the order.
    async fn list_order_participants(&self, order_id: i64) -> Result<Vec<i64>>;
    /// List every user currently holding a given operational role, for
    /// recipient resolution (e.g. `warehouse`/`foreman` on low-stock).
    async fn list_users_with_role(&self, role: Role) -> Result<Vec<i64>>;
    /// List every system admin user id.
    async fn list_admins(&self) -> Result<Vec<i64>>;

    // ---- Audit --------------------------------------------------------------
    /// Append an audit log row.
    async fn insert_audit_log(
        &self,
        actor_user_id: Option<i64>,
        action: &str,
        resource_type: &str,
        resource_id: i64,
        success: bool,
        reason: Option<String>,
        meta: Value,
    ) -> Result<AuditLog>;
}

/// Fields required to create a new task assignment.
#[derive(Debug, Clone)]
pub struct NewTaskAssignment {
    /// The automation task this assignment belongs to.
    pub automation_task_id: i64,
    /// The bound user, or `None` for a role placeholder.
    pub user_id: Option<i64>,
    /// The role this assignment represents.
    pub role_hint: Role,
    /// Initial status.
    pub status: AssignmentStatus,
    /// Free-form notes.
    pub notes: Option<String>,
}
