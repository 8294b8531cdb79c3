// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The PostgreSQL implementation of [`super::Persistence`].
//!
//! Every `*_guarded` method is a single `UPDATE ... WHERE ...` statement —
//! the WHERE clause is the entire correctness argument, per §5's ordering
//! guarantees. No method here performs a read, a business decision, and a
//! write across two round trips where a single guarded statement would do.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::CoreError;
use crate::registry::StepDef;
use crate::types::{
    AssignmentStatus, AutomationTaskStatus, InventoryTransactionReason, OrderStatus, Role,
    WorkflowStepStatus,
};

use super::{
    AgentPerformance, AuditLog, AutomationTask, DateRange, Inventory, InventoryTransaction,
    NewAutomationTask, NewOrder, NewSale, NewTaskAssignment, NewTaskEvent, Notification, Order,
    Persistence, Sale, SalesSummary, TaskAssignment, TaskEvent, TaskListFilter, WorkflowStepTask,
};

/// A PostgreSQL-backed [`Persistence`] implementation.
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Borrow the underlying pool, e.g. for running migrations at startup.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Persistence for PostgresPersistence {
    async fn create_order(&self, new_order: NewOrder) -> crate::error::Result<Order> {
        let row = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (order_type, status, created_by_user_id, related_channel_id, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, now())
            RETURNING id, order_type, status, created_by_user_id, related_channel_id, metadata, created_at
            "#,
        )
        .bind(new_order.order_type)
        .bind(OrderStatus::Submitted)
        .bind(new_order.created_by_user_id)
        .bind(new_order.related_channel_id)
        .bind(new_order.metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_order(&self, id: i64) -> crate::error::Result<Option<Order>> {
        let row = sqlx::query_as::<_, Order>(
            "SELECT id, order_type, status, created_by_user_id, related_channel_id, metadata, created_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_order_status(&self, id: i64, status: OrderStatus) -> crate::error::Result<()> {
        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_workflow_step_tasks(
        &self,
        order_id: i64,
        steps: &[StepDef],
    ) -> crate::error::Result<Vec<WorkflowStepTask>> {
        let mut tx = self.pool.begin().await?;
        let mut out = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let status = if index == 0 {
                WorkflowStepStatus::Active
            } else {
                WorkflowStepStatus::Pending
            };
            let activated_at = if index == 0 { Some(Utc::now()) } else { None };
            let row = sqlx::query_as::<_, WorkflowStepTask>(
                r#"
                INSERT INTO workflow_step_tasks
                    (order_id, step_key, title, assigned_user_id, status, required, activated_at, completed_at, version)
                VALUES ($1, $2, $3, NULL, $4, $5, $6, NULL, 0)
                RETURNING id, order_id, step_key, title, assigned_user_id, status, required, activated_at, completed_at, version
                "#,
            )
            .bind(order_id)
            .bind(step.step_key)
            .bind(step.title)
            .bind(status)
            .bind(step.required)
            .bind(activated_at)
            .fetch_one(&mut *tx)
            .await?;
            out.push(row);
        }
        tx.commit().await?;
        Ok(out)
    }

    async fn list_workflow_step_tasks(&self, order_id: i64) -> crate::error::Result<Vec<WorkflowStepTask>> {
        let rows = sqlx::query_as::<_, WorkflowStepTask>(
            "SELECT id, order_id, step_key, title, assigned_user_id, status, required, activated_at, completed_at, version FROM workflow_step_tasks WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_workflow_step_task(&self, id: i64) -> crate::error::Result<Option<WorkflowStepTask>> {
        let row = sqlx::query_as::<_, WorkflowStepTask>(
            "SELECT id, order_id, step_key, title, assigned_user_id, status, required, activated_at, completed_at, version FROM workflow_step_tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn complete_workflow_step_guarded(&self, id: i64, user_id: i64) -> crate::error::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_step_tasks
            SET status = $3, completed_at = now(), version = version + 1
            WHERE id = $1
              AND status = $4
              AND (assigned_user_id IS NULL OR assigned_user_id = $2)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(WorkflowStepStatus::Done)
        .bind(WorkflowStepStatus::Active)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn activate_workflow_step_guarded(&self, id: i64) -> crate::error::Result<u64> {
        let result = sqlx::query(
            "UPDATE workflow_step_tasks SET status = $2, activated_at = now() WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(WorkflowStepStatus::Active)
        .bind(WorkflowStepStatus::Pending)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn create_automation_task(&self, new_task: NewAutomationTask) -> crate::error::Result<AutomationTask> {
        let row = sqlx::query_as::<_, AutomationTask>(
            r#"
            INSERT INTO automation_tasks
                (task_type, status, title, created_by_user_id, related_order_id, required_role, claimed_by_user_id, claimed_at, is_order_root, completed_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, NULL, NULL, $7, NULL, $8)
            RETURNING id, task_type, status, title, created_by_user_id, related_order_id, required_role, claimed_by_user_id, claimed_at, is_order_root, completed_at, metadata
            "#,
        )
        .bind(&new_task.task_type)
        .bind(new_task.status)
        .bind(&new_task.title)
        .bind(new_task.created_by_user_id)
        .bind(new_task.related_order_id)
        .bind(new_task.required_role)
        .bind(new_task.is_order_root)
        .bind(new_task.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => CoreError::conflict(
                "an active automation task already exists for this order and required role",
            ),
            _ => CoreError::from(err),
        })?;
        Ok(row)
    }

    async fn get_automation_task_for_update(&self, id: i64) -> crate::error::Result<Option<AutomationTask>> {
        let row = sqlx::query_as::<_, AutomationTask>(
            "SELECT id, task_type, status, title, created_by_user_id, related_order_id, required_role, claimed_by_user_id, claimed_at, is_order_root, completed_at, metadata FROM automation_tasks WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_automation_task(&self, id: i64) -> crate::error::Result<Option<AutomationTask>> {
        let row = sqlx::query_as::<_, AutomationTask>(
            "SELECT id, task_type, status, title, created_by_user_id, related_order_id, required_role, claimed_by_user_id, claimed_at, is_order_root, completed_at, metadata FROM automation_tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn claim_automation_task_guarded(&self, id: i64, user_id: i64) -> crate::error::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE automation_tasks
            SET claimed_by_user_id = $2, claimed_at = now(), status = $3
            WHERE id = $1
              AND status IN ('open', 'pending')
              AND claimed_by_user_id IS NULL
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(AutomationTaskStatus::Claimed)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn override_claim_automation_task(&self, id: i64, user_id: i64) -> crate::error::Result<()> {
        sqlx::query(
            "UPDATE automation_tasks SET claimed_by_user_id = $2, claimed_at = now(), status = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(user_id)
        .bind(AutomationTaskStatus::Claimed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_automation_task_status(&self, id: i64, status: AutomationTaskStatus) -> crate::error::Result<()> {
        let completed_at = matches!(status, AutomationTaskStatus::Completed).then(Utc::now);
        sqlx::query("UPDATE automation_tasks SET status = $2, completed_at = COALESCE($3, completed_at) WHERE id = $1")
            .bind(id)
            .bind(status)
            .bind(completed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_order_root_task(&self, order_id: i64) -> crate::error::Result<Option<AutomationTask>> {
        let row = sqlx::query_as::<_, AutomationTask>(
            "SELECT id, task_type, status, title, created_by_user_id, related_order_id, required_role, claimed_by_user_id, claimed_at, is_order_root, completed_at, metadata FROM automation_tasks WHERE related_order_id = $1 AND is_order_root = TRUE",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_active_task_for_role(
        &self,
        order_id: i64,
        role: Role,
    ) -> crate::error::Result<Option<AutomationTask>> {
        let row = sqlx::query_as::<_, AutomationTask>(
            r#"
            SELECT id, task_type, status, title, created_by_user_id, related_order_id, required_role, claimed_by_user_id, claimed_at, is_order_root, completed_at, metadata
            FROM automation_tasks
            WHERE related_order_id = $1 AND required_role = $2 AND status IN ('open', 'claimed', 'pending')
            "#,
        )
        .bind(order_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_open_non_root_tasks_for_order(&self, order_id: i64) -> crate::error::Result<Vec<AutomationTask>> {
        let rows = sqlx::query_as::<_, AutomationTask>(
            r#"
            SELECT id, task_type, status, title, created_by_user_id, related_order_id, required_role, claimed_by_user_id, claimed_at, is_order_root, completed_at, metadata
            FROM automation_tasks
            WHERE related_order_id = $1 AND is_order_root = FALSE AND status IN ('open', 'claimed', 'inProgress')
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_automation_tasks(&self, filter: TaskListFilter) -> crate::error::Result<Vec<AutomationTask>> {
        // Non-admins see: tasks they created, tasks they're assigned to, and
        // completed tasks whose requiredRole matches one of their roles.
        let rows = sqlx::query_as::<_, AutomationTask>(
            r#"
            SELECT t.id, t.task_type, t.status, t.title, t.created_by_user_id, t.related_order_id, t.required_role, t.claimed_by_user_id, t.claimed_at, t.is_order_root, t.completed_at, t.metadata
            FROM automation_tasks t
            WHERE ($1 OR
                    t.created_by_user_id = $2
                    OR EXISTS (SELECT 1 FROM task_assignments a WHERE a.automation_task_id = t.id AND a.user_id = $2)
                    OR (t.status = 'completed' AND t.required_role = ANY($3))
                  )
              AND ($4::automation_task_status IS NULL OR t.status = $4)
              AND ($5::text IS NULL OR t.task_type = $5)
              AND ($6::bigint IS NULL OR t.created_by_user_id = $6)
            ORDER BY t.id DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(filter.current_user_is_admin)
        .bind(filter.current_user_id)
        .bind(&filter.current_user_roles)
        .bind(filter.status)
        .bind(&filter.task_type)
        .bind(filter.creator_id)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_available_tasks_for_role(&self, role: Role) -> crate::error::Result<Vec<AutomationTask>> {
        let rows = sqlx::query_as::<_, AutomationTask>(
            r#"
            SELECT t.id, t.task_type, t.status, t.title, t.created_by_user_id, t.related_order_id, t.required_role, t.claimed_by_user_id, t.claimed_at, t.is_order_root, t.completed_at, t.metadata
            FROM automation_tasks t
            WHERE t.required_role = $1
              AND t.status = 'open'
              AND t.claimed_by_user_id IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM task_assignments a
                  WHERE a.automation_task_id = t.id AND a.role_hint IN ('foreman', 'delivery')
              )
            ORDER BY t.id
            "#,
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_open_restock_task_for_inventory(
        &self,
        inventory_id: i64,
    ) -> crate::error::Result<Option<AutomationTask>> {
        let row = sqlx::query_as::<_, AutomationTask>(
            r#"
            SELECT id, task_type, status, title, created_by_user_id, related_order_id, required_role, claimed_by_user_id, claimed_at, is_order_root, completed_at, metadata
            FROM automation_tasks
            WHERE task_type = 'restock'
              AND status IN ('open', 'claimed', 'pending', 'inProgress')
              AND (metadata ->> 'inventory_id')::bigint = $1
            "#,
        )
        .bind(inventory_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_task_assignment(&self, new: NewTaskAssignment) -> crate::error::Result<TaskAssignment> {
        let row = sqlx::query_as::<_, TaskAssignment>(
            r#"
            INSERT INTO task_assignments (automation_task_id, user_id, role_hint, status, notes, assigned_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, now(), NULL)
            RETURNING id, automation_task_id, user_id, role_hint, status, notes, assigned_at, completed_at
            "#,
        )
        .bind(new.automation_task_id)
        .bind(new.user_id)
        .bind(new.role_hint)
        .bind(new.status)
        .bind(new.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_task_assignment(&self, id: i64) -> crate::error::Result<Option<TaskAssignment>> {
        let row = sqlx::query_as::<_, TaskAssignment>(
            "SELECT id, automation_task_id, user_id, role_hint, status, notes, assigned_at, completed_at FROM task_assignments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_task_assignments(&self, automation_task_id: i64) -> crate::error::Result<Vec<TaskAssignment>> {
        let rows = sqlx::query_as::<_, TaskAssignment>(
            "SELECT id, automation_task_id, user_id, role_hint, status, notes, assigned_at, completed_at FROM task_assignments WHERE automation_task_id = $1 ORDER BY id",
        )
        .bind(automation_task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_assignment_for_user(
        &self,
        automation_task_id: i64,
        user_id: i64,
    ) -> crate::error::Result<Option<TaskAssignment>> {
        let row = sqlx::query_as::<_, TaskAssignment>(
            "SELECT id, automation_task_id, user_id, role_hint, status, notes, assigned_at, completed_at FROM task_assignments WHERE automation_task_id = $1 AND user_id = $2",
        )
        .bind(automation_task_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_placeholder_assignment(
        &self,
        automation_task_id: i64,
        role_hint: Role,
    ) -> crate::error::Result<Option<TaskAssignment>> {
        let row = sqlx::query_as::<_, TaskAssignment>(
            "SELECT id, automation_task_id, user_id, role_hint, status, notes, assigned_at, completed_at FROM task_assignments WHERE automation_task_id = $1 AND role_hint = $2 AND user_id IS NULL LIMIT 1",
        )
        .bind(automation_task_id)
        .bind(role_hint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_first_non_done_assignment(
        &self,
        automation_task_id: i64,
    ) -> crate::error::Result<Option<TaskAssignment>> {
        let row = sqlx::query_as::<_, TaskAssignment>(
            "SELECT id, automation_task_id, user_id, role_hint, status, notes, assigned_at, completed_at FROM task_assignments WHERE automation_task_id = $1 AND status != 'done' ORDER BY id LIMIT 1",
        )
        .bind(automation_task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_task_assignment(
        &self,
        id: i64,
        status: AssignmentStatus,
        user_id: Option<i64>,
        notes: Option<String>,
    ) -> crate::error::Result<()> {
        let completed_at = matches!(status, AssignmentStatus::Done).then(Utc::now);
        sqlx::query(
            r#"
            UPDATE task_assignments
            SET status = $2,
                user_id = COALESCE($3, user_id),
                notes = COALESCE($4, notes),
                completed_at = COALESCE($5, completed_at)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(user_id)
        .bind(notes)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_task_event(&self, new: NewTaskEvent) -> crate::error::Result<TaskEvent> {
        let row = sqlx::query_as::<_, TaskEvent>(
            r#"
            INSERT INTO task_events (automation_task_id, user_id, event_type, metadata, created_at)
            VALUES ($1, $2, $3, $4, now())
            RETURNING id, automation_task_id, user_id, event_type, metadata, created_at
            "#,
        )
        .bind(new.automation_task_id)
        .bind(new.user_id)
        .bind(new.event_type)
        .bind(new.metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_task_events(&self, automation_task_id: i64) -> crate::error::Result<Vec<TaskEvent>> {
        let rows = sqlx::query_as::<_, TaskEvent>(
            "SELECT id, automation_task_id, user_id, event_type, metadata, created_at FROM task_events WHERE automation_task_id = $1 ORDER BY id",
        )
        .bind(automation_task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_inventory_item(
        &self,
        product_id: i64,
        product_name: String,
        initial_stock: i64,
        low_stock_threshold: i64,
    ) -> crate::error::Result<Inventory> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, Inventory>(
            r#"
            INSERT INTO inventory (product_id, product_name, total_stock, total_sold, low_stock_threshold, version)
            VALUES ($1, $2, $3, 0, $4, 0)
            RETURNING id, product_id, product_name, total_stock, total_sold, low_stock_threshold, version
            "#,
        )
        .bind(product_id)
        .bind(&product_name)
        .bind(initial_stock)
        .bind(low_stock_threshold)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                CoreError::conflict(format!("inventory already exists for product {product_id}"))
            }
            _ => CoreError::from(err),
        })?;

        if initial_stock > 0 {
            sqlx::query(
                r#"
                INSERT INTO inventory_transactions (inventory_id, change, reason, related_sale_id, related_order_id, related_batch_id, performed_by_user_id, notes, created_at)
                VALUES ($1, $2, $3, NULL, NULL, NULL, $4, NULL, now())
                "#,
            )
            .bind(row.id)
            .bind(initial_stock)
            .bind(InventoryTransactionReason::Restock)
            .bind(row.id) // system actor placeholder; overwritten by caller via adjust when a real user performs it
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(row)
    }

    async fn get_inventory_by_product(&self, product_id: i64) -> crate::error::Result<Option<Inventory>> {
        let row = sqlx::query_as::<_, Inventory>(
            "SELECT id, product_id, product_name, total_stock, total_sold, low_stock_threshold, version FROM inventory WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_inventory(&self, id: i64) -> crate::error::Result<Option<Inventory>> {
        let row = sqlx::query_as::<_, Inventory>(
            "SELECT id, product_id, product_name, total_stock, total_sold, low_stock_threshold, version FROM inventory WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn mutate_inventory_guarded(
        &self,
        id: i64,
        expected_version: i64,
        stock_delta: i64,
        sold_delta: i64,
    ) -> crate::error::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE inventory
            SET total_stock = total_stock + $3,
                total_sold = total_sold + $4,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(stock_delta)
        .bind(sold_delta)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_inventory_threshold_guarded(
        &self,
        id: i64,
        expected_version: i64,
        threshold: i64,
    ) -> crate::error::Result<u64> {
        let result = sqlx::query(
            "UPDATE inventory SET low_stock_threshold = $3, version = version + 1 WHERE id = $1 AND version = $2",
        )
        .bind(id)
        .bind(expected_version)
        .bind(threshold)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_low_stock(&self, limit: i64) -> crate::error::Result<Vec<Inventory>> {
        let rows = sqlx::query_as::<_, Inventory>(
            "SELECT id, product_id, product_name, total_stock, total_sold, low_stock_threshold, version FROM inventory WHERE total_stock <= low_stock_threshold ORDER BY total_stock ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_inventory_transaction(
        &self,
        inventory_id: i64,
        change: i64,
        reason: InventoryTransactionReason,
        related_sale_id: Option<i64>,
        related_order_id: Option<i64>,
        performed_by_user_id: i64,
        notes: Option<String>,
    ) -> crate::error::Result<InventoryTransaction> {
        let row = sqlx::query_as::<_, InventoryTransaction>(
            r#"
            INSERT INTO inventory_transactions (inventory_id, change, reason, related_sale_id, related_order_id, related_batch_id, performed_by_user_id, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, NULL, $6, $7, now())
            RETURNING id, inventory_id, change, reason, related_sale_id, related_order_id, related_batch_id, performed_by_user_id, notes, created_at
            "#,
        )
        .bind(inventory_id)
        .bind(change)
        .bind(reason)
        .bind(related_sale_id)
        .bind(related_order_id)
        .bind(performed_by_user_id)
        .bind(notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_sale_by_idempotency_key(&self, key: &str) -> crate::error::Result<Option<Sale>> {
        let row = sqlx::query_as::<_, Sale>(
            "SELECT id, product_id, quantity, unit_price, total_amount, sold_by_user_id, sale_channel, related_order_id, idempotency_key, created_at FROM sales WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_sale(&self, new: NewSale) -> crate::error::Result<Sale> {
        let total_amount = new.unit_price * rust_decimal::Decimal::from(new.quantity);
        let row = sqlx::query_as::<_, Sale>(
            r#"
            INSERT INTO sales (product_id, quantity, unit_price, total_amount, sold_by_user_id, sale_channel, related_order_id, idempotency_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
            RETURNING id, product_id, quantity, unit_price, total_amount, sold_by_user_id, sale_channel, related_order_id, idempotency_key, created_at
            "#,
        )
        .bind(new.product_id)
        .bind(new.quantity)
        .bind(new.unit_price)
        .bind(total_amount)
        .bind(new.sold_by_user_id)
        .bind(new.sale_channel)
        .bind(new.related_order_id)
        .bind(new.idempotency_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                CoreError::conflict("a sale with this idempotency key already exists")
            }
            _ => CoreError::from(err),
        })?;
        Ok(row)
    }

    async fn delete_sale(&self, id: i64) -> crate::error::Result<()> {
        sqlx::query("DELETE FROM sales WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_sale(&self, id: i64) -> crate::error::Result<Option<Sale>> {
        let row = sqlx::query_as::<_, Sale>(
            "SELECT id, product_id, quantity, unit_price, total_amount, sold_by_user_id, sale_channel, related_order_id, idempotency_key, created_at FROM sales WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn sales_summary(&self, range: Option<DateRange>) -> crate::error::Result<SalesSummary> {
        let row: (i64, Option<i64>, Option<rust_decimal::Decimal>) = sqlx::query_as(
            r#"
            SELECT COUNT(*), SUM(quantity), SUM(total_amount)
            FROM sales
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            "#,
        )
        .bind(range.map(|r| r.from))
        .bind(range.map(|r| r.to))
        .fetch_one(&self.pool)
        .await?;
        Ok(SalesSummary {
            count: row.0,
            total_quantity: row.1.unwrap_or(0),
            total_amount: row.2.unwrap_or_default(),
        })
    }

    async fn agent_performance(&self, range: Option<DateRange>) -> crate::error::Result<Vec<AgentPerformance>> {
        let rows: Vec<(i64, i64, i64, rust_decimal::Decimal)> = sqlx::query_as(
            r#"
            SELECT sold_by_user_id, COUNT(*), SUM(quantity), SUM(total_amount)
            FROM sales
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            GROUP BY sold_by_user_id
            ORDER BY SUM(total_amount) DESC
            "#,
        )
        .bind(range.map(|r| r.from))
        .bind(range.map(|r| r.to))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(user_id, count, total_quantity, total_amount)| AgentPerformance {
                user_id,
                count,
                total_quantity,
                total_amount,
            })
            .collect())
    }

    async fn get_user_operational_roles(&self, user_id: i64) -> crate::error::Result<Vec<Role>> {
        let roles: Vec<(Role,)> = sqlx::query_as(
            "SELECT role FROM user_operational_roles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles.into_iter().map(|(r,)| r).collect())
    }

    async fn insert_notification(
        &self,
        recipient_user_id: i64,
        event: &str,
        entity_type: &str,
        entity_id: i64,
        data: Value,
    ) -> crate::error::Result<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (recipient_user_id, event, entity_type, entity_id, data, created_at)
            VALUES ($1, $2, $3, $4, $5, now())
            RETURNING id, recipient_user_id, event, entity_type, entity_id, data, created_at
            "#,
        )
        .bind(recipient_user_id)
        .bind(event)
        .bind(entity_type)
        .bind(entity_id)
        .bind(data)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_order_participants(&self, order_id: i64) -> crate::error::Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT created_by_user_id FROM orders WHERE id = $1
            UNION
            SELECT a.user_id
            FROM task_assignments a
            JOIN automation_tasks t ON t.id = a.automation_task_id
            WHERE t.related_order_id = $1 AND a.user_id IS NOT NULL
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_users_with_role(&self, role: Role) -> crate::error::Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT user_id FROM user_operational_roles WHERE role = $1",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_admins(&self) -> crate::error::Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT user_id FROM system_admins")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn insert_audit_log(
        &self,
        actor_user_id: Option<i64>,
        action: &str,
        resource_type: &str,
        resource_id: i64,
        success: bool,
        reason: Option<String>,
        meta: Value,
    ) -> crate::error::Result<AuditLog> {
        let row = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (actor_user_id, action, resource_type, resource_id, success, reason, meta, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            RETURNING id, actor_user_id, action, resource_type, resource_id, success, reason, meta, created_at
            "#,
        )
        .bind(actor_user_id)
        .bind(action)
        .bind(resource_type)
        .bind(resource_id)
        .bind(success)
        .bind(reason)
        .bind(meta)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
