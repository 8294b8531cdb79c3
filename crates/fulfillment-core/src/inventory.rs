// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! C4 — Inventory Service.
//!
//! Per-product stock with atomic decrement, restock, and adjustment. Every
//! mutation writes a matching [`crate::persistence::InventoryTransaction`]
//! row in the same atomic unit, and every mutation's post-commit step runs
//! the low-stock hook, which may open or close a `warehouse`-role restock
//! automation task.

use std::sync::Arc;

use serde_json::json;

use crate::error::{CoreError, Result};
use crate::events::{DomainEvent, EventBus};
use crate::persistence::{Inventory, NewAutomationTask, Persistence};
use crate::types::{
    AutomationTaskStatus, EventName, InventoryTransactionReason, Role,
};

/// The actor recorded on transactions and task events produced by hooks
/// rather than a direct user action.
pub const SYSTEM_ACTOR: i64 = 0;

/// Inventory Service.
pub struct InventoryService {
    persistence: Arc<dyn Persistence>,
    events: Arc<EventBus>,
}

impl InventoryService {
    /// Construct an inventory service over a persistence backend and event
    /// bus.
    pub fn new(persistence: Arc<dyn Persistence>, events: Arc<EventBus>) -> Self {
        Self { persistence, events }
    }

    /// Create a new inventory item. Fails with `Conflict` if `product_id`
    /// already has a row (enforced by the underlying unique constraint).
    #[tracing::instrument(skip(self))]
    pub async fn create_item(
        &self,
        product_id: i64,
        name: String,
        initial_stock: i64,
        low_stock_threshold: i64,
    ) -> Result<Inventory> {
        self.persistence
            .create_inventory_item(product_id, name, initial_stock, low_stock_threshold)
            .await
    }

    /// Restock a product by `quantity` (must be positive). Atomic:
    /// increments `total_stock`, writes a `restock` transaction, bumps
    /// `version`. Runs the low-stock-resolved hook on success.
    #[tracing::instrument(skip(self))]
    pub async fn restock(
        &self,
        product_id: i64,
        quantity: i64,
        performed_by: i64,
        notes: Option<String>,
    ) -> Result<Inventory> {
        if quantity <= 0 {
            return Err(CoreError::validation("quantity", "must be positive"));
        }
        let item = self.get_or_not_found(product_id).await?;
        let affected = self
            .persistence
            .mutate_inventory_guarded(item.id, item.version, quantity, 0)
            .await?;
        if affected == 0 {
            return Err(CoreError::conflict("inventory was modified concurrently"));
        }
        self.persistence
            .insert_inventory_transaction(
                item.id,
                quantity,
                InventoryTransactionReason::Restock,
                None,
                None,
                performed_by,
                notes,
            )
            .await?;
        let updated = self.get_by_id_or_internal(item.id).await?;
        self.run_low_stock_hook(&updated).await;
        Ok(updated)
    }

    /// Adjust stock by a signed `delta` for one of the non-sale reasons.
    /// Fails with `InvalidState` if the resulting stock would be negative.
    #[tracing::instrument(skip(self))]
    pub async fn adjust(
        &self,
        product_id: i64,
        delta: i64,
        reason: InventoryTransactionReason,
        performed_by: i64,
        notes: Option<String>,
    ) -> Result<Inventory> {
        if !matches!(
            reason,
            InventoryTransactionReason::Adjustment
                | InventoryTransactionReason::Return
                | InventoryTransactionReason::Damage
                | InventoryTransactionReason::Correction
        ) {
            return Err(CoreError::validation(
                "reason",
                "must be one of adjustment, return, damage, correction",
            ));
        }
        let item = self.get_or_not_found(product_id).await?;
        if item.total_stock + delta < 0 {
            return Err(CoreError::invalid_state(format!(
                "adjustment would drive stock negative: {} + {delta} < 0",
                item.total_stock
            )));
        }
        let affected = self
            .persistence
            .mutate_inventory_guarded(item.id, item.version, delta, 0)
            .await?;
        if affected == 0 {
            return Err(CoreError::conflict("inventory was modified concurrently"));
        }
        self.persistence
            .insert_inventory_transaction(item.id, delta, reason, None, None, performed_by, notes)
            .await?;
        let updated = self.get_by_id_or_internal(item.id).await?;
        self.run_low_stock_hook(&updated).await;
        Ok(updated)
    }

    /// INTERNAL. Used only by [`crate::sales::SalesService::record_sale`]
    /// within its own transaction boundary. Version-guarded decrement;
    /// raises `InsufficientStock` if the re-read stock can't cover
    /// `quantity`.
    pub(crate) async fn decrement_for_sale(
        &self,
        product_id: i64,
        quantity: i64,
        performed_by: i64,
        sale_id: i64,
        related_order_id: Option<i64>,
    ) -> Result<Inventory> {
        if quantity <= 0 {
            return Err(CoreError::validation("quantity", "must be positive"));
        }
        let item = self.get_or_not_found(product_id).await?;
        if item.total_stock < quantity {
            return Err(CoreError::InsufficientStock {
                product_id,
                requested: quantity,
                available: item.total_stock,
            });
        }
        let affected = self
            .persistence
            .mutate_inventory_guarded(item.id, item.version, -quantity, quantity)
            .await?;
        if affected == 0 {
            return Err(CoreError::conflict("inventory was modified concurrently"));
        }
        self.persistence
            .insert_inventory_transaction(
                item.id,
                -quantity,
                InventoryTransactionReason::Sale,
                Some(sale_id),
                related_order_id,
                performed_by,
                None,
            )
            .await?;
        let updated = self.get_by_id_or_internal(item.id).await?;
        self.run_low_stock_hook(&updated).await;
        Ok(updated)
    }

    /// List items at or below their low-stock threshold.
    pub async fn list_low_stock(&self, limit: i64) -> Result<Vec<Inventory>> {
        self.persistence.list_low_stock(limit).await
    }

    /// Set a product's low-stock threshold. May trigger the low-stock hook
    /// if the new threshold now exceeds current stock.
    #[tracing::instrument(skip(self))]
    pub async fn set_threshold(&self, product_id: i64, threshold: i64) -> Result<Inventory> {
        if threshold < 0 {
            return Err(CoreError::validation("threshold", "must be non-negative"));
        }
        let item = self.get_or_not_found(product_id).await?;
        let affected = self
            .persistence
            .set_inventory_threshold_guarded(item.id, item.version, threshold)
            .await?;
        if affected == 0 {
            return Err(CoreError::conflict("inventory was modified concurrently"));
        }
        let updated = self.get_by_id_or_internal(item.id).await?;
        self.run_low_stock_hook(&updated).await;
        Ok(updated)
    }

    /// The low-stock hook, run post-commit of every stock mutation (§4.4).
    ///
    /// If stock is now at or below threshold and no open restock task
    /// already references this inventory id, open one. If stock has
    /// recovered above threshold, close any such open tasks.
    async fn run_low_stock_hook(&self, item: &Inventory) {
        if let Err(err) = self.run_low_stock_hook_inner(item).await {
            tracing::warn!(product_id = item.product_id, error = %err, "low-stock hook failed");
        }
    }

    async fn run_low_stock_hook_inner(&self, item: &Inventory) -> Result<()> {
        let existing = self.persistence.find_open_restock_task_for_inventory(item.id).await?;

        if item.total_stock <= item.low_stock_threshold {
            if existing.is_none() {
                let task = self
                    .persistence
                    .create_automation_task(NewAutomationTask {
                        task_type: "restock".to_string(),
                        status: AutomationTaskStatus::Open,
                        title: format!("Restock {}", item.product_name),
                        created_by_user_id: SYSTEM_ACTOR,
                        related_order_id: None,
                        required_role: Some(Role::Warehouse),
                        is_order_root: false,
                        metadata: json!({
                            "trigger": "low_stock",
                            "inventory_id": item.id,
                            "threshold": item.low_stock_threshold,
                        }),
                    })
                    .await?;
                tracing::info!(product_id = item.product_id, task_id = task.id, "opened low-stock restock task");
                self.events
                    .publish(DomainEvent {
                        name: EventName::InventoryLowStock,
                        actor: None,
                        entity_type: "inventory",
                        entity_id: item.id,
                        data: json!({
                            "productId": item.product_id,
                            "totalStock": item.total_stock,
                            "lowStockThreshold": item.low_stock_threshold,
                            "restockTaskId": task.id,
                        }),
                    })
                    .await;
            }
        } else if let Some(task) = existing {
            self.persistence
                .set_automation_task_status(task.id, AutomationTaskStatus::Completed)
                .await?;
            tracing::info!(product_id = item.product_id, task_id = task.id, "closed resolved low-stock restock task");
        }
        Ok(())
    }

    async fn get_or_not_found(&self, product_id: i64) -> Result<Inventory> {
        self.persistence
            .get_inventory_by_product(product_id)
            .await?
            .ok_or_else(|| CoreError::not_found("inventory", product_id))
    }

    async fn get_by_id_or_internal(&self, id: i64) -> Result<Inventory> {
        self.persistence
            .get_inventory(id)
            .await?
            .ok_or_else(|| CoreError::Internal {
                context: format!("inventory {id} vanished after a successful mutation"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_actor_is_a_reserved_sentinel_id() {
        assert_eq!(SYSTEM_ACTOR, 0);
    }
}
