// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! C8 — Trigger Layer.
//!
//! Subscribes to the event bus and translates `order.created` into
//! automation-task instantiation via C7, using a per-order-type template.
//! No business logic lives here beyond routing: every decision about task
//! shape belongs to C7, every decision about recipients belongs to C9.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::automation::AutomationEngine;
use crate::error::Result;
use crate::events::{DomainEvent, EventBus, EventSubscriber};
use crate::types::{EventName, OrderType, Role};

/// The per-role placeholder assignments to create on the order-root task,
/// keyed by order type. A role only belongs here if some workflow step in
/// that order type's sequence is owned by it — the root only completes once
/// every one of these has been closed out. Restock-family orders end on the
/// requester's `confirmReceived`, so they carry a requester placeholder too;
/// wholesale has no such step, and retail never hands off to a requester.
fn assignment_roles_for(order_type: OrderType) -> &'static [Role] {
    match order_type {
        OrderType::AgentRestock | OrderType::StoreKeeperRestock => {
            &[Role::Foreman, Role::Delivery, Role::Requester]
        }
        OrderType::CustomerWholesale => &[Role::Foreman, Role::Delivery],
        OrderType::AgentRetail => &[Role::Delivery],
    }
}

fn root_task_type_for(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::AgentRestock | OrderType::StoreKeeperRestock => "restock",
        OrderType::AgentRetail => "retail",
        OrderType::CustomerWholesale => "wholesale",
    }
}

/// The role that owns the first active workflow step for this order type
/// (registry's `steps_for(order_type)[0].assigned_to`) — this role gets its
/// own claimable, non-root automation task created eagerly alongside the
/// root. The order-root itself carries no `requiredRole`: it is never
/// claimed directly, only completed by C7's cascade once every role's work
/// is done (spec §3's "non-root automation tasks carry a requiredRole").
fn first_role_for(order_type: OrderType) -> Role {
    match order_type {
        OrderType::AgentRestock | OrderType::StoreKeeperRestock | OrderType::CustomerWholesale => Role::Foreman,
        OrderType::AgentRetail => Role::Delivery,
    }
}

/// Task-type label for the eagerly-created first-role task. The
/// foreman→delivery chain (C7) uses `"delivery"` for the task it creates
/// later; this keeps the same per-role naming convention.
fn first_task_type_for(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::AgentRestock | OrderType::StoreKeeperRestock | OrderType::CustomerWholesale => "foreman",
        OrderType::AgentRetail => "delivery",
    }
}

/// Trigger Layer: an [`EventSubscriber`] that instantiates automation tasks
/// in reaction to order lifecycle events.
pub struct TriggerLayer {
    automation: Arc<AutomationEngine>,
    events: Arc<EventBus>,
}

impl TriggerLayer {
    /// Construct the trigger layer.
    pub fn new(automation: Arc<AutomationEngine>, events: Arc<EventBus>) -> Self {
        Self { automation, events }
    }

    async fn on_order_created(&self, event: &DomainEvent) -> Result<()> {
        let order_id = event.entity_id;
        let order_type: OrderType = serde_json::from_value(event.data["orderType"].clone())?;
        let creator_id = event
            .actor
            .as_ref()
            .map(|a| a.user_id)
            .unwrap_or(crate::inventory::SYSTEM_ACTOR);

        self.automation
            .create_task(
                root_task_type_for(order_type).to_string(),
                format!("Fulfil order #{order_id}"),
                creator_id,
                Some(order_id),
                None,
                true,
                assignment_roles_for(order_type),
                json!({}),
                event.actor.as_ref(),
            )
            .await?;

        let first_role = first_role_for(order_type);
        self.automation
            .create_task(
                first_task_type_for(order_type).to_string(),
                format!("{first_role:?}: fulfil order #{order_id}"),
                creator_id,
                Some(order_id),
                Some(first_role),
                false,
                &[first_role],
                json!({}),
                event.actor.as_ref(),
            )
            .await?;

        Ok(())
    }

    async fn on_order_status_changed(&self, _event: &DomainEvent) -> Result<()> {
        // Declarative hook point: status transitions that need a follow-up
        // task or notification are routed here. None are currently
        // required beyond what C6/C9 already emit on the event bus
        // directly, so this is a no-op reserved for future order types.
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for TriggerLayer {
    fn name(&self) -> &'static str {
        "triggerLayer"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let result = match event.name {
            EventName::OrderCreated => self.on_order_created(event).await,
            EventName::OrderStatusChanged => self.on_order_status_changed(event).await,
            _ => return Ok(()),
        };

        if let Err(err) = &result {
            tracing::warn!(
                order_id = event.entity_id,
                error = %err,
                "automation trigger failed; order creation stands"
            );
            self.events
                .publish(DomainEvent {
                    name: EventName::AutomationFailed,
                    actor: event.actor.clone(),
                    entity_type: "order",
                    entity_id: event.entity_id,
                    data: json!({ "reason": err.to_string() }),
                })
                .await;
            return Ok(());
        }

        self.events
            .publish(DomainEvent {
                name: EventName::AutomationTriggered,
                actor: event.actor.clone(),
                entity_type: "order",
                entity_id: event.entity_id,
                data: json!({}),
            })
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wholesale_orders_share_the_restock_role_shape() {
        assert_eq!(first_role_for(OrderType::CustomerWholesale), Role::Foreman);
        assert_eq!(
            assignment_roles_for(OrderType::CustomerWholesale),
            &[Role::Foreman, Role::Delivery]
        );
    }

    #[test]
    fn restock_orders_get_a_requester_placeholder_for_the_final_ack() {
        assert_eq!(
            assignment_roles_for(OrderType::AgentRestock),
            &[Role::Foreman, Role::Delivery, Role::Requester]
        );
    }
}
