// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! C9 — Notification Dispatcher.
//!
//! Subscribes to the event bus, computes a per-event recipient set (§4.9),
//! and persists one Notification row per recipient. Delivery beyond
//! persistence — realtime push to a chat/messaging surface — is an
//! external collaborator's concern (§6); this module only writes the rows
//! that collaborator reads.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::events::{DomainEvent, EventSubscriber};
use crate::persistence::Persistence;
use crate::types::{EventName, Role};

/// Notification Dispatcher.
pub struct NotificationDispatcher {
    persistence: Arc<dyn Persistence>,
}

impl NotificationDispatcher {
    /// Construct a dispatcher.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    async fn recipients_for(&self, event: &DomainEvent) -> anyhow::Result<HashSet<i64>> {
        let mut recipients = HashSet::new();

        match event.name {
            EventName::TaskClaimed => {
                if let Some(role) = event
                    .data
                    .get("requiredRole")
                    .and_then(|v| serde_json::from_value::<Role>(v.clone()).ok())
                {
                    recipients.extend(self.persistence.list_users_with_role(role).await?);
                }
                if let Some(previous) = event.data.get("previousClaimerId").and_then(|v| v.as_i64()) {
                    recipients.insert(previous);
                }
                recipients.extend(self.persistence.list_admins().await?);
            }
            EventName::TaskReassigned => {
                if let Some(from) = event.data.get("fromUserId").and_then(|v| v.as_i64()) {
                    recipients.insert(from);
                }
                if let Some(to) = event.data.get("toUserId").and_then(|v| v.as_i64()) {
                    recipients.insert(to);
                }
                recipients.extend(self.persistence.list_admins().await?);
            }
            EventName::TaskCompleted => {
                if let Some(order_id) = order_id_for(event) {
                    recipients.extend(self.persistence.list_order_participants(order_id).await?);
                }
            }
            EventName::OrderCompleted => {
                if let Some(order_id) = order_id_for(event) {
                    recipients.extend(self.persistence.list_order_participants(order_id).await?);
                }
            }
            EventName::InventoryLowStock => {
                recipients.extend(self.persistence.list_admins().await?);
                recipients.extend(self.persistence.list_users_with_role(Role::Warehouse).await?);
                recipients.extend(self.persistence.list_users_with_role(Role::Foreman).await?);
            }
            EventName::SaleCompleted => {
                recipients.extend(self.persistence.list_admins().await?);
            }
            _ => {}
        }

        // Don't notify actors about their own action.
        if let Some(actor) = &event.actor {
            recipients.remove(&actor.user_id);
        }

        Ok(recipients)
    }
}

/// Resolve the order an event concerns: the entity itself when it is an
/// order, or the `orderId`/`relatedOrderId` carried in its payload.
fn order_id_for(event: &DomainEvent) -> Option<i64> {
    if event.entity_type == "order" {
        return Some(event.entity_id);
    }
    event
        .data
        .get("orderId")
        .or_else(|| event.data.get("relatedOrderId"))
        .and_then(|v| v.as_i64())
}

#[async_trait]
impl EventSubscriber for NotificationDispatcher {
    fn name(&self) -> &'static str {
        "notificationDispatcher"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let recipients = self.recipients_for(event).await?;
        for recipient in recipients {
            self.persistence
                .insert_notification(
                    recipient,
                    event.name.wire_name(),
                    event.entity_type,
                    event.entity_id,
                    event.data.clone(),
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_id_for_prefers_the_entity_itself_when_it_is_an_order() {
        let event = DomainEvent {
            name: EventName::OrderCompleted,
            actor: None,
            entity_type: "order",
            entity_id: 42,
            data: json!({}),
        };
        assert_eq!(order_id_for(&event), Some(42));
    }

    #[test]
    fn order_id_for_falls_back_to_the_payload_for_non_order_entities() {
        let event = DomainEvent {
            name: EventName::TaskCompleted,
            actor: None,
            entity_type: "workflowStepTask",
            entity_id: 7,
            data: json!({ "orderId": 99 }),
        };
        assert_eq!(order_id_for(&event), Some(99));
    }
}
