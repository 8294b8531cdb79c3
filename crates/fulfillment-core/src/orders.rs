// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! C6 — Order & Workflow-Step Engine.
//!
//! Creates orders, instantiates per-step tasks from the Workflow Registry
//! (C1), activates the first step, completes steps atomically, advances to
//! the next step, and recomputes order status. The only two-way coupling
//! with the Automation Task Engine (C7) is the [`AutomationHook`] trait:
//! this module defines it, C7 implements it, so C6 never imports C7
//! directly (§9's dependency-inversion design note).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CoreError, Result};
use crate::events::{DomainEvent, EventBus};
use crate::persistence::{NewOrder, Order, Persistence, WorkflowStepTask};
use crate::registry;
use crate::types::{CallerContext, EventName, OrderStatus, OrderType, WorkflowStepStatus};

/// Hook invoked by [`OrderEngine::complete_step`] after it commits a step
/// completion, so the Automation Task Engine can run its chaining and
/// cascade rules (§4.7.3) regardless of whether the step was completed via
/// the direct workflow-step endpoint or via `completeAssignment`. A hook
/// failure is logged and never rolls back or fails the step completion that
/// already committed.
#[async_trait]
pub trait AutomationHook: Send + Sync {
    /// Called after a workflow step transitions to `done`.
    async fn on_workflow_step_completed(
        &self,
        order: &Order,
        completed_step: &WorkflowStepTask,
        actor: Option<&CallerContext>,
    ) -> Result<()>;
}

/// The default hook, wired when no automation engine is configured (e.g. in
/// unit tests of C6 in isolation).
pub struct NoopAutomationHook;

#[async_trait]
impl AutomationHook for NoopAutomationHook {
    async fn on_workflow_step_completed(
        &self,
        _order: &Order,
        _completed_step: &WorkflowStepTask,
        _actor: Option<&CallerContext>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Arguments to [`OrderEngine::create_order`].
#[derive(Debug, Clone)]
pub struct CreateOrderInput {
    /// Order type; must be a known registry key.
    pub order_type: OrderType,
    /// The creating user.
    pub creator_id: i64,
    /// Line items and other free-form order detail, normalised into
    /// `metadata` (preserving the original under `formPayload` when a
    /// form-payload shape is detected).
    pub metadata: Value,
    /// An optional chat channel association.
    pub related_channel_id: Option<i64>,
}

/// Order & Workflow-Step Engine.
pub struct OrderEngine {
    persistence: Arc<dyn Persistence>,
    events: Arc<EventBus>,
    automation_hook: Arc<dyn AutomationHook>,
}

impl OrderEngine {
    /// Construct an order engine.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        events: Arc<EventBus>,
        automation_hook: Arc<dyn AutomationHook>,
    ) -> Self {
        Self {
            persistence,
            events,
            automation_hook,
        }
    }

    /// Create an order: persist it, instantiate its step graph in registry
    /// order with the first step active, and publish `order.created`. The
    /// Automation Task Engine's reaction (creating the root + per-role
    /// tasks) happens out-of-band via the event bus — its failure is
    /// logged by the subscriber and never rolls back order creation.
    #[tracing::instrument(skip(self, input, actor))]
    pub async fn create_order(
        &self,
        input: CreateOrderInput,
        actor: Option<&CallerContext>,
    ) -> Result<Order> {
        let metadata = normalise_metadata(input.metadata);

        let order = self
            .persistence
            .create_order(NewOrder {
                order_type: input.order_type,
                created_by_user_id: input.creator_id,
                related_channel_id: input.related_channel_id,
                metadata,
            })
            .await?;

        let steps = registry::steps_for(order.order_type);
        self.persistence.create_workflow_step_tasks(order.id, steps).await?;

        self.events
            .publish(DomainEvent {
                name: EventName::OrderCreated,
                actor: actor.cloned(),
                entity_type: "order",
                entity_id: order.id,
                data: json!({ "orderType": order.order_type }),
            })
            .await;

        Ok(order)
    }

    /// Complete a workflow step on behalf of `user_id`. The single atomic
    /// conditional UPDATE described by §4.6 is the entire correctness
    /// argument; every other outcome is derived by re-reading the row after
    /// a zero-rows-affected result.
    #[tracing::instrument(skip(self, actor))]
    pub async fn complete_step(
        &self,
        task_id: i64,
        user_id: i64,
        actor: Option<&CallerContext>,
    ) -> Result<WorkflowStepTask> {
        let affected = self
            .persistence
            .complete_workflow_step_guarded(task_id, user_id)
            .await?;

        if affected == 0 {
            return Err(self.diagnose_step_completion_failure(task_id, user_id).await);
        }

        let completed_step = self
            .persistence
            .get_workflow_step_task(task_id)
            .await?
            .ok_or_else(|| CoreError::Internal {
                context: format!("workflow step {task_id} vanished after a successful completion"),
            })?;

        let order = self
            .persistence
            .get_order(completed_step.order_id)
            .await?
            .ok_or_else(|| CoreError::Internal {
                context: format!("order {} vanished for completed step {task_id}", completed_step.order_id),
            })?;

        self.events
            .publish(DomainEvent {
                name: EventName::TaskCompleted,
                actor: actor.cloned(),
                entity_type: "workflowStepTask",
                entity_id: completed_step.id,
                data: json!({ "stepKey": completed_step.step_key, "orderId": order.id }),
            })
            .await;

        self.activate_next_step(&order).await?;
        self.recompute_order_status(&order, actor).await?;

        if let Err(err) = self
            .automation_hook
            .on_workflow_step_completed(&order, &completed_step, actor)
            .await
        {
            tracing::warn!(
                order_id = order.id,
                step_key = %completed_step.step_key,
                error = %err,
                "automation hook failed after workflow step completion; step completion stands"
            );
        }

        Ok(completed_step)
    }

    async fn diagnose_step_completion_failure(&self, task_id: i64, user_id: i64) -> CoreError {
        match self.persistence.get_workflow_step_task(task_id).await {
            Ok(None) => CoreError::not_found("workflowStepTask", task_id),
            Ok(Some(task)) => match task.assigned_user_id {
                Some(assignee) if assignee != user_id => CoreError::permission_denied(format!(
                    "workflow step {task_id} is assigned to a different user"
                )),
                _ if !matches!(task.status, WorkflowStepStatus::Active) => {
                    CoreError::invalid_state(format!(
                        "workflow step {task_id} is not active (status = {:?})",
                        task.status
                    ))
                }
                _ => CoreError::conflict(format!(
                    "workflow step {task_id} was modified concurrently"
                )),
            },
            Err(err) => err,
        }
    }

    /// Find the lowest-id pending step in the order and activate it.
    /// Falls back to any pending required step if the sequential next isn't
    /// pending (covers a role having no further steps while a later role
    /// still does).
    async fn activate_next_step(&self, order: &Order) -> Result<Option<WorkflowStepTask>> {
        let steps = self.persistence.list_workflow_step_tasks(order.id).await?;

        let sequential_next = steps
            .iter()
            .filter(|s| matches!(s.status, WorkflowStepStatus::Pending))
            .min_by_key(|s| s.id);

        let candidate = sequential_next.or_else(|| {
            steps
                .iter()
                .filter(|s| matches!(s.status, WorkflowStepStatus::Pending) && s.required)
                .min_by_key(|s| s.id)
        });

        let Some(candidate) = candidate else {
            return Ok(None);
        };

        let affected = self
            .persistence
            .activate_workflow_step_guarded(candidate.id)
            .await?;
        if affected == 0 {
            // Lost a race to activate; not an error for the caller, the
            // step is active via some other path already.
            return Ok(None);
        }

        self.events
            .publish(DomainEvent {
                name: EventName::TaskOpened,
                actor: None,
                entity_type: "workflowStepTask",
                entity_id: candidate.id,
                data: json!({ "stepKey": candidate.step_key, "orderId": order.id }),
            })
            .await;

        self.persistence.get_workflow_step_task(candidate.id).await
    }

    /// §4.6.2 order status recomputation, evaluated in priority order, with
    /// the defensive suppression guard against a miscomputed `completed`.
    async fn recompute_order_status(
        &self,
        order: &Order,
        actor: Option<&CallerContext>,
    ) -> Result<()> {
        let steps = self.persistence.list_workflow_step_tasks(order.id).await?;

        let deliver_items_done = steps
            .iter()
            .find(|s| s.step_key == "deliverItems")
            .is_some_and(|s| matches!(s.status, WorkflowStepStatus::Done));
        let confirm_receive_pending = steps
            .iter()
            .find(|s| s.step_key == "confirmReceived")
            .is_some_and(|s| !matches!(s.status, WorkflowStepStatus::Done));
        let any_active = steps.iter().any(|s| matches!(s.status, WorkflowStepStatus::Active));
        let all_required_done = steps
            .iter()
            .filter(|s| s.required)
            .all(|s| matches!(s.status, WorkflowStepStatus::Done));

        let mut new_status = if deliver_items_done && confirm_receive_pending {
            OrderStatus::AwaitingConfirmation
        } else if any_active {
            OrderStatus::InProgress
        } else if all_required_done {
            OrderStatus::Completed
        } else {
            order.status
        };

        // Suppression guard: never let a miscomputation report `completed`
        // while a required step is outstanding.
        if matches!(new_status, OrderStatus::Completed) && !all_required_done {
            new_status = order.status;
        }

        if new_status != order.status {
            self.persistence.set_order_status(order.id, new_status).await?;

            self.events
                .publish(DomainEvent {
                    name: EventName::OrderStatusChanged,
                    actor: actor.cloned(),
                    entity_type: "order",
                    entity_id: order.id,
                    data: json!({ "status": new_status }),
                })
                .await;

            if matches!(new_status, OrderStatus::Completed) {
                self.events
                    .publish(DomainEvent {
                        name: EventName::OrderCompleted,
                        actor: actor.cloned(),
                        entity_type: "order",
                        entity_id: order.id,
                        data: json!({}),
                    })
                    .await;
            }
        }

        Ok(())
    }
}

/// Normalise free-form order metadata (§4.6 step 2): if the payload looks
/// like a form submission (carries an `items` array plus delivery/customer
/// fields at the top level), lift those into dedicated keys while
/// preserving the original payload under `formPayload`.
fn normalise_metadata(raw: Value) -> Value {
    let Value::Object(ref map) = raw else {
        return raw;
    };

    let looks_like_form_payload = map.contains_key("items")
        || map.contains_key("deliveryLocation")
        || map.contains_key("customerName");

    if !looks_like_form_payload {
        return raw;
    }

    let mut normalised = serde_json::Map::new();
    if let Some(items) = map.get("items") {
        normalised.insert("items".to_string(), items.clone());
    }
    if let Some(location) = map.get("deliveryLocation") {
        normalised.insert("deliveryLocation".to_string(), location.clone());
    }
    if let Some(name) = map.get("customerName") {
        normalised.insert("customerName".to_string(), name.clone());
    }
    if let Some(phone) = map.get("customerPhone") {
        normalised.insert("customerPhone".to_string(), phone.clone());
    }
    if let Some(quantities) = map.get("quantities") {
        normalised.insert("quantities".to_string(), quantities.clone());
    }
    normalised.insert("formPayload".to_string(), raw.clone());

    Value::Object(normalised)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_shaped_metadata_is_normalised_and_preserved() {
        let raw = json!({
            "items": [{"productId": 1, "quantity": 2}],
            "customerName": "Jane",
            "extra": "kept only under formPayload",
        });
        let normalised = normalise_metadata(raw.clone());
        assert_eq!(normalised["customerName"], json!("Jane"));
        assert_eq!(normalised["formPayload"], raw);
        assert!(normalised.get("extra").is_none());
    }

    #[test]
    fn non_form_metadata_passes_through_unchanged() {
        let raw = json!({ "note": "plain metadata" });
        assert_eq!(normalise_metadata(raw.clone()), raw);
    }
}
