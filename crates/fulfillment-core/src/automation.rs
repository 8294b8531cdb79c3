// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! C7 — Automation Task Engine, the hardest subsystem.
//!
//! Creates role-scoped automation tasks, serves the claimable queue per
//! role, coordinates claim/override, mediates cross-role acknowledgement,
//! and drives cascade completion from assignments to the order-root task to
//! the order. Implements [`crate::orders::AutomationHook`] so C6 can invoke
//! its chaining and cascade rules without C6 importing this module.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CoreError, Result};
use crate::events::{DomainEvent, EventBus};
use crate::orders::{AutomationHook, OrderEngine};
use crate::persistence::{
    AutomationTask, NewAutomationTask, NewTaskAssignment, NewTaskEvent, Order, Persistence,
    TaskAssignment, TaskEvent, TaskListFilter, WorkflowStepTask,
};
use crate::registry;
use crate::types::{
    AssignmentStatus, AutomationTaskStatus, CallerContext, EventName, OrderType, Role,
    TaskEventType,
};

/// A thread-safe slot that breaks the C6↔C7 construction cycle (§9's
/// "explicit interface abstraction ... wired at construction" design note,
/// applied to our own layering, not only to the webhook/notification
/// hooks). Built empty, handed to [`OrderEngine`], filled in once the
/// [`AutomationEngine`] it should delegate to exists.
pub struct AutomationHookSlot(OnceLock<Arc<dyn AutomationHook>>);

impl AutomationHookSlot {
    /// Construct an empty slot. Until [`Self::set`] is called, the hook is
    /// a no-op.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self(OnceLock::new()))
    }

    /// Fill the slot. Subsequent calls are ignored — a slot is wired
    /// exactly once, at startup.
    pub fn set(&self, hook: Arc<dyn AutomationHook>) {
        let _ = self.0.set(hook);
    }
}

#[async_trait]
impl AutomationHook for AutomationHookSlot {
    async fn on_workflow_step_completed(
        &self,
        order: &Order,
        completed_step: &WorkflowStepTask,
        actor: Option<&CallerContext>,
    ) -> Result<()> {
        match self.0.get() {
            Some(hook) => hook.on_workflow_step_completed(order, completed_step, actor).await,
            None => Ok(()),
        }
    }
}

/// Automation Task Engine.
pub struct AutomationEngine {
    persistence: Arc<dyn Persistence>,
    events: Arc<EventBus>,
    orders: Arc<OrderEngine>,
}

impl AutomationEngine {
    /// Construct the engine. `orders` is used for the workflow-advancement
    /// step of [`Self::complete_assignment`] (C7 → C6).
    pub fn new(persistence: Arc<dyn Persistence>, events: Arc<EventBus>, orders: Arc<OrderEngine>) -> Self {
        Self {
            persistence,
            events,
            orders,
        }
    }

    /// §4.7.1 — create a new automation task. `assignment_roles` is the
    /// set of roles the trigger layer's order-type template says this task
    /// should carry placeholder assignments for; non-order-linked tasks
    /// pass an empty slice.
    #[tracing::instrument(skip(self, actor))]
    pub async fn create_task(
        &self,
        task_type: String,
        title: String,
        creator_id: i64,
        related_order_id: Option<i64>,
        required_role: Option<Role>,
        is_order_root: bool,
        assignment_roles: &[Role],
        metadata: Value,
        actor: Option<&CallerContext>,
    ) -> Result<AutomationTask> {
        let status = if required_role.is_some() {
            AutomationTaskStatus::Open
        } else {
            AutomationTaskStatus::Pending
        };

        let task = self
            .persistence
            .create_automation_task(NewAutomationTask {
                task_type,
                status,
                title,
                created_by_user_id: creator_id,
                related_order_id,
                required_role,
                is_order_root,
                metadata,
            })
            .await?;

        self.persistence
            .insert_task_event(NewTaskEvent {
                automation_task_id: task.id,
                user_id: Some(creator_id),
                event_type: TaskEventType::Created,
                metadata: json!({}),
            })
            .await?;

        if related_order_id.is_some() {
            for role in assignment_roles {
                self.persistence
                    .create_task_assignment(NewTaskAssignment {
                        automation_task_id: task.id,
                        user_id: None,
                        role_hint: *role,
                        status: AssignmentStatus::Pending,
                        notes: None,
                    })
                    .await?;
            }
        }

        if matches!(status, AutomationTaskStatus::Open) {
            self.events
                .publish(DomainEvent {
                    name: EventName::TaskOpened,
                    actor: actor.cloned(),
                    entity_type: "automationTask",
                    entity_id: task.id,
                    data: json!({}),
                })
                .await;
        }

        self.events
            .publish(DomainEvent {
                name: EventName::TaskCreated,
                actor: actor.cloned(),
                entity_type: "automationTask",
                entity_id: task.id,
                data: json!({ "taskType": task.task_type, "relatedOrderId": task.related_order_id }),
            })
            .await;

        Ok(task)
    }

    /// §4.7.2 — claim a task, atomically and race-free.
    #[tracing::instrument(skip(self, actor))]
    pub async fn claim(
        &self,
        task_id: i64,
        actor: &CallerContext,
        override_: bool,
    ) -> Result<AutomationTask> {
        let task = self
            .persistence
            .get_automation_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("automationTask", task_id))?;

        if task.is_order_root {
            return Err(CoreError::invalid_state(
                "the order-root task completes by cascade and cannot be claimed directly",
            ));
        }

        let roles = self.persistence.get_user_operational_roles(actor.user_id).await?;

        if let Some(required) = task.required_role {
            if !roles.contains(&required) && !actor.is_system_admin {
                self.persistence
                    .insert_audit_log(
                        Some(actor.user_id),
                        "missingRequiredRole",
                        "automationTask",
                        task_id,
                        false,
                        Some(format!("caller lacks required role {required:?}")),
                        json!({}),
                    )
                    .await?;
                return Err(CoreError::permission_denied(format!(
                    "caller does not hold required role {required:?}"
                )));
            }
        }

        let is_override_path = match task.status {
            AutomationTaskStatus::Claimed => {
                if actor.is_system_admin && override_ {
                    true
                } else {
                    return Err(CoreError::conflict("alreadyClaimed"));
                }
            }
            AutomationTaskStatus::Open | AutomationTaskStatus::Pending => false,
            _ => {
                if actor.is_system_admin && override_ {
                    true
                } else {
                    return Err(CoreError::invalid_state("notOpenForClaim"));
                }
            }
        };

        if is_override_path {
            let previous_claimer = task.claimed_by_user_id;
            self.persistence
                .override_claim_automation_task(task_id, actor.user_id)
                .await?;
            self.persistence
                .insert_task_event(NewTaskEvent {
                    automation_task_id: task_id,
                    user_id: Some(actor.user_id),
                    event_type: TaskEventType::Reassigned,
                    metadata: json!({ "fromUserId": previous_claimer, "toUserId": actor.user_id }),
                })
                .await?;
            self.persistence
                .insert_audit_log(
                    Some(actor.user_id),
                    "claimOverride",
                    "automationTask",
                    task_id,
                    true,
                    None,
                    json!({ "fromUserId": previous_claimer }),
                )
                .await?;
        } else {
            let affected = self
                .persistence
                .claim_automation_task_guarded(task_id, actor.user_id)
                .await?;
            if affected == 0 {
                return Err(CoreError::conflict("lost the race to claim this task"));
            }
        }

        self.persistence
            .insert_task_event(NewTaskEvent {
                automation_task_id: task_id,
                user_id: Some(actor.user_id),
                event_type: TaskEventType::Claimed,
                metadata: json!({}),
            })
            .await?;

        if let Some(required_role) = task.required_role {
            let existing = self
                .persistence
                .find_assignment_for_user(task_id, actor.user_id)
                .await?;
            if existing.is_none() {
                if let Some(placeholder) = self
                    .persistence
                    .find_placeholder_assignment(task_id, required_role)
                    .await?
                {
                    self.persistence
                        .update_task_assignment(
                            placeholder.id,
                            AssignmentStatus::InProgress,
                            Some(actor.user_id),
                            None,
                        )
                        .await?;
                } else {
                    self.persistence
                        .create_task_assignment(NewTaskAssignment {
                            automation_task_id: task_id,
                            user_id: Some(actor.user_id),
                            role_hint: required_role,
                            status: AssignmentStatus::InProgress,
                            notes: None,
                        })
                        .await?;
                }
            }
        }

        let reread = self
            .persistence
            .get_automation_task(task_id)
            .await?
            .ok_or_else(|| CoreError::Internal {
                context: format!("automation task {task_id} vanished after a successful claim"),
            })?;
        if reread.claimed_by_user_id != Some(actor.user_id) {
            return Err(CoreError::conflict(
                "claim did not stick; a concurrent override won the race",
            ));
        }

        self.events
            .publish(DomainEvent {
                name: EventName::TaskClaimed,
                actor: Some(actor.clone()),
                entity_type: "automationTask",
                entity_id: task_id,
                data: json!({
                    "overridden": is_override_path,
                    "requiredRole": task.required_role,
                    "previousClaimerId": task.claimed_by_user_id,
                    "relatedOrderId": task.related_order_id,
                }),
            })
            .await;

        Ok(reread)
    }

    /// §4.7.3 — complete an assignment. The crux of the engine: parameter
    /// resolution, workflow gating, cross-role acknowledgement, the
    /// caller's own transition, and delegation to C6 for workflow
    /// advancement (whose completion in turn re-enters this engine via
    /// [`AutomationHook::on_workflow_step_completed`] for chaining and
    /// cascade).
    #[tracing::instrument(skip(self, actor))]
    pub async fn complete_assignment(
        &self,
        task_id: i64,
        actor: &CallerContext,
        notes: Option<String>,
        assignment_id: Option<i64>,
    ) -> Result<TaskAssignment> {
        let task = self
            .persistence
            .get_automation_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("automationTask", task_id))?;

        let assignment = self
            .resolve_assignment(task_id, actor, assignment_id)
            .await?;

        if matches!(assignment.status, AssignmentStatus::Done) {
            return Ok(assignment);
        }

        if matches!(assignment.status, AssignmentStatus::Pending) && assignment.user_id.is_none() && !actor.is_system_admin {
            // An unbound placeholder cannot be completed by a non-admin who
            // hasn't claimed it; resolution below already filters these out
            // for non-admins via `find_assignment_for_user`, this guards
            // the explicit-assignment-id path.
            return Err(CoreError::permission_denied(
                "assignment has no bound user; claim the task first",
            ));
        }

        let target_step = if task.related_order_id.is_some() && !actor.is_system_admin {
            Some(self.locate_gated_workflow_step(&task, assignment.role_hint).await?)
        } else {
            None
        };

        // Cross-role acknowledgement, before committing the caller's own
        // transition.
        if let (Some(step), Some(order_id)) = (&target_step, task.related_order_id) {
            self.apply_cross_role_acknowledgement(order_id, step).await?;
        }

        let mark_done = if actor.is_system_admin {
            true
        } else {
            match &target_step {
                Some(step) if step.step_key == "confirmReceived" => true,
                Some(step) => {
                    let order_id = task
                        .related_order_id
                        .expect("locate_gated_workflow_step only returns Some for order-linked tasks");
                    !self
                        .required_steps_remain_for_role(order_id, assignment.role_hint, Some(&step.step_key))
                        .await?
                }
                None => false,
            }
        };

        if mark_done {
            self.persistence
                .update_task_assignment(assignment.id, AssignmentStatus::Done, None, notes.clone())
                .await?;
            if let Some(order_id) = task.related_order_id {
                self.close_role_assignments_for_order(order_id, assignment.role_hint).await?;
            }
        } else {
            self.persistence
                .update_task_assignment(assignment.id, AssignmentStatus::InProgress, None, notes.clone())
                .await?;
        }

        self.persistence
            .insert_task_event(NewTaskEvent {
                automation_task_id: task_id,
                user_id: Some(actor.user_id),
                event_type: TaskEventType::StepCompleted,
                metadata: json!({ "assignmentId": assignment.id }),
            })
            .await?;

        if let Some(step) = &target_step {
            if let Err(err) = self
                .orders
                .complete_step(step.id, actor.user_id, Some(actor))
                .await
            {
                tracing::warn!(
                    task_id,
                    assignment_id = assignment.id,
                    error = %err,
                    "workflow advancement failed; assignment transition stands"
                );
            }
        }

        self.persistence
            .get_task_assignment(assignment.id)
            .await?
            .ok_or_else(|| CoreError::Internal {
                context: format!("assignment {} vanished after completion", assignment.id),
            })
    }

    async fn resolve_assignment(
        &self,
        task_id: i64,
        actor: &CallerContext,
        assignment_id: Option<i64>,
    ) -> Result<TaskAssignment> {
        if let Some(id) = assignment_id {
            return self
                .persistence
                .get_task_assignment(id)
                .await?
                .ok_or_else(|| CoreError::not_found("taskAssignment", id));
        }
        if actor.is_system_admin {
            return self
                .persistence
                .find_first_non_done_assignment(task_id)
                .await?
                .ok_or_else(|| CoreError::not_found("taskAssignment", task_id));
        }
        self.persistence
            .find_assignment_for_user(task_id, actor.user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("taskAssignment", task_id))
    }

    async fn locate_gated_workflow_step(
        &self,
        task: &AutomationTask,
        role_hint: Role,
    ) -> Result<WorkflowStepTask> {
        let order_id = task.related_order_id.expect("order-linked task");
        let allowed = registry::allowed_step_keys_for_role(role_hint);
        let steps = self.persistence.list_workflow_step_tasks(order_id).await?;
        let active_key = steps
            .iter()
            .find(|s| matches!(s.status, crate::types::WorkflowStepStatus::Active))
            .map(|s| s.step_key.clone());
        steps
            .into_iter()
            .find(|s| matches!(s.status, crate::types::WorkflowStepStatus::Active) && allowed.contains(&s.step_key.as_str()))
            .ok_or_else(|| {
                let active_key = active_key.as_deref().unwrap_or("none");
                CoreError::permission_denied(format!(
                    "no active workflow step for role {role_hint:?}; currently active step is {active_key}"
                ))
            })
    }

    async fn apply_cross_role_acknowledgement(
        &self,
        order_id: i64,
        target_step: &WorkflowStepTask,
    ) -> Result<()> {
        match target_step.step_key.as_str() {
            "deliveryReceived" => {
                self.mark_role_assignments_done_if_no_remaining_steps(order_id, Role::Foreman)
                    .await
            }
            "confirmReceived" => {
                self.mark_role_assignments_done_if_no_remaining_steps(order_id, Role::Delivery)
                    .await
            }
            _ => Ok(()),
        }
    }

    async fn mark_role_assignments_done_if_no_remaining_steps(
        &self,
        order_id: i64,
        role: Role,
    ) -> Result<()> {
        if self.required_steps_remain_for_role(order_id, role, None).await? {
            return Ok(());
        }
        self.close_role_assignments_for_order(order_id, role).await
    }

    /// Marks every non-done assignment for `role` on the order's automation
    /// tasks — the role's own non-root task and the order-root's per-role
    /// placeholder alike — as `done`. The root carries one placeholder per
    /// role in the order's template so `cascade_root_and_order`'s "all
    /// required assignments done" gate (§3 invariant (c)) can observe
    /// role-level completion even though claiming and completing happens on
    /// each role's dedicated non-root task.
    async fn close_role_assignments_for_order(&self, order_id: i64, role: Role) -> Result<()> {
        let mut tasks = self.persistence.list_open_non_root_tasks_for_order(order_id).await?;
        if let Some(root) = self.persistence.find_order_root_task(order_id).await? {
            tasks.push(root);
        }
        for task in tasks {
            for assignment in self.persistence.list_task_assignments(task.id).await? {
                if assignment.role_hint == role && !matches!(assignment.status, AssignmentStatus::Done) {
                    self.persistence
                        .update_task_assignment(assignment.id, AssignmentStatus::Done, None, None)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Whether the given role still has required, non-done workflow steps
    /// in this order. `excluding_step_key`, when set, is treated as already
    /// done even if the persisted row hasn't caught up yet (used while
    /// we're mid-transaction on that exact step).
    async fn required_steps_remain_for_role(
        &self,
        order_id: i64,
        role: Role,
        excluding_step_key: Option<&str>,
    ) -> Result<bool> {
        let order = self
            .persistence
            .get_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("order", order_id))?;
        let steps = self.persistence.list_workflow_step_tasks(order_id).await?;
        let role_step_keys: Vec<&str> = registry::steps_for(order.order_type)
            .iter()
            .filter(|s| s.assigned_to == role && s.required)
            .map(|s| s.step_key)
            .collect();

        Ok(steps.iter().any(|s| {
            role_step_keys.contains(&s.step_key.as_str())
                && !matches!(s.status, crate::types::WorkflowStepStatus::Done)
                && excluding_step_key != Some(s.step_key.as_str())
        }))
    }

    /// §4.7.4 — admin-only reassignment of a task's claim.
    #[tracing::instrument(skip(self, actor))]
    pub async fn reassign_claim(
        &self,
        task_id: i64,
        new_user_id: i64,
        actor: &CallerContext,
    ) -> Result<AutomationTask> {
        if !actor.is_system_admin {
            return Err(CoreError::permission_denied("reassignment is admin-only"));
        }
        let task = self
            .persistence
            .get_automation_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("automationTask", task_id))?;
        let previous = task.claimed_by_user_id;

        self.persistence
            .override_claim_automation_task(task_id, new_user_id)
            .await?;
        self.persistence
            .insert_task_event(NewTaskEvent {
                automation_task_id: task_id,
                user_id: Some(actor.user_id),
                event_type: TaskEventType::Reassigned,
                metadata: json!({ "fromUserId": previous, "toUserId": new_user_id }),
            })
            .await?;
        self.persistence
            .insert_audit_log(
                Some(actor.user_id),
                "reassignClaim",
                "automationTask",
                task_id,
                true,
                None,
                json!({ "fromUserId": previous, "toUserId": new_user_id }),
            )
            .await?;

        self.events
            .publish(DomainEvent {
                name: EventName::TaskReassigned,
                actor: Some(actor.clone()),
                entity_type: "automationTask",
                entity_id: task_id,
                data: json!({ "fromUserId": previous, "toUserId": new_user_id }),
            })
            .await;

        self.persistence
            .get_automation_task(task_id)
            .await?
            .ok_or_else(|| CoreError::Internal {
                context: format!("automation task {task_id} vanished after reassignment"),
            })
    }

    /// §4.7.4 — admin-only reassignment of an assignment's user/role.
    #[tracing::instrument(skip(self, actor))]
    pub async fn reassign_assignment(
        &self,
        assignment_id: i64,
        new_user_id: Option<i64>,
        actor: &CallerContext,
    ) -> Result<TaskAssignment> {
        if !actor.is_system_admin {
            return Err(CoreError::permission_denied("reassignment is admin-only"));
        }
        let assignment = self
            .persistence
            .get_task_assignment(assignment_id)
            .await?
            .ok_or_else(|| CoreError::not_found("taskAssignment", assignment_id))?;
        let previous = assignment.user_id;

        self.persistence
            .update_task_assignment(assignment_id, assignment.status, new_user_id, None)
            .await?;
        self.persistence
            .insert_task_event(NewTaskEvent {
                automation_task_id: assignment.automation_task_id,
                user_id: Some(actor.user_id),
                event_type: TaskEventType::Reassigned,
                metadata: json!({ "fromUserId": previous, "toUserId": new_user_id, "assignmentId": assignment_id }),
            })
            .await?;
        self.persistence
            .insert_audit_log(
                Some(actor.user_id),
                "reassignAssignment",
                "taskAssignment",
                assignment_id,
                true,
                None,
                json!({ "fromUserId": previous, "toUserId": new_user_id }),
            )
            .await?;

        self.persistence
            .get_task_assignment(assignment_id)
            .await?
            .ok_or_else(|| CoreError::Internal {
                context: format!("assignment {assignment_id} vanished after reassignment"),
            })
    }

    /// §4.7.5 — soft delete: transition to `cancelled`, write a `cancelled`
    /// TaskEvent. No physical deletion.
    #[tracing::instrument(skip(self, actor))]
    pub async fn cancel(&self, task_id: i64, actor: &CallerContext) -> Result<AutomationTask> {
        self.persistence
            .set_automation_task_status(task_id, AutomationTaskStatus::Cancelled)
            .await?;
        self.persistence
            .insert_task_event(NewTaskEvent {
                automation_task_id: task_id,
                user_id: Some(actor.user_id),
                event_type: TaskEventType::Cancelled,
                metadata: json!({}),
            })
            .await?;
        self.persistence
            .get_automation_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("automationTask", task_id))
    }

    /// §4.7.6 — scoped task listing.
    pub async fn list_tasks(
        &self,
        status: Option<AutomationTaskStatus>,
        task_type: Option<String>,
        creator_id: Option<i64>,
        actor: &CallerContext,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AutomationTask>> {
        let current_user_roles = self.persistence.get_user_operational_roles(actor.user_id).await?;
        self.persistence
            .list_automation_tasks(TaskListFilter {
                status,
                task_type,
                creator_id,
                current_user_id: actor.user_id,
                current_user_is_admin: actor.is_system_admin,
                current_user_roles,
                limit,
                offset,
            })
            .await
    }

    /// §4.7.6 — the claimable queue for a role.
    pub async fn available_tasks_for_role(&self, role: Role) -> Result<Vec<AutomationTask>> {
        self.persistence.list_available_tasks_for_role(role).await
    }

    /// The audit trail for a task.
    pub async fn list_events(&self, task_id: i64) -> Result<Vec<TaskEvent>> {
        self.persistence.list_task_events(task_id).await
    }

    /// A task with its assignments eagerly fetched, per §9's explicit
    /// eager-fetch design note replacing ORM lazy loading.
    pub async fn get_task_with_assignments(
        &self,
        task_id: i64,
    ) -> Result<(AutomationTask, Vec<TaskAssignment>)> {
        let task = self
            .persistence
            .get_automation_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("automationTask", task_id))?;
        let assignments = self.persistence.list_task_assignments(task_id).await?;
        Ok((task, assignments))
    }

    /// Admin force-complete: complete a task with no remaining assignments
    /// unconditionally (S5). Attempting this on a task that still has
    /// assignments is `InvalidState`.
    #[tracing::instrument(skip(self, actor))]
    pub async fn admin_force_complete(&self, task_id: i64, actor: &CallerContext) -> Result<AutomationTask> {
        if !actor.is_system_admin {
            return Err(CoreError::permission_denied("force-complete is admin-only"));
        }
        let assignments = self.persistence.list_task_assignments(task_id).await?;
        if !assignments.is_empty() {
            return Err(CoreError::invalid_state(
                "task has assignments; use completeAssignment instead of force-complete",
            ));
        }
        self.persistence
            .set_automation_task_status(task_id, AutomationTaskStatus::Completed)
            .await?;
        self.persistence
            .insert_audit_log(
                Some(actor.user_id),
                "adminForceComplete",
                "automationTask",
                task_id,
                true,
                None,
                json!({}),
            )
            .await?;
        self.persistence
            .insert_task_event(NewTaskEvent {
                automation_task_id: task_id,
                user_id: Some(actor.user_id),
                event_type: TaskEventType::Closed,
                metadata: json!({ "reason": "adminForceComplete" }),
            })
            .await?;
        self.persistence
            .get_automation_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("automationTask", task_id))
    }

    /// Foreman → delivery chaining (§4.7.3). Idempotent: a partial unique
    /// index on `(relatedOrderId, requiredRole)` over the active status set
    /// backs this at the database level; the pre-check here only improves
    /// the error path's clarity under a lost race.
    async fn chain_foreman_to_delivery(&self, order: &Order, foreman_task_id: Option<i64>) -> Result<()> {
        if self
            .persistence
            .find_active_task_for_role(order.id, Role::Delivery)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let result = self
            .create_task(
                "delivery".to_string(),
                "Deliver order".to_string(),
                crate::inventory::SYSTEM_ACTOR,
                Some(order.id),
                Some(Role::Delivery),
                false,
                &[Role::Delivery],
                json!({}),
                None,
            )
            .await;

        match result {
            Ok(_) | Err(CoreError::Conflict { .. }) => {}
            Err(err) => return Err(err),
        }

        if let Some(foreman_task_id) = foreman_task_id {
            self.persistence
                .set_automation_task_status(foreman_task_id, AutomationTaskStatus::Completed)
                .await?;
        }
        Ok(())
    }

    /// Cascade to the order-root task and the order itself (§4.7.3).
    async fn cascade_root_and_order(&self, order: &Order, actor: Option<&CallerContext>) -> Result<()> {
        let Some(root) = self.persistence.find_order_root_task(order.id).await? else {
            return Ok(());
        };
        if matches!(root.status, AutomationTaskStatus::Completed | AutomationTaskStatus::Cancelled) {
            return Ok(());
        }

        let assignments = self.persistence.list_task_assignments(root.id).await?;
        let all_required_done = assignments
            .iter()
            .all(|a| matches!(a.status, AssignmentStatus::Done | AssignmentStatus::Skipped));

        if !all_required_done {
            return Ok(());
        }

        if matches!(order.order_type, OrderType::AgentRetail) {
            let steps = self.persistence.list_workflow_step_tasks(order.id).await?;
            let deliver_items_done = steps
                .iter()
                .find(|s| s.step_key == "deliverItems")
                .is_some_and(|s| matches!(s.status, crate::types::WorkflowStepStatus::Done));
            if !deliver_items_done {
                tracing::info!(
                    order_id = order.id,
                    order_type = ?order.order_type,
                    guard = "agent_retail_deliver_items",
                    "cascade suppressed: agentRetail order has not completed deliverItems yet"
                );
                return Ok(());
            }
        }
        tracing::info!(
            order_id = order.id,
            order_type = ?order.order_type,
            guard = "agent_retail_deliver_items",
            "cascade eligible: all required root assignments done"
        );

        self.persistence
            .set_automation_task_status(root.id, AutomationTaskStatus::Completed)
            .await?;
        self.persistence
            .set_order_status(order.id, crate::types::OrderStatus::Completed)
            .await?;

        for task in self.persistence.list_open_non_root_tasks_for_order(order.id).await? {
            self.persistence
                .set_automation_task_status(task.id, AutomationTaskStatus::Completed)
                .await?;
            for assignment in self.persistence.list_task_assignments(task.id).await? {
                if !matches!(assignment.status, AssignmentStatus::Done) {
                    self.persistence
                        .update_task_assignment(assignment.id, AssignmentStatus::Done, None, None)
                        .await?;
                }
            }
        }

        self.events
            .publish(DomainEvent {
                name: EventName::TaskCompleted,
                actor: actor.cloned(),
                entity_type: "automationTask",
                entity_id: root.id,
                data: json!({ "isOrderRoot": true, "orderId": order.id }),
            })
            .await;
        self.events
            .publish(DomainEvent {
                name: EventName::OrderCompleted,
                actor: actor.cloned(),
                entity_type: "order",
                entity_id: order.id,
                data: json!({}),
            })
            .await;

        Ok(())
    }

    /// Delivery assignment post-complete lifecycle: once every required
    /// delivery workflow step is done, mark every delivery assignment on
    /// the order's automation tasks `done`.
    async fn delivery_assignment_post_complete(&self, order: &Order) -> Result<()> {
        if self
            .required_steps_remain_for_role(order.id, Role::Delivery, None)
            .await?
        {
            return Ok(());
        }
        self.close_role_assignments_for_order(order.id, Role::Delivery).await
    }

    async fn find_foreman_task_for_order(&self, order_id: i64) -> Result<Option<i64>> {
        Ok(self
            .persistence
            .find_active_task_for_role(order_id, Role::Foreman)
            .await?
            .map(|t| t.id))
    }
}

#[async_trait]
impl AutomationHook for AutomationEngine {
    async fn on_workflow_step_completed(
        &self,
        order: &Order,
        completed_step: &WorkflowStepTask,
        actor: Option<&CallerContext>,
    ) -> Result<()> {
        if completed_step.step_key == "foremanHandover"
            && matches!(
                order.order_type,
                OrderType::AgentRestock | OrderType::StoreKeeperRestock | OrderType::CustomerWholesale
            )
        {
            let foreman_task_id = self.find_foreman_task_for_order(order.id).await?;
            self.chain_foreman_to_delivery(order, foreman_task_id).await?;
        }

        if matches!(
            completed_step.step_key.as_str(),
            "deliveryReceived" | "deliverItems" | "acceptDelivery"
        ) {
            self.delivery_assignment_post_complete(order).await?;
        }

        if completed_step.step_key == "confirmReceived" {
            // The requester never holds an automation task of their own —
            // confirmReceived is completed directly via the workflow-step
            // endpoint — so this is the only place the root's requester
            // placeholder gets closed.
            self.close_role_assignments_for_order(order.id, Role::Requester).await?;
        }

        self.cascade_root_and_order(order, actor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hint_equality_is_available_for_assignment_matching() {
        assert_eq!(Role::Foreman, Role::Foreman);
        assert_ne!(Role::Foreman, Role::Delivery);
    }
}
