// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! C1 — the immutable, process-wide Workflow Registry.
//!
//! A static mapping from order type to an ordered sequence of step
//! definitions. This is the single source of truth for step ordering, role
//! assignment, and allowed step keys; no other module hard-codes a step
//! name string, it always goes through [`steps_for`] or [`StepDef`].

use crate::types::{OrderType, Role};

/// A single step definition within an order type's registered sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDef {
    /// Stable string id, e.g. `"assembleItems"`. Stored verbatim on
    /// `WorkflowStepTask::stepKey`.
    pub step_key: &'static str,
    /// User-visible title.
    pub title: &'static str,
    /// Contextual button/action label.
    pub action_label: &'static str,
    /// The operational role that owns this step.
    pub assigned_to: Role,
    /// Whether this step must be `done` for the order to reach `completed`.
    pub required: bool,
}

const ASSEMBLE_ITEMS: StepDef = StepDef {
    step_key: "assembleItems",
    title: "Assemble items",
    action_label: "Mark items assembled",
    assigned_to: Role::Foreman,
    required: true,
};

const FOREMAN_HANDOVER: StepDef = StepDef {
    step_key: "foremanHandover",
    title: "Hand over to delivery",
    action_label: "Hand over",
    assigned_to: Role::Foreman,
    required: true,
};

const DELIVERY_RECEIVED: StepDef = StepDef {
    step_key: "deliveryReceived",
    title: "Acknowledge receipt from foreman",
    action_label: "Acknowledge receipt",
    assigned_to: Role::Delivery,
    required: true,
};

const DELIVER_ITEMS: StepDef = StepDef {
    step_key: "deliverItems",
    title: "Deliver items",
    action_label: "Mark delivered",
    assigned_to: Role::Delivery,
    required: true,
};

const CONFIRM_RECEIVED: StepDef = StepDef {
    step_key: "confirmReceived",
    title: "Confirm receipt",
    action_label: "Confirm receipt",
    assigned_to: Role::Requester,
    required: true,
};

const ACCEPT_DELIVERY: StepDef = StepDef {
    step_key: "acceptDelivery",
    title: "Accept delivery",
    action_label: "Accept delivery",
    assigned_to: Role::Delivery,
    required: true,
};

const RESTOCK_SEQUENCE: &[StepDef] = &[
    ASSEMBLE_ITEMS,
    FOREMAN_HANDOVER,
    DELIVERY_RECEIVED,
    DELIVER_ITEMS,
    CONFIRM_RECEIVED,
];

const WHOLESALE_SEQUENCE: &[StepDef] = &[
    ASSEMBLE_ITEMS,
    FOREMAN_HANDOVER,
    DELIVERY_RECEIVED,
    DELIVER_ITEMS,
];

const RETAIL_SEQUENCE: &[StepDef] = &[ACCEPT_DELIVERY, DELIVER_ITEMS];

/// Return the registered, ordered step sequence for an order type.
///
/// `agentRestock` and `storeKeeperRestock` share the full five-step restock
/// sequence including the final `confirmReceived`. `customerWholesale` omits
/// that final step. `agentRetail` uses the shorter two-step delivery-only
/// sequence.
pub fn steps_for(order_type: OrderType) -> &'static [StepDef] {
    match order_type {
        OrderType::AgentRestock | OrderType::StoreKeeperRestock => RESTOCK_SEQUENCE,
        OrderType::CustomerWholesale => WHOLESALE_SEQUENCE,
        OrderType::AgentRetail => RETAIL_SEQUENCE,
    }
}

/// Map an automation-task `roleHint` to the set of workflow step keys that
/// role is allowed to act on, per §4.7.3's workflow gating rule.
pub fn allowed_step_keys_for_role(role: Role) -> &'static [&'static str] {
    match role {
        Role::Foreman => &["assembleItems", "foremanHandover"],
        Role::Delivery => &["deliveryReceived", "deliverItems", "acceptDelivery"],
        Role::Requester => &["confirmReceived"],
        Role::Warehouse => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restock_and_storekeeper_share_the_full_sequence() {
        let restock = steps_for(OrderType::AgentRestock);
        let storekeeper = steps_for(OrderType::StoreKeeperRestock);
        assert_eq!(restock, storekeeper);
        assert_eq!(restock.len(), 5);
        assert_eq!(restock.last().unwrap().step_key, "confirmReceived");
    }

    #[test]
    fn wholesale_omits_the_final_confirm_step() {
        let seq = steps_for(OrderType::CustomerWholesale);
        assert_eq!(seq.len(), 4);
        assert!(seq.iter().all(|s| s.step_key != "confirmReceived"));
        assert_eq!(seq.last().unwrap().step_key, "deliverItems");
    }

    #[test]
    fn retail_uses_the_short_delivery_only_sequence() {
        let seq = steps_for(OrderType::AgentRetail);
        assert_eq!(
            seq.iter().map(|s| s.step_key).collect::<Vec<_>>(),
            vec!["acceptDelivery", "deliverItems"]
        );
    }

    #[test]
    fn every_sequence_has_exactly_one_candidate_first_step() {
        for order_type in [
            OrderType::AgentRestock,
            OrderType::AgentRetail,
            OrderType::StoreKeeperRestock,
            OrderType::CustomerWholesale,
        ] {
            assert!(!steps_for(order_type).is_empty());
        }
    }

    #[test]
    fn role_step_mapping_matches_the_gating_table() {
        assert_eq!(
            allowed_step_keys_for_role(Role::Foreman),
            &["assembleItems", "foremanHandover"]
        );
        assert_eq!(
            allowed_step_keys_for_role(Role::Delivery),
            &["deliveryReceived", "deliverItems", "acceptDelivery"]
        );
        assert_eq!(allowed_step_keys_for_role(Role::Requester), &["confirmReceived"]);
    }
}
