// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! C2 — the in-process domain event bus.
//!
//! A thin pub/sub hub decoupling C6/C7/C4/C5 (publishers) from the Webhook
//! Emitter and Notification Dispatcher (subscribers), per the §9 design note
//! on inverting the engine/triggers dependency. Delivery is best-effort and
//! non-blocking: a subscriber failure is logged and swallowed, never
//! propagated to the publisher, and never rolls back the state change that
//! produced the event.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{CallerContext, EventName};

/// A fully-materialised domain event, ready to hand to subscribers.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    /// The event name.
    pub name: EventName,
    /// The actor who triggered the event, if known. System-originated events
    /// (e.g. a low-stock hook firing after a sale) may have no caller.
    pub actor: Option<CallerContext>,
    /// The entity type the event concerns, e.g. `"order"`, `"automationTask"`.
    pub entity_type: &'static str,
    /// The entity's id.
    pub entity_id: i64,
    /// Event-specific payload, merged into the webhook envelope's `data`
    /// field and available to notification recipient-resolution logic.
    pub data: Value,
}

/// A subscriber to the event bus. Implementations MUST NOT return an error
/// that the bus propagates to the publisher — failures are caught at the
/// call site and only logged.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Handle one event. Errors are logged by the bus, never surfaced.
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;

    /// A short name for this subscriber, used in log lines.
    fn name(&self) -> &'static str;
}

/// The event bus. Holds the list of subscribers (typically the Webhook
/// Emitter and the Notification Dispatcher).
///
/// Subscription uses interior mutability rather than `&mut self` because
/// some subscribers (the Trigger Layer) are only constructible once an
/// `Arc<EventBus>` has already been handed to C6/C7 — the same
/// post-construction-wiring shape as [`crate::automation::AutomationHookSlot`].
#[derive(Default)]
pub struct EventBus {
    subscribers: std::sync::RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventBus {
    /// Construct an empty bus. Use [`EventBus::subscribe`] to wire handlers,
    /// at any point before or after this bus is shared as an `Arc`.
    pub fn new() -> Self {
        Self {
            subscribers: std::sync::RwLock::new(Vec::new()),
        }
    }

    /// Register a subscriber. Order of registration is the order of
    /// delivery, though delivery order carries no correctness guarantee —
    /// subscribers must not depend on each other's side effects.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(subscriber);
    }

    /// Publish an event to every registered subscriber. Each subscriber is
    /// invoked independently; one subscriber's failure does not prevent the
    /// others from running, and no failure is returned to the caller.
    #[tracing::instrument(skip(self, event), fields(event = event.name.wire_name(), entity_type = event.entity_type, entity_id = event.entity_id))]
    pub async fn publish(&self, event: DomainEvent) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for subscriber in &subscribers {
            if let Err(err) = subscriber.handle(&event).await {
                tracing::warn!(
                    subscriber = subscriber.name(),
                    event = event.name.wire_name(),
                    error = %err,
                    "event subscriber failed; continuing"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSubscriber {
        count: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl EventSubscriber for CountingSubscriber {
        async fn handle(&self, _event: &DomainEvent) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("simulated subscriber failure");
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn sample_event() -> DomainEvent {
        DomainEvent {
            name: EventName::OrderCreated,
            actor: None,
            entity_type: "order",
            entity_id: 1,
            data: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn a_failing_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let failing_count = Arc::new(AtomicUsize::new(0));
        let ok_count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber {
            count: failing_count.clone(),
            fail: true,
        }));
        bus.subscribe(Arc::new(CountingSubscriber {
            count: ok_count.clone(),
            fail: false,
        }));

        bus.publish(sample_event()).await;

        assert_eq!(failing_count.load(Ordering::SeqCst), 1);
        assert_eq!(ok_count.load(Ordering::SeqCst), 1);
    }
}
