// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! C3 — the outbound webhook emitter.
//!
//! Builds the fixed envelope described by spec §4.3/§6 and POSTs it at most
//! once per `eventId` to an optional configured URL. Never raises to the
//! caller: every failure mode (missing URL, transport error, non-2xx
//! response) is logged and reported back only as `false`.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use serde::Serialize;
use serde_json::Value;

use crate::events::{DomainEvent, EventSubscriber};
use crate::types::{CallerContext, EventName};

/// The fixed webhook envelope, version `"1.0"`.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEnvelope {
    /// Envelope schema version, always `"1.0"`.
    pub version: &'static str,
    /// Dotted event name, e.g. `"order.completed"`.
    pub event: &'static str,
    /// Unique id for this event occurrence, used for idempotent replay.
    pub event_id: String,
    /// UTC, `Z`-suffixed ISO 8601 timestamp.
    pub occurred_at: String,
    /// Deployment environment name.
    pub environment: String,
    /// Always `"automation-core"`.
    pub source: &'static str,
    /// The actor that caused the event.
    pub actor: WebhookActor,
    /// The primary entity the event concerns.
    pub entity: WebhookEntity,
    /// Event-specific payload.
    pub data: Value,
}

/// The `actor` sub-object of a webhook envelope.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookActor {
    /// The acting user's id, or `None` for system-originated events.
    pub user_id: Option<i64>,
    /// The acting user's display name, `"system"` when there is no caller.
    pub username: String,
    /// A coarse role label for display purposes only.
    pub role: String,
}

impl From<Option<&CallerContext>> for WebhookActor {
    fn from(caller: Option<&CallerContext>) -> Self {
        match caller {
            Some(c) => WebhookActor {
                user_id: Some(c.user_id),
                username: c.username.clone(),
                role: if c.is_system_admin { "admin" } else { "user" }.to_string(),
            },
            None => WebhookActor {
                user_id: None,
                username: "system".to_string(),
                role: "system".to_string(),
            },
        }
    }
}

/// The `entity` sub-object of a webhook envelope.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEntity {
    /// Entity type name, e.g. `"order"`.
    pub r#type: &'static str,
    /// Entity id.
    pub id: i64,
}

impl WebhookEnvelope {
    /// Build an envelope for `event` concerning `(entity_type, entity_id)`,
    /// carrying `data`. `event_id` is caller-provided (for idempotent
    /// replay) or freshly generated.
    pub fn build(
        event: EventName,
        event_id: String,
        environment: &str,
        actor: Option<&CallerContext>,
        entity_type: &'static str,
        entity_id: i64,
        data: Value,
        occurred_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            version: "1.0",
            event: event.wire_name(),
            event_id,
            occurred_at: occurred_at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            environment: environment.to_string(),
            source: "automation-core",
            actor: actor.into(),
            entity: WebhookEntity {
                r#type: entity_type,
                id: entity_id,
            },
            data,
        }
    }
}

/// The outbound webhook emitter. Holds an optional destination URL, an HTTP
/// client, and a bounded idempotency cache of recently-sent event ids.
pub struct WebhookEmitter {
    url: Option<String>,
    environment: String,
    client: reqwest::Client,
    sent_ids: DashSet<String>,
    capacity: usize,
}

impl WebhookEmitter {
    /// Construct an emitter. `url` is `None` when webhooks are disabled
    /// entirely (`emit` then always returns `false` without attempting a
    /// send). `timeout` bounds every outbound request. `capacity` bounds the
    /// idempotency cache's size. `environment` is echoed into every envelope.
    pub fn new(url: Option<String>, environment: String, timeout: Duration, capacity: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url,
            environment,
            client,
            sent_ids: DashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Emit a single webhook. Returns `true` when a network send was
    /// attempted and accepted (2xx), or when this `eventId` was already sent
    /// before (idempotent replay short-circuit). Returns `false` and logs a
    /// warning on every other outcome: no URL configured, transport error,
    /// non-2xx response.
    #[tracing::instrument(skip(self, envelope), fields(event = envelope.event, event_id = %envelope.event_id))]
    pub async fn emit(&self, envelope: &WebhookEnvelope) -> bool {
        if envelope.event_id.is_empty() {
            tracing::warn!("webhook payload missing eventId; not sending");
            return false;
        }

        if self.sent_ids.contains(&envelope.event_id) {
            tracing::debug!("eventId already sent; idempotent replay");
            return true;
        }

        let Some(url) = self.url.as_deref() else {
            tracing::debug!("no webhook URL configured; skipping send");
            return false;
        };

        let result = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Event-Id", &envelope.event_id)
            .json(envelope)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                self.remember(envelope.event_id.clone());
                true
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "webhook endpoint returned non-2xx status");
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "webhook transport error");
                false
            }
        }
    }

    fn remember(&self, event_id: String) {
        if self.sent_ids.len() >= self.capacity {
            if let Some(evicted) = self.sent_ids.iter().next().map(|e| e.clone()) {
                self.sent_ids.remove(&evicted);
            }
        }
        self.sent_ids.insert(event_id);
    }
}

#[async_trait]
impl EventSubscriber for WebhookEmitter {
    fn name(&self) -> &'static str {
        "webhookEmitter"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let envelope = WebhookEnvelope::build(
            event.name,
            uuid::Uuid::new_v4().to_string(),
            &self.environment,
            event.actor.as_ref(),
            event.entity_type,
            event.entity_id,
            event.data.clone(),
            chrono::Utc::now(),
        );
        self.emit(&envelope).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope(event_id: &str) -> WebhookEnvelope {
        WebhookEnvelope::build(
            EventName::OrderCompleted,
            event_id.to_string(),
            "test",
            None,
            "order",
            1,
            serde_json::json!({}),
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn no_url_configured_returns_false() {
        let emitter = WebhookEmitter::new(None, "test".to_string(), Duration::from_secs(5), 16);
        assert!(!emitter.emit(&sample_envelope("evt-1")).await);
    }

    #[tokio::test]
    async fn empty_event_id_returns_false() {
        let emitter = WebhookEmitter::new(
            Some("http://127.0.0.1:1".to_string()),
            "test".to_string(),
            Duration::from_secs(5),
            16,
        );
        assert!(!emitter.emit(&sample_envelope("")).await);
    }

    #[test]
    fn envelope_carries_fixed_version_and_source() {
        let env = sample_envelope("evt-1");
        assert_eq!(env.version, "1.0");
        assert_eq!(env.source, "automation-core");
        assert_eq!(env.event, "order.completed");
    }

    #[test]
    fn actor_defaults_to_system_when_caller_absent() {
        let actor: WebhookActor = None.into();
        assert_eq!(actor.username, "system");
        assert!(actor.user_id.is_none());
    }
}
