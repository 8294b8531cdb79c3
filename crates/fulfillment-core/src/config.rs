// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

/// Fulfillment core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Deployment environment name, echoed in the webhook envelope.
    pub environment: String,
    /// Optional outbound webhook URL. When absent, the webhook emitter is a
    /// no-op that logs and returns `false`.
    pub webhook_url: Option<String>,
    /// Outbound webhook request timeout.
    pub webhook_timeout_ms: u64,
    /// Maximum number of recently-sent event ids retained for idempotent
    /// webhook replay detection.
    pub webhook_idempotency_cache_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`: PostgreSQL connection string.
    ///
    /// Optional (with defaults):
    /// - `ENVIRONMENT` (default: `development`)
    /// - `WEBHOOK_URL` (default: unset, webhook emission disabled)
    /// - `WEBHOOK_TIMEOUT_MS` (default: `5000`)
    /// - `WEBHOOK_IDEMPOTENCY_CACHE_SIZE` (default: `4096`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let webhook_url = std::env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty());

        let webhook_timeout_ms: u64 = std::env::var("WEBHOOK_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("WEBHOOK_TIMEOUT_MS", "must be a positive integer"))?;

        let webhook_idempotency_cache_size: usize = std::env::var("WEBHOOK_IDEMPOTENCY_CACHE_SIZE")
            .unwrap_or_else(|_| "4096".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "WEBHOOK_IDEMPOTENCY_CACHE_SIZE",
                    "must be a positive integer",
                )
            })?;

        Ok(Self {
            database_url,
            environment,
            webhook_url,
            webhook_timeout_ms,
            webhook_idempotency_cache_size,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
