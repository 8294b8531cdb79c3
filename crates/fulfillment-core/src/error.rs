// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for fulfillment-core.
//!
//! Every public operation on every component (C4–C9) returns
//! `Result<T, CoreError>`. The taxonomy is fixed by spec: `NotFound`,
//! `PermissionDenied`, `InvalidState`, `Conflict`, `InsufficientStock`,
//! `ValidationError`, `Internal`. The HTTP layer (`fulfillment-server`) maps
//! each variant to a status code; this crate stays transport-agnostic.

/// Result type using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// The structured error taxonomy for core operations.
///
/// Each variant carries enough context to build a precise, human-readable
/// `detail` string without the caller needing to inspect `source_`.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// The requested entity does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of entity that was missing, e.g. `"order"`, `"automation_task"`.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not permitted to perform this operation.
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Human-readable reason, naming the concrete rule that was violated
        /// (e.g. the currently active step, for §4.7.3's diagnosability
        /// requirement).
        reason: String,
    },

    /// The entity exists but is not in a state that permits this operation.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Human-readable reason.
        reason: String,
    },

    /// A concurrent modification or a uniqueness violation prevented the
    /// operation from completing. Callers should treat this as retryable.
    #[error("conflict: {reason}")]
    Conflict {
        /// Human-readable reason, e.g. `"already_claimed"`, `"lost_race"`.
        reason: String,
    },

    /// A sale or reservation could not be satisfied by current stock.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// The product that ran short.
        product_id: i64,
        /// The quantity the caller requested.
        requested: i64,
        /// The quantity actually available at the time of the check.
        available: i64,
    },

    /// The caller supplied invalid or missing arguments.
    #[error("validation error for '{field}': {message}")]
    ValidationError {
        /// The field or argument that failed validation.
        field: String,
        /// The validation failure message.
        message: String,
    },

    /// An unexpected internal failure. Always logged with full context by
    /// the caller; the `detail` surfaced to clients is deliberately generic.
    #[error("internal error: {context}")]
    Internal {
        /// Internal context, never echoed verbatim to untrusted clients.
        context: String,
    },
}

impl CoreError {
    /// Machine-readable error code, stable across releases.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Conflict { .. } => "CONFLICT",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// Convenience constructor for a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Convenience constructor for a permission-denied error.
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for an invalid-state error.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for a conflict error.
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoreError::NotFound {
                entity: "row",
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                CoreError::Conflict {
                    reason: format!("unique constraint violated: {db_err}"),
                }
            }
            other => CoreError::Internal {
                context: format!("database error: {other}"),
            },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal {
            context: format!("json error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            CoreError::not_found("order", 1).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            CoreError::conflict("already_claimed").error_code(),
            "CONFLICT"
        );
        assert_eq!(
            CoreError::InsufficientStock {
                product_id: 1,
                requested: 5,
                available: 2
            }
            .error_code(),
            "INSUFFICIENT_STOCK"
        );
    }

    #[test]
    fn permission_denied_names_the_active_step() {
        let err = CoreError::permission_denied(
            "currently active step is 'foremanHandover', not in caller's allowed set",
        );
        assert!(err.to_string().contains("foremanHandover"));
    }
}
