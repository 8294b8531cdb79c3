// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Maps [`fulfillment_core::error::CoreError`] onto HTTP responses.
//!
//! `fulfillment-core` stays transport-agnostic (see its `error` module doc
//! comment); this is the one place that decides what status code each
//! variant gets.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fulfillment_core::error::CoreError;
use serde::Serialize;

/// A `CoreError` dressed up for the HTTP layer.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

/// JSON error body, matching `error_code()`'s machine-readable taxonomy.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            CoreError::InvalidState { .. } => StatusCode::BAD_REQUEST,
            CoreError::Conflict { .. } => StatusCode::CONFLICT,
            CoreError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
            CoreError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            CoreError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(self.0, CoreError::Internal { .. }) {
            tracing::error!(error = %self.0, "internal error surfaced to caller");
        }

        let body = ErrorBody {
            code: self.0.error_code(),
            detail: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
