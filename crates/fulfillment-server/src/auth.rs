// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Caller-identity extraction.
//!
//! The spec names `getCurrentUser` as an external collaborator (§6, §9):
//! something upstream of this server already authenticated the request and
//! knows who the caller is. This module is the seam where that collaborator
//! plugs in. The stub here trusts three headers set by whatever sits in
//! front of this service (a gateway, a session-lookup sidecar); swapping in
//! a real session/JWT lookup means replacing this one extractor, nothing
//! downstream changes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use fulfillment_core::types::CallerContext;

const USER_ID_HEADER: &str = "x-user-id";
const USERNAME_HEADER: &str = "x-username";
const ADMIN_HEADER: &str = "x-system-admin";

/// Extractor wrapping [`CallerContext`] (an `axum` extractor can't be
/// implemented directly on a foreign type — this newtype is the seam).
pub struct Caller(pub CallerContext);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing or invalid x-user-id header"))?;

        let username = parts
            .headers
            .get(USERNAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let is_system_admin = parts
            .headers
            .get(ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|s| s.eq_ignore_ascii_case("true"));

        Ok(Caller(CallerContext {
            user_id,
            username,
            is_system_admin,
        }))
    }
}
