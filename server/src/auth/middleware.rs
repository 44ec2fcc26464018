//! Credential extraction for sync routes.
//!
//! Clients send an API key either as `X-API-Key` or as an
//! `Authorization: Bearer` token. The engine's credential validator
//! decides whether it is accepted.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use crate::error::AppError;
use crate::AppState;

/// Header carrying an API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Proof that the request carried an accepted credential.
#[derive(Debug, Clone)]
pub struct Authenticated;

/// Pull the credential from the request headers, if any.
pub fn credential_from_headers(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key.trim());
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = credential_from_headers(&parts.headers);

        if let Err(e) = state.engine.authenticate(credential).await {
            tracing::debug!(path = %parts.uri.path(), "Rejected request: {}", e);
            return Err(e.into());
        }

        Ok(Authenticated)
    }
}
