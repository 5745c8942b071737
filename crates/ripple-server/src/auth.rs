//! Auth collaborator contract.
//!
//! Identity is out of scope for the core; all it needs is a stable user id
//! per request. The bearer resolver stands in for the real identity service
//! in development and tests.

use async_trait::async_trait;
use axum::http::HeaderMap;

use ripple_core::notebook::UserId;

use crate::error::{ApiError, ApiResult};

/// Resolves requests to stable user identifiers.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a raw token (bearer value or WebSocket query token).
    async fn resolve_token(&self, token: &str) -> ApiResult<UserId>;

    /// Resolve request headers. Default: `Authorization: Bearer <token>`.
    async fn authenticate(&self, headers: &HeaderMap) -> ApiResult<UserId> {
        let header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;
        self.resolve_token(token).await
    }
}

/// Development resolver: the token itself is the user id.
pub struct BearerIdentity;

#[async_trait]
impl Authenticator for BearerIdentity {
    async fn resolve_token(&self, token: &str) -> ApiResult<UserId> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ApiError::Unauthorized);
        }
        Ok(UserId(token.to_string()))
    }
}
