//! Bearer-token extraction for protected routes.

use crate::error::ApiError;
use crate::server::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::sync::Arc;
use taskwell_common::auth::verify_token;
use taskwell_common::Error;
use tracing::warn;

/// The authenticated subject of a request: the user id carried in the
/// verified token. Handlers add this as an argument to require auth.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

impl AuthUser {
    /// Task routes carry the owning user in the path; the token subject
    /// must match it exactly.
    pub fn require_user(&self, path_user_id: i64) -> Result<(), ApiError> {
        if self.0 != path_user_id {
            warn!(
                "User {} attempted to access resources of user {}",
                self.0, path_user_id
            );
            return Err(Error::Forbidden.into());
        }
        Ok(())
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(Error::Unauthenticated)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(Error::Unauthenticated)?;

        let user_id = verify_token(token, &state.config.jwt_secret)?;
        Ok(AuthUser(user_id))
    }
}
