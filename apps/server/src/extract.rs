//! Bearer-token authentication for handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use quan_core::Permission;
use quan_engine::{extract_bearer_token, Claims};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// The staff member behind a request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.sub
    }

    /// Fails with 403 unless the role allows `permission`.
    pub fn require(&self, state: &AppState, permission: Permission) -> ApiResult<()> {
        Ok(state.engine.auth.authorize(&self.0, permission)?)
    }

    /// Passes if the role allows any of `permissions`.
    pub fn require_any(&self, state: &AppState, permissions: &[Permission]) -> ApiResult<()> {
        if permissions.iter().any(|p| self.0.role.allows(*p)) {
            return Ok(());
        }
        match permissions.first() {
            Some(first) => self.require(state, *first),
            None => Ok(()),
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;
        let token = extract_bearer_token(header)
            .ok_or_else(|| ApiError::unauthorized("Expected a bearer token"))?;

        let claims = state.engine.auth.verify(token)?;
        Ok(AuthUser(claims))
    }
}
