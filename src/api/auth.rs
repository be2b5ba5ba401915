//! Authentication middleware.
//!
//! [`require_auth`] verifies the bearer token of every protected request and
//! stores the [`AuthenticatedUser`] in the request extensions.
//! [`require_admin`] runs after it on admin routes. Both pass every request
//! through untouched when no identity provider is configured.
//! Handlers read the stored user back through [`CurrentUser`] to scope task
//! access to its owner.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use super::error::ApiErrorResponse;
use super::handlers::AppState;
use crate::domain::Task;
use crate::infrastructure::{AuthError, AuthenticatedUser};

const BEARER_PREFIX: &str = "bearer ";

/// Extracts the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively.
///
/// # Errors
///
/// Returns [`AuthError::MissingToken`] if the header is absent, not ASCII,
/// uses another scheme, or carries an empty token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let prefix = value.get(..BEARER_PREFIX.len()).ok_or(AuthError::MissingToken)?;
    if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        return Err(AuthError::MissingToken);
    }

    let token = value[BEARER_PREFIX.len()..].trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Rejects requests without a valid bearer token.
///
/// # Errors
///
/// - 401 if the token is missing, malformed or rejected
/// - 503 if the identity provider is unreachable
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiErrorResponse> {
    let Some(provider) = state.identity_provider.as_ref() else {
        return Ok(next.run(request).await);
    };

    let token = bearer_token(request.headers())?.to_string();
    let user = provider.verify(&token).await?;

    tracing::debug!(user_id = %user.id, role = ?user.role, "Request authenticated");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Rejects authenticated requests from users without the admin role.
///
/// # Errors
///
/// - 401 if no authenticated user is attached to the request
/// - 403 if the user is not an admin
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiErrorResponse> {
    if state.identity_provider.is_none() {
        return Ok(next.run(request).await);
    }

    let user = request.extensions().get::<AuthenticatedUser>().cloned();
    match user {
        Some(user) if user.is_admin() => Ok(next.run(request).await),
        Some(user) => {
            tracing::warn!(user_id = %user.id, "Admin route refused");
            Err(ApiErrorResponse::forbidden("Admin role required"))
        }
        None => Err(AuthError::MissingToken.into()),
    }
}

// =============================================================================
// CurrentUser Extractor
// =============================================================================

/// The user attached by [`require_auth`], or `None` when authentication is
/// disabled.
///
/// Admins and unauthenticated deployments see every task. Any other user
/// sees only the tasks whose `userId` is their own id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

impl CurrentUser {
    /// Returns `true` if the request may read or change `task`.
    #[must_use]
    pub fn can_access(&self, task: &Task) -> bool {
        match &self.0 {
            None => true,
            Some(user) => user.is_admin() || task.is_owned_by(&user.id),
        }
    }

    /// Id recorded as the owner of tasks created by this request.
    #[must_use]
    pub fn owner_id(&self) -> Option<String> {
        self.0.as_ref().map(|user| user.id.clone())
    }
}

impl<State> FromRequestParts<State> for CurrentUser
where
    State: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &State) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<AuthenticatedUser>().cloned()))
    }
}
