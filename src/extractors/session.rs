//! Extract the caller's session and user from `Authorization: Bearer <session id>`.

use crate::error::{AppError, StoreError};
use crate::session::{Session, User};
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use uuid::Uuid;

/// Header that disables crate write-back, used by test harnesses.
pub const TESTING_HEADER: &str = "x-testing";

/// A loaded session belonging to a known user.
#[derive(Clone, Debug)]
pub struct AuthSession {
    pub session: Session,
    pub user: User,
}

impl AuthSession {
    /// Collection currently loaded in the session.
    pub fn collection_id(&self) -> Option<Uuid> {
        self.session.collection_id()
    }
}

fn bearer_session_id(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing Authorization header".into()))?;
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| AppError::Unauthorized("expected Authorization: Bearer <session>".into()))?;
    Uuid::parse_str(token).map_err(|_| AppError::Unauthorized("invalid session token".into()))
}

fn lookup_failure(what: &'static str, e: StoreError) -> AppError {
    tracing::warn!(error = %e, "{} lookup failed", what);
    AppError::Unauthorized(format!("could not load {}", what))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session_id = bearer_session_id(&parts.headers)?;
        let session = state
            .sessions
            .get_session(session_id)
            .await
            .map_err(|e| lookup_failure("session", e))?
            .ok_or_else(|| AppError::Unauthorized("unknown session".into()))?;
        let user = state
            .sessions
            .get_user(session.user_id)
            .await
            .map_err(|e| lookup_failure("user", e))?
            .ok_or_else(|| AppError::Unauthorized("unknown user".into()))?;
        tracing::Span::current().record("user", tracing::field::display(&user.email));
        Ok(AuthSession { session, user })
    }
}

/// Whether mutations should be written back to the crate (`x-testing` header absent).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrateSync(pub bool);

#[async_trait]
impl<S> FromRequestParts<S> for CrateSync
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CrateSync(!parts.headers.contains_key(TESTING_HEADER)))
    }
}
