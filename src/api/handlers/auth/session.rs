//! Session resolution for cookie and bearer auth.
//!
//! Handlers resolve the caller's identity explicitly at the top of each
//! request; the resolved `Identity` travels by value, never through ambient
//! state.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::handlers::envelope::{Envelope, Failure};

use super::{
    state::{AuthConfig, AuthState},
    storage::{delete_session, lookup_session, SessionRecord},
    utils::hash_session_token,
};

const SESSION_COOKIE_NAME: &str = "kompaso_session";

/// The authenticated caller, resolved once per request.
#[derive(Debug, Clone)]
pub(crate) struct Identity {
    pub(crate) record: SessionRecord,
    /// Digest of the presented token; lets logout delete exactly this session.
    pub(crate) token_hash: Vec<u8>,
}

/// Resolve the request credential into an `Identity`, if one is present.
///
/// Missing or stale credentials resolve to `None`; only infrastructure
/// failures surface as errors.
pub(crate) async fn resolve_identity(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<Identity>, Failure> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_session_token(&token);
    match lookup_session(pool, &token_hash).await {
        Ok(Some(record)) => Ok(Some(Identity { record, token_hash })),
        Ok(None) => Ok(None),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            Err(Failure::Internal)
        }
    }
}

/// Fail with `Unauthenticated` unless a live session is presented.
pub(crate) async fn require_auth(headers: &HeaderMap, pool: &PgPool) -> Result<Identity, Failure> {
    match resolve_identity(headers, pool).await? {
        Some(identity) => Ok(identity),
        None => Err(Failure::Unauthenticated),
    }
}

/// Guest-only routes fail when a valid credential is already present.
pub(crate) async fn require_guest(headers: &HeaderMap, pool: &PgPool) -> Result<(), Failure> {
    match resolve_identity(headers, pool).await? {
        Some(_) => Err(Failure::AlreadyAuthenticated),
        None => Ok(()),
    }
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session cleared", body = Envelope),
        (status = 401, description = "No active session", body = Envelope)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let identity = match require_auth(&headers, &pool).await {
        Ok(identity) => identity,
        Err(failure) => return failure.into_response(),
    };

    if let Err(err) = delete_session(&pool, &identity.token_hash).await {
        error!("Failed to delete session: {err}");
    }

    // Always clear the cookie, even if the session row was already gone.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        axum::Json(Envelope::message("Logout successful")),
    )
        .into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    // Only mark cookies secure when the frontend is served over HTTPS.
    let secure = config.session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
