//! Password login endpoint.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::handlers::envelope::{Envelope, Failure};

use super::password::verify_password;
use super::rate_limit::{throttle_key, RateLimitAction, RateLimitDecision};
use super::session::{require_guest, session_cookie};
use super::state::AuthState;
use super::storage::{insert_session, lookup_user_by_email};
use super::types::{LoginRequest, UserBody};
use super::utils::{extract_client_ip, normalize_email};

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = Envelope),
        (status = 401, description = "Invalid credentials", body = Envelope),
        (status = 403, description = "Already authenticated", body = Envelope),
        (status = 429, description = "Rate limited", body = Envelope)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return Failure::missing_fields(&["email", "password"]).into_response();
        }
    };

    if let Err(failure) = require_guest(&headers, &pool).await {
        return failure.into_response();
    }

    let email = normalize_email(&request.email);

    // The throttle runs before any credential work so attempts burn the
    // limit whether or not the password is right.
    let client_ip = extract_client_ip(&headers);
    let key = throttle_key(&email, client_ip.as_deref());
    if auth_state.rate_limiter().check(RateLimitAction::Login, &key)
        == RateLimitDecision::Limited
    {
        return Failure::RateLimited.into_response();
    }

    let user = match lookup_user_by_email(&pool, &email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to lookup user for login: {err}");
            return Failure::Internal.into_response();
        }
    };

    // Unknown email and wrong password answer identically.
    let Some(user) = user else {
        return Failure::InvalidCredentials.into_response();
    };
    if !verify_password(&request.password, &user.password_hash) {
        return Failure::InvalidCredentials.into_response();
    }

    let config = auth_state.config();
    let token = match insert_session(&pool, user.user_id, config.session_ttl_seconds()).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err}");
            return Failure::Internal.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(config, &token) {
        response_headers.insert(SET_COOKIE, cookie);
    }

    let mut data = UserBody::from_record(&user).into_data();
    data["token"] = serde_json::Value::String(token);

    (
        StatusCode::OK,
        response_headers,
        Json(Envelope::data(data).with_message("Login successful")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{FixedWindowRateLimiter, NoopRateLimiter, RateLimiter};
    use super::super::signing::UrlSigner;
    use super::super::state::{AuthConfig, AuthState};
    use super::*;
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state_with(limiter: Arc<dyn RateLimiter>) -> Arc<AuthState> {
        let config = AuthConfig::new(
            "https://app.kompaso.dev".to_string(),
            "https://api.kompaso.dev".to_string(),
        );
        Arc::new(AuthState::new(
            config,
            limiter,
            UrlSigner::new(SecretString::from("sekreta")),
            None,
        ))
    }

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .expect("lazy pool")
    }

    #[tokio::test]
    async fn login_missing_payload_is_validation_error() {
        let response = login(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state_with(Arc::new(NoopRateLimiter))),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn login_rate_limited_before_credentials() {
        // Exhaust the window up front; the handler must answer 429 without
        // ever reaching the credential check (no DB available here).
        let limiter = Arc::new(FixedWindowRateLimiter::new());
        let key = throttle_key("jane@x.com", None);
        for _ in 0..5 {
            limiter.check(RateLimitAction::Login, &key);
        }

        let response = login(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state_with(limiter)),
            Some(Json(LoginRequest {
                email: "jane@x.com".to_string(),
                password: "whatever".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
