//! Registration endpoint.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::handlers::envelope::{Envelope, Failure, Validator};
use crate::api::notify::{self, Notification};

use super::password::hash_password;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::{require_guest, session_cookie};
use super::state::AuthState;
use super::storage::{insert_session, insert_user, InsertUserOutcome, UserRecord};
use super::types::{RegisterRequest, UserBody};
use super::utils::{extract_client_ip, normalize_email, valid_email};

const MAX_NAME_LENGTH: usize = 255;

fn validate(request: &RegisterRequest, email_normalized: &str) -> Result<(), Failure> {
    let mut validator = Validator::new();
    if request.name.trim().is_empty() {
        validator.reject("name", "The name field is required.");
    } else if request.name.len() > MAX_NAME_LENGTH {
        validator.reject("name", "The name may not be greater than 255 characters.");
    }
    if email_normalized.is_empty() {
        validator.reject("email", "The email field is required.");
    } else if !valid_email(email_normalized) {
        validator.reject("email", "The email must be a valid email address.");
    }
    if request.password.len() < 8 {
        validator.reject("password", "The password must be at least 8 characters.");
    }
    if request.password != request.password_confirmation {
        validator.reject("password", "The password confirmation does not match.");
    }
    validator.finish()
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = Envelope),
        (status = 403, description = "Already authenticated", body = Envelope),
        (status = 422, description = "Validation error", body = Envelope),
        (status = 429, description = "Rate limited", body = Envelope)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return Failure::missing_fields(&["name", "email", "password"]).into_response();
        }
    };

    if let Err(failure) = require_guest(&headers, &pool).await {
        return failure.into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state.rate_limiter().check(
        RateLimitAction::Register,
        client_ip.as_deref().unwrap_or("unknown"),
    ) == RateLimitDecision::Limited
    {
        return Failure::RateLimited.into_response();
    }

    let email = normalize_email(&request.email);
    if let Err(failure) = validate(&request, &email) {
        return failure.into_response();
    }

    let name = request.name.trim().to_string();
    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return Failure::Internal.into_response();
        }
    };

    // One transaction covers the user row and both queued emails, so a crash
    // cannot create an account that never hears from us.
    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to start registration transaction: {err}");
            return Failure::Internal.into_response();
        }
    };

    let user_id = match insert_user(&mut tx, &name, &email, &password_hash, false).await {
        Ok(InsertUserOutcome::Created(user_id)) => user_id,
        Ok(InsertUserOutcome::Conflict) => {
            let _ = tx.rollback().await;
            return Failure::DuplicateEmail.into_response();
        }
        Err(err) => {
            error!("Failed to insert user: {err}");
            let _ = tx.rollback().await;
            return Failure::Internal.into_response();
        }
    };

    let config = auth_state.config();
    let dashboard_url = format!(
        "{}/dashboard",
        config.frontend_base_url().trim_end_matches('/')
    );
    let verify_url = auth_state.signer().build_verify_url(
        config.api_base_url(),
        user_id,
        &email,
        config.verification_ttl_seconds(),
    );

    let notifications = match Notification::welcome(&name, &dashboard_url).and_then(|welcome| {
        Notification::verify_email(&name, &verify_url).map(|verify| [welcome, verify])
    }) {
        Ok(notifications) => notifications,
        Err(err) => {
            error!("Failed to build registration notifications: {err}");
            let _ = tx.rollback().await;
            return Failure::Internal.into_response();
        }
    };
    for notification in &notifications {
        if let Err(err) = notify::enqueue(&mut tx, &email, notification).await {
            error!("Failed to enqueue registration email: {err}");
            let _ = tx.rollback().await;
            return Failure::Internal.into_response();
        }
    }

    if let Err(err) = tx.commit().await {
        error!("Failed to commit registration transaction: {err}");
        return Failure::Internal.into_response();
    }

    let record = UserRecord {
        user_id,
        name,
        email,
        password_hash,
        role: "member".to_string(),
        email_verified_at: None,
        created_at: Utc::now(),
    };

    let mut response_headers = HeaderMap::new();
    let mut data = UserBody::from_record(&record).into_data();
    match insert_session(&pool, user_id, config.session_ttl_seconds()).await {
        Ok(token) => {
            if let Ok(cookie) = session_cookie(config, &token) {
                response_headers.insert(SET_COOKIE, cookie);
            }
            data["token"] = serde_json::Value::String(token);
        }
        Err(err) => {
            // The account exists; the caller just has to log in explicitly.
            error!("Failed to create session after registration: {err}");
        }
    }

    (
        StatusCode::CREATED,
        response_headers,
        Json(Envelope::data(data).with_message("Registration successful")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::NoopRateLimiter;
    use super::super::signing::UrlSigner;
    use super::super::state::{AuthConfig, AuthState};
    use super::*;
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        let config = AuthConfig::new(
            "https://app.kompaso.dev".to_string(),
            "https://api.kompaso.dev".to_string(),
        );
        Arc::new(AuthState::new(
            config,
            Arc::new(NoopRateLimiter),
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
    async fn register_missing_payload_is_validation_error() {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(RegisterRequest {
                name: "Jane".to_string(),
                email: "jane@x.com".to_string(),
                password: "short".to_string(),
                password_confirmation: "short".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn register_rejects_mismatched_confirmation() {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(RegisterRequest {
                name: "Jane".to_string(),
                email: "jane@x.com".to_string(),
                password: "secret123".to_string(),
                password_confirmation: "secret124".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn register_rejects_invalid_email() {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(RegisterRequest {
                name: "Jane".to_string(),
                email: "not-an-email".to_string(),
                password: "secret123".to_string(),
                password_confirmation: "secret123".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn validate_collects_multiple_fields() {
        let request = RegisterRequest {
            name: String::new(),
            email: "bad".to_string(),
            password: "short".to_string(),
            password_confirmation: "other".to_string(),
        };
        let Err(Failure::Validation(details)) = validate(&request, "bad") else {
            panic!("expected validation failure");
        };
        assert!(details.contains_key("name"));
        assert!(details.contains_key("email"));
        assert_eq!(details["password"].len(), 2);
    }
}
