//! Password reset flow: request a link, then complete the reset.
//!
//! The request step answers identically whether or not the email exists so
//! the endpoint cannot be used to enumerate accounts.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::handlers::envelope::{Envelope, Failure, Validator};
use crate::api::notify::{self, Notification};

use super::password::hash_password;
use super::session::require_guest;
use super::signing::hash_token;
use super::state::AuthState;
use super::storage::{
    consume_reset_token, delete_sessions_for_user, insert_reset_token, lookup_user_by_email,
    update_password,
};
use super::types::{ForgotPasswordRequest, ResetPasswordRequest};
use super::utils::{normalize_email, valid_email};

const RESET_SENT_MESSAGE: &str = "Password reset link sent to your email";

/// Frontend URL the reset email points at.
fn build_reset_url(frontend_base_url: &str, token: &str, email: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("token", token)
        .append_pair("email", email)
        .finish();
    format!("{base}/reset-password?{query}")
}

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link queued if the account exists", body = Envelope),
        (status = 403, description = "Already authenticated", body = Envelope),
        (status = 422, description = "Validation error", body = Envelope)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let request: ForgotPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return Failure::missing_fields(&["email"]).into_response();
        }
    };

    if let Err(failure) = require_guest(&headers, &pool).await {
        return failure.into_response();
    }

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Failure::field("email", "The email must be a valid email address.")
            .into_response();
    }

    // From here on every outcome answers with the same success envelope; an
    // attacker learns nothing from the response about whether the account
    // exists or the token was issued.
    match issue_reset(&pool, &auth_state, &email).await {
        Ok(()) => {}
        Err(err) => error!("Failed to issue password reset: {err}"),
    }

    Envelope::message(RESET_SENT_MESSAGE).into_response(StatusCode::OK)
}

async fn issue_reset(pool: &PgPool, auth_state: &AuthState, email: &str) -> anyhow::Result<()> {
    let Some(user) = lookup_user_by_email(pool, email).await? else {
        return Ok(());
    };

    let config = auth_state.config();
    let token =
        auth_state
            .signer()
            .issue_reset_token(user.user_id, email, config.reset_ttl_seconds())?;
    let reset_url = build_reset_url(config.frontend_base_url(), &token, email);
    let notification = Notification::forgot_password(&user.name, &reset_url)?;

    let mut tx = pool.begin().await?;
    insert_reset_token(
        &mut tx,
        user.user_id,
        &hash_token(&token),
        config.reset_ttl_seconds(),
    )
    .await?;
    notify::enqueue(&mut tx, email, &notification).await?;
    tx.commit().await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = Envelope),
        (status = 403, description = "Already authenticated", body = Envelope),
        (status = 422, description = "Invalid token or validation error", body = Envelope)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return Failure::missing_fields(&["token", "email", "password"]).into_response();
        }
    };

    if let Err(failure) = require_guest(&headers, &pool).await {
        return failure.into_response();
    }

    let email = normalize_email(&request.email);
    let mut validator = Validator::new();
    if request.token.trim().is_empty() {
        validator.reject("token", "The token field is required.");
    }
    if !valid_email(&email) {
        validator.reject("email", "The email must be a valid email address.");
    }
    if request.password.len() < 8 {
        validator.reject("password", "The password must be at least 8 characters.");
    }
    if let Some(confirmation) = &request.password_confirmation {
        if confirmation != &request.password {
            validator.reject("password", "The password confirmation does not match.");
        }
    }
    if let Err(failure) = validator.finish() {
        return failure.into_response();
    }

    // Signature and embedded expiry are checked before any storage work.
    let claims = match auth_state
        .signer()
        .verify_reset_token(request.token.trim(), &email)
    {
        Ok(claims) => claims,
        Err(_) => return Failure::InvalidOrExpiredToken.into_response(),
    };

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return Failure::Internal.into_response();
        }
    };

    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to start reset transaction: {err}");
            return Failure::Internal.into_response();
        }
    };

    // The stored digest enforces single use; a replayed token fails here
    // even though its signature still verifies.
    match consume_reset_token(&mut tx, &hash_token(request.token.trim()), claims.user_id).await {
        Ok(true) => {}
        Ok(false) => {
            let _ = tx.rollback().await;
            return Failure::InvalidOrExpiredToken.into_response();
        }
        Err(err) => {
            error!("Failed to consume reset token: {err}");
            let _ = tx.rollback().await;
            return Failure::Internal.into_response();
        }
    }

    if let Err(err) = update_password(&mut tx, claims.user_id, &password_hash).await {
        error!("Failed to update password: {err}");
        let _ = tx.rollback().await;
        return Failure::Internal.into_response();
    }

    // Changing the password logs the user out everywhere.
    if let Err(err) = delete_sessions_for_user(&mut tx, claims.user_id).await {
        error!("Failed to revoke sessions after reset: {err}");
        let _ = tx.rollback().await;
        return Failure::Internal.into_response();
    }

    if let Err(err) = tx.commit().await {
        error!("Failed to commit reset transaction: {err}");
        return Failure::Internal.into_response();
    }

    Envelope::message("Password reset successfully").into_response(StatusCode::OK)
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

    #[test]
    fn reset_url_encodes_email() {
        let url = build_reset_url("https://app.kompaso.dev/", "tok.en", "jane@x.com");
        assert_eq!(
            url,
            "https://app.kompaso.dev/reset-password?token=tok.en&email=jane%40x.com"
        );
    }

    #[tokio::test]
    async fn forgot_password_rejects_invalid_email_format() {
        let response = forgot_password(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(ForgotPasswordRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn reset_password_rejects_forged_token_before_storage() {
        // A token signed under a different key fails the signature check, so
        // the handler answers 422 without ever touching the database.
        let forged = UrlSigner::new(SecretString::from("other-secret"))
            .issue_reset_token(uuid::Uuid::new_v4(), "jane@x.com", 3600)
            .expect("token");
        let response = reset_password(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(ResetPasswordRequest {
                token: forged,
                email: "jane@x.com".to_string(),
                password: "secret123".to_string(),
                password_confirmation: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn reset_password_rejects_short_password() {
        let response = reset_password(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(ResetPasswordRequest {
                token: "token".to_string(),
                email: "jane@x.com".to_string(),
                password: "short".to_string(),
                password_confirmation: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
