//! Email verification endpoints: the signed link and the resend request.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::api::handlers::envelope::{Envelope, Failure};
use crate::api::notify::{self, Notification};

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::require_auth;
use super::signing::email_hash;
use super::state::AuthState;
use super::storage::mark_email_verified;
use super::types::VerifyEmailQuery;

#[utoipa::path(
    get,
    path = "/auth/email/verify/{id}/{hash}",
    params(
        ("id" = String, Path, description = "User id the link was issued for"),
        ("hash" = String, Path, description = "Digest of the email the link was issued for"),
        VerifyEmailQuery
    ),
    responses(
        (status = 200, description = "Email verified", body = Envelope),
        (status = 401, description = "No active session", body = Envelope),
        (status = 403, description = "Signature invalid or expired", body = Envelope),
        (status = 429, description = "Rate limited", body = Envelope)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path((id, hash)): Path<(Uuid, String)>,
    Query(query): Query<VerifyEmailQuery>,
) -> impl IntoResponse {
    let identity = match require_auth(&headers, &pool).await {
        Ok(identity) => identity,
        Err(failure) => return failure.into_response(),
    };

    if auth_state.rate_limiter().check(
        RateLimitAction::VerifyEmail,
        &identity.record.user_id.to_string(),
    ) == RateLimitDecision::Limited
    {
        return Failure::RateLimited.into_response();
    }

    // The link must belong to the session user and to their current email;
    // the signature covers both plus the expiry.
    if id != identity.record.user_id || hash != email_hash(&identity.record.email) {
        return Failure::InvalidSignature.into_response();
    }
    if auth_state
        .signer()
        .verify_verification(id, &hash, query.expires, &query.signature)
        .is_err()
    {
        return Failure::InvalidSignature.into_response();
    }

    match mark_email_verified(&pool, identity.record.user_id).await {
        Ok(true) => {
            Envelope::message("Email verified successfully").into_response(StatusCode::OK)
        }
        // A second click on a valid link is a no-op, never an error.
        Ok(false) => Envelope::message("Email already verified").into_response(StatusCode::OK),
        Err(err) => {
            error!("Failed to mark email verified: {err}");
            Failure::Internal.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/email/verification-notification",
    responses(
        (status = 200, description = "Verification email queued", body = Envelope),
        (status = 401, description = "No active session", body = Envelope),
        (status = 429, description = "Rate limited", body = Envelope)
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let identity = match require_auth(&headers, &pool).await {
        Ok(identity) => identity,
        Err(failure) => return failure.into_response(),
    };

    if auth_state.rate_limiter().check(
        RateLimitAction::ResendVerification,
        &identity.record.user_id.to_string(),
    ) == RateLimitDecision::Limited
    {
        return Failure::RateLimited.into_response();
    }

    if identity.record.email_verified_at.is_some() {
        return Envelope::message("Email already verified").into_response(StatusCode::OK);
    }

    let config = auth_state.config();
    let verify_url = auth_state.signer().build_verify_url(
        config.api_base_url(),
        identity.record.user_id,
        &identity.record.email,
        config.verification_ttl_seconds(),
    );
    let notification = match Notification::verify_email(&identity.record.name, &verify_url) {
        Ok(notification) => notification,
        Err(err) => {
            error!("Failed to build verification notification: {err}");
            return Failure::Internal.into_response();
        }
    };

    let queued = async {
        let mut tx = pool.begin().await?;
        notify::enqueue(&mut tx, &identity.record.email, &notification).await?;
        tx.commit().await?;
        anyhow::Ok(())
    }
    .await;

    match queued {
        Ok(()) => Envelope::message("Verification link sent").into_response(StatusCode::OK),
        Err(err) => {
            error!("Failed to enqueue verification email: {err}");
            Failure::Internal.into_response()
        }
    }
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
    async fn verify_email_requires_session() {
        let response = verify_email(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Path((Uuid::new_v4(), "hash".to_string())),
            Query(VerifyEmailQuery {
                expires: 0,
                signature: "signature".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn resend_verification_requires_session() {
        let response = resend_verification(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
