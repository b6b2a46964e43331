//! Social login passthrough (Google OAuth).
//!
//! The redirect endpoint hands the frontend a provider authorization URL;
//! the callback exchanges the returned code for a profile, matches or
//! creates a local user by email, and establishes a session. Provider and
//! transport errors are logged in full and reduced to a generic failure for
//! the client.

use axum::{
    extract::{Extension, FromRequestParts, OptionalFromRequestParts, Path, Query},
    http::{header::SET_COOKIE, request::Parts, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::handlers::envelope::{Envelope, Failure};
use crate::api::notify::{self, Notification};
use crate::APP_USER_AGENT;

use super::password::hash_password;
use super::session::{require_guest, session_cookie};
use super::state::AuthState;
use super::storage::{
    insert_session, insert_user, lookup_user_by_email, InsertUserOutcome, UserRecord,
};
use super::types::{SocialCallbackQuery, UserBody};
use super::utils::{generate_random_password, normalize_email, valid_email};

const VALID_PROVIDERS: &[&str] = &["google"];

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Clone)]
pub struct GoogleOauthConfig {
    client_id: String,
    client_secret: SecretString,
    redirect_url: String,
}

impl GoogleOauthConfig {
    #[must_use]
    pub fn new(client_id: String, client_secret: SecretString, api_base_url: &str) -> Self {
        let base = api_base_url.trim_end_matches('/');
        Self {
            client_id,
            client_secret,
            redirect_url: format!("{base}/auth/social/google/callback"),
        }
    }

    pub(crate) fn authorize_url(&self) -> Result<String, url::ParseError> {
        let url = url::Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
            ],
        )?;
        Ok(url.into())
    }
}

impl std::fmt::Debug for GoogleOauthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleOauthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("redirect_url", &self.redirect_url)
            .finish()
    }
}

/// Optional query extractor that preserves the pre-axum-0.8 behavior of
/// `Option<Query<T>>`: a missing or malformed query string yields `None`
/// rather than rejecting the request. Axum 0.8 removed the
/// `OptionalFromRequestParts` impl for `Query`, so it is restored locally to
/// keep the callback's error handling identical to the other handlers'
/// `Option<Json<...>>` extractors.
pub(crate) struct OptionalQuery(SocialCallbackQuery);

impl<S> OptionalFromRequestParts<S> for OptionalQuery
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(Query::<SocialCallbackQuery>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|Query(query)| OptionalQuery(query)))
    }
}

/// Profile fields returned by the provider userinfo endpoint.
#[derive(Debug, Deserialize)]
struct ProviderProfile {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[utoipa::path(
    get,
    path = "/auth/social/{provider}",
    params(
        ("provider" = String, Path, description = "Social provider, currently only google")
    ),
    responses(
        (status = 200, description = "Provider authorization URL", body = Envelope),
        (status = 400, description = "Unknown provider", body = Envelope),
        (status = 403, description = "Already authenticated", body = Envelope)
    ),
    tag = "auth"
)]
pub async fn social_redirect(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(provider): Path<String>,
) -> impl IntoResponse {
    if let Err(failure) = require_guest(&headers, &pool).await {
        return failure.into_response();
    }

    if !VALID_PROVIDERS.contains(&provider.as_str()) {
        return Failure::InvalidProvider.into_response();
    }

    let Some(google) = auth_state.google() else {
        error!("Social login requested but Google OAuth is not configured");
        return Failure::SocialAuth(provider).into_response();
    };

    match google.authorize_url() {
        Ok(redirect_url) => Envelope::data(serde_json::json!({ "redirect_url": redirect_url }))
            .into_response(StatusCode::OK),
        Err(err) => {
            error!("Failed to build authorization URL: {err}");
            Failure::SocialAuth(provider).into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth/social/{provider}/callback",
    params(
        ("provider" = String, Path, description = "Social provider, currently only google"),
        SocialCallbackQuery
    ),
    responses(
        (status = 200, description = "Social login successful", body = Envelope),
        (status = 400, description = "Unknown provider", body = Envelope),
        (status = 403, description = "Already authenticated", body = Envelope),
        (status = 500, description = "Provider exchange failed", body = Envelope)
    ),
    tag = "auth"
)]
pub async fn social_callback(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(provider): Path<String>,
    query: Option<OptionalQuery>,
) -> impl IntoResponse {
    if let Err(failure) = require_guest(&headers, &pool).await {
        return failure.into_response();
    }

    if !VALID_PROVIDERS.contains(&provider.as_str()) {
        return Failure::InvalidProvider.into_response();
    }

    let Some(OptionalQuery(query)) = query else {
        return Failure::SocialAuth(provider).into_response();
    };

    let Some(google) = auth_state.google() else {
        error!("Social callback received but Google OAuth is not configured");
        return Failure::SocialAuth(provider).into_response();
    };

    let profile = match fetch_profile(google, &query.code).await {
        Ok(profile) => profile,
        Err(err) => {
            error!("Social login error: {err}");
            return Failure::SocialAuth(provider).into_response();
        }
    };

    let email = normalize_email(profile.email.as_deref().unwrap_or_default());
    if !valid_email(&email) {
        error!("Social login returned an unusable email for provider {provider}");
        return Failure::SocialAuth(provider).into_response();
    }
    let name = profile
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or("User").to_string());

    let user = match find_or_create_user(&pool, &auth_state, &name, &email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Social login error: {err}");
            return Failure::SocialAuth(provider).into_response();
        }
    };

    let config = auth_state.config();
    let token = match insert_session(&pool, user.user_id, config.session_ttl_seconds()).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session after social login: {err}");
            return Failure::SocialAuth(provider).into_response();
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
        Json(Envelope::data(data).with_message("Social login successful")),
    )
        .into_response()
}

/// Exchange the authorization code and fetch the provider profile.
async fn fetch_profile(google: &GoogleOauthConfig, code: &str) -> anyhow::Result<ProviderProfile> {
    let client = reqwest::Client::builder()
        .user_agent(APP_USER_AGENT)
        .build()?;

    let token_response: serde_json::Value = client
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", google.client_id.as_str()),
            ("client_secret", google.client_secret.expose_secret()),
            ("redirect_uri", google.redirect_url.as_str()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let access_token = token_response["access_token"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("provider token response missing access_token"))?;

    let profile: ProviderProfile = client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(profile)
}

/// Match a local account by email, creating a pre-verified one if absent.
async fn find_or_create_user(
    pool: &PgPool,
    auth_state: &AuthState,
    name: &str,
    email: &str,
) -> anyhow::Result<UserRecord> {
    if let Some(user) = lookup_user_by_email(pool, email).await? {
        return Ok(user);
    }

    // The provider vouched for the email, so the account starts verified
    // with a password nobody knows.
    let password_hash = hash_password(&generate_random_password()?)?;
    let mut tx = pool.begin().await?;
    let created = insert_user(&mut tx, name, email, &password_hash, true).await?;
    match created {
        InsertUserOutcome::Created(_) => {
            let config = auth_state.config();
            let dashboard_url = format!(
                "{}/dashboard",
                config.frontend_base_url().trim_end_matches('/')
            );
            let welcome = Notification::welcome(name, &dashboard_url)?;
            notify::enqueue(&mut tx, email, &welcome).await?;
            tx.commit().await?;
        }
        InsertUserOutcome::Conflict => {
            // Lost a race with a concurrent callback for the same account.
            let _ = tx.rollback().await;
        }
    }

    lookup_user_by_email(pool, email)
        .await?
        .ok_or_else(|| anyhow::anyhow!("user disappeared after social create"))
}
