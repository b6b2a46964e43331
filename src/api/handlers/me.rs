//! Authenticated current-user endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use tracing::error;

use super::auth::session::require_auth;
use super::auth::storage::lookup_user_by_id;
use super::auth::types::UserBody;
use super::envelope::{Envelope, Failure};

#[utoipa::path(
    get,
    path = "/user",
    responses(
        (status = 200, description = "The authenticated user", body = Envelope),
        (status = 401, description = "No active session", body = Envelope),
        (status = 404, description = "User no longer exists", body = Envelope)
    ),
    tag = "user"
)]
pub async fn current_user(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let identity = match require_auth(&headers, &pool).await {
        Ok(identity) => identity,
        Err(failure) => return failure.into_response(),
    };

    match lookup_user_by_id(&pool, identity.record.user_id).await {
        Ok(Some(user)) => Envelope::data(UserBody::from_record(&user).into_data())
            .into_response(StatusCode::OK),
        Ok(None) => Failure::NotFound.into_response(),
        Err(err) => {
            error!("Failed to fetch current user: {err}");
            Failure::Internal.into_response()
        }
    }
}
