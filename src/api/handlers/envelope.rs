//! JSON response envelope shared by every handler.
//!
//! Success and failure responses use one shape:
//! `{ data?, message?, error?: { message, code, details? }, status }`.
//! Validation and auth failures are safe to surface verbatim; provider and
//! transport failures must be reduced to a generic message before they reach
//! this type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Field name to error messages, ordered for stable output.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<FieldErrors>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Envelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub status: &'static str,
}

impl Envelope {
    #[must_use]
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            message: None,
            error: None,
            status: "success",
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            data: None,
            message: Some(message.into()),
            error: None,
            status: "success",
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn into_response(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Error taxonomy mapped onto HTTP statuses and stable machine codes.
#[derive(Debug)]
pub enum Failure {
    /// 422 with field-level messages.
    Validation(FieldErrors),
    /// 422, the email unique constraint rejected an insert.
    DuplicateEmail,
    /// 422, reset token failed signature, expiry, or single-use checks.
    InvalidOrExpiredToken,
    /// 401, no resolvable session.
    Unauthenticated,
    /// 401, login mismatch with no field leak.
    InvalidCredentials,
    /// 403, guest-only route called with a live session.
    AlreadyAuthenticated,
    /// 403, signed URL failed verification.
    InvalidSignature,
    /// 429.
    RateLimited,
    /// 400, social provider is not on the allow-list.
    InvalidProvider,
    /// 404.
    NotFound,
    /// 500, provider detail stays in the server log.
    SocialAuth(String),
    /// 500, generic.
    Internal,
}

impl Failure {
    /// Validation failure for a single field.
    #[must_use]
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::Validation(errors)
    }

    /// Validation failure for a request that arrived with no payload.
    #[must_use]
    pub fn missing_fields(fields: &[&str]) -> Self {
        let mut errors = FieldErrors::new();
        for field in fields {
            errors.insert(
                (*field).to_string(),
                vec![format!("The {field} field is required.")],
            );
        }
        Self::Validation(errors)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::DuplicateEmail | Self::InvalidOrExpiredToken => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Unauthenticated | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::AlreadyAuthenticated | Self::InvalidSignature => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidProvider => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::SocialAuth(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicateEmail => "DUPLICATE_EMAIL",
            Self::InvalidOrExpiredToken => "INVALID_OR_EXPIRED_TOKEN",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AlreadyAuthenticated => "ALREADY_AUTHENTICATED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::RateLimited => "RATE_LIMITED",
            Self::InvalidProvider => "INVALID_PROVIDER",
            Self::NotFound => "NOT_FOUND",
            Self::SocialAuth(_) => "SOCIAL_AUTH_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation(_) => "The given data was invalid.".to_string(),
            Self::DuplicateEmail => "The email has already been taken.".to_string(),
            Self::InvalidOrExpiredToken => {
                "This password reset token is invalid or has expired.".to_string()
            }
            Self::Unauthenticated => "Unauthenticated.".to_string(),
            Self::InvalidCredentials => {
                "These credentials do not match our records.".to_string()
            }
            Self::AlreadyAuthenticated => "Already authenticated.".to_string(),
            Self::InvalidSignature => "Invalid signature.".to_string(),
            Self::RateLimited => "Too many attempts. Please try again later.".to_string(),
            Self::InvalidProvider => "Invalid social provider".to_string(),
            Self::NotFound => "Not found.".to_string(),
            Self::SocialAuth(provider) => format!("Failed to authenticate with {provider}"),
            Self::Internal => "Something went wrong.".to_string(),
        }
    }

    fn details(self) -> Option<FieldErrors> {
        match self {
            Self::Validation(details) => Some(details),
            Self::DuplicateEmail => {
                let mut details = FieldErrors::new();
                details.insert(
                    "email".to_string(),
                    vec!["The email has already been taken.".to_string()],
                );
                Some(details)
            }
            _ => None,
        }
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        let code = self.code().to_string();
        let envelope = Envelope {
            data: None,
            message: None,
            error: Some(ErrorBody {
                message,
                code,
                details: self.details(),
            }),
            status: "error",
        };
        (status, Json(envelope)).into_response()
    }
}

/// Collect field validation errors; `None` when every rule passed.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Finish validation, returning the accumulated failure if any.
    pub fn finish(self) -> Result<(), Failure> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Failure::Validation(self.errors))
        }
    }
}
