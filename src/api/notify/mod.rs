//! Account notifications.
//!
//! Every outbound email is one of a closed set of variants, validated at
//! construction so malformed payloads never reach the outbox. Enqueueing
//! happens inside the caller's transaction; the outbox worker in
//! [`crate::api::email`] renders and delivers rows asynchronously.

pub mod templates;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::Instrument;

/// Tone of a generic notification; `Urgent` flags the email banner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Info,
    Urgent,
}

impl Severity {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Urgent => "urgent",
        }
    }
}

/// Call-to-action button in a generic notification.
#[derive(Clone, Debug)]
pub struct ActionLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum NotificationError {
    EmptyField(&'static str),
    /// OTP codes are exactly six ASCII digits, zero-padded.
    InvalidOtpCode,
}

impl std::fmt::Display for NotificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "notification field `{field}` must not be empty"),
            Self::InvalidOtpCode => write!(f, "OTP code must be exactly six digits"),
        }
    }
}

impl std::error::Error for NotificationError {}

/// A validated, renderable account notification.
#[derive(Debug)]
pub enum Notification {
    Welcome {
        name: String,
        dashboard_url: String,
    },
    VerifyEmail {
        name: String,
        verify_url: String,
    },
    ForgotPassword {
        name: String,
        reset_url: String,
    },
    Otp {
        code: String,
        expiry_minutes: i64,
        action: Option<String>,
        purpose: Option<String>,
        ip_address: Option<String>,
    },
    Generic {
        severity: Severity,
        title: String,
        message: String,
        description: Option<String>,
        highlight: Option<String>,
        action: Option<ActionLink>,
        data: Vec<(String, String)>,
    },
}

fn require(field: &'static str, value: &str) -> Result<(), NotificationError> {
    if value.trim().is_empty() {
        Err(NotificationError::EmptyField(field))
    } else {
        Ok(())
    }
}

impl Notification {
    pub fn welcome(name: &str, dashboard_url: &str) -> Result<Self, NotificationError> {
        require("name", name)?;
        require("dashboard_url", dashboard_url)?;
        Ok(Self::Welcome {
            name: name.to_string(),
            dashboard_url: dashboard_url.to_string(),
        })
    }

    pub fn verify_email(name: &str, verify_url: &str) -> Result<Self, NotificationError> {
        require("name", name)?;
        require("verify_url", verify_url)?;
        Ok(Self::VerifyEmail {
            name: name.to_string(),
            verify_url: verify_url.to_string(),
        })
    }

    pub fn forgot_password(name: &str, reset_url: &str) -> Result<Self, NotificationError> {
        require("name", name)?;
        require("reset_url", reset_url)?;
        Ok(Self::ForgotPassword {
            name: name.to_string(),
            reset_url: reset_url.to_string(),
        })
    }

    pub fn otp(
        code: &str,
        expiry_minutes: i64,
        action: Option<String>,
        purpose: Option<String>,
        ip_address: Option<String>,
    ) -> Result<Self, NotificationError> {
        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NotificationError::InvalidOtpCode);
        }
        Ok(Self::Otp {
            code: code.to_string(),
            expiry_minutes: if expiry_minutes > 0 { expiry_minutes } else { 10 },
            action,
            purpose,
            ip_address,
        })
    }

    pub fn generic(
        severity: Severity,
        title: &str,
        message: &str,
        description: Option<String>,
        highlight: Option<String>,
        action: Option<ActionLink>,
        data: Vec<(String, String)>,
    ) -> Result<Self, NotificationError> {
        require("title", title)?;
        require("message", message)?;
        if let Some(action) = &action {
            require("action.label", &action.label)?;
            require("action.url", &action.url)?;
        }
        Ok(Self::Generic {
            severity,
            title: title.to_string(),
            message: message.to_string(),
            description,
            highlight,
            action,
            data,
        })
    }

    /// Template name stored on the outbox row.
    #[must_use]
    pub fn template(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::VerifyEmail { .. } => "verify-email",
            Self::ForgotPassword { .. } => "forgot-password",
            Self::Otp { .. } => "otp",
            Self::Generic { .. } => "notification",
        }
    }

    /// Payload stored alongside the template name.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Welcome {
                name,
                dashboard_url,
            } => json!({ "name": name, "dashboard_url": dashboard_url }),
            Self::VerifyEmail { name, verify_url } => {
                json!({ "name": name, "verify_url": verify_url })
            }
            Self::ForgotPassword { name, reset_url } => {
                json!({ "name": name, "reset_url": reset_url })
            }
            Self::Otp {
                code,
                expiry_minutes,
                action,
                purpose,
                ip_address,
            } => json!({
                "code": code,
                "expiry_minutes": expiry_minutes,
                "action": action,
                "purpose": purpose,
                "ip_address": ip_address,
            }),
            Self::Generic {
                severity,
                title,
                message,
                description,
                highlight,
                action,
                data,
            } => json!({
                "severity": severity.as_str(),
                "title": title,
                "message": message,
                "description": description,
                "highlight": highlight,
                "action": action.as_ref().map(|a| json!({ "label": a.label, "url": a.url })),
                "data": data.iter().map(|(k, v)| json!([k, v])).collect::<Vec<_>>(),
            }),
        }
    }
}

/// Enqueue a notification in the caller's transaction.
///
/// The row becomes visible to the outbox worker when the transaction commits,
/// keeping user-state changes and their email atomic.
pub(crate) async fn enqueue(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_email: &str,
    notification: &Notification,
) -> Result<()> {
    let payload_text = serde_json::to_string(&notification.payload())
        .context("failed to serialize notification payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(notification.template())
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_requires_fields() {
        assert_eq!(
            Notification::welcome("", "https://app.kompaso.dev").unwrap_err(),
            NotificationError::EmptyField("name")
        );
        assert_eq!(
            Notification::welcome("Jane", " ").unwrap_err(),
            NotificationError::EmptyField("dashboard_url")
        );
        assert!(Notification::welcome("Jane", "https://app.kompaso.dev").is_ok());
    }

    #[test]
    fn otp_code_must_be_six_digits() {
        assert_eq!(
            Notification::otp("12345", 10, None, None, None).unwrap_err(),
            NotificationError::InvalidOtpCode
        );
        assert_eq!(
            Notification::otp("12345a", 10, None, None, None).unwrap_err(),
            NotificationError::InvalidOtpCode
        );
        assert!(Notification::otp("012345", 10, None, None, None).is_ok());
    }

    #[test]
    fn otp_expiry_defaults_when_nonpositive() {
        let Notification::Otp { expiry_minutes, .. } =
            Notification::otp("123456", 0, None, None, None).expect("otp")
        else {
            panic!("expected otp variant");
        };
        assert_eq!(expiry_minutes, 10);
    }

    #[test]
    fn generic_validates_action_link() {
        let err = Notification::generic(
            Severity::Info,
            "Heads up",
            "Something happened",
            None,
            None,
            Some(ActionLink {
                label: String::new(),
                url: "https://app.kompaso.dev".to_string(),
            }),
            Vec::new(),
        )
        .unwrap_err();
        assert_eq!(err, NotificationError::EmptyField("action.label"));
    }

    #[test]
    fn template_names_are_stable() {
        let welcome = Notification::welcome("Jane", "https://app.kompaso.dev").expect("welcome");
        assert_eq!(welcome.template(), "welcome");
        let otp = Notification::otp("123456", 10, None, None, None).expect("otp");
        assert_eq!(otp.template(), "otp");
    }

    #[test]
    fn payload_carries_variant_fields() {
        let notification = Notification::forgot_password(
            "Jane",
            "https://app.kompaso.dev/reset-password?token=abc&email=jane%40x.com",
        )
        .expect("notification");
        let payload = notification.payload();
        assert_eq!(payload["name"], "Jane");
        assert!(payload["reset_url"]
            .as_str()
            .expect("reset_url")
            .contains("token=abc"));
    }

    #[test]
    fn generic_payload_flags_severity() {
        let notification = Notification::generic(
            Severity::Urgent,
            "Account locked",
            "Too many attempts",
            None,
            None,
            None,
            vec![("attempts".to_string(), "6".to_string())],
        )
        .expect("notification");
        let payload = notification.payload();
        assert_eq!(payload["severity"], "urgent");
        assert_eq!(payload["data"][0][0], "attempts");
    }
}
