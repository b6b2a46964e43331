//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use super::storage::{SessionRecord, UserRecord};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub password_confirmation: Option<String>,
}

/// Query half of the signed verification link.
#[derive(IntoParams, Deserialize, Debug)]
pub struct VerifyEmailQuery {
    pub expires: i64,
    pub signature: String,
}

#[derive(IntoParams, Deserialize, Debug)]
pub struct SocialCallbackQuery {
    pub code: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// Serializable user shape returned under `data.user`.
#[derive(ToSchema, Serialize, Debug)]
pub struct UserBody {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub permissions: Vec<&'static str>,
    pub email_verified_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl UserBody {
    pub(crate) fn from_record(record: &UserRecord) -> Self {
        Self {
            id: record.user_id.to_string(),
            name: record.name.clone(),
            email: record.email.clone(),
            role: record.role.clone(),
            permissions: role_permissions(&record.role),
            email_verified_at: record.email_verified_at.map(|at| at.to_rfc3339()),
            created_at: Some(record.created_at.to_rfc3339()),
        }
    }

    pub(crate) fn from_session(record: &SessionRecord) -> Self {
        Self {
            id: record.user_id.to_string(),
            name: record.name.clone(),
            email: record.email.clone(),
            role: record.role.clone(),
            permissions: role_permissions(&record.role),
            email_verified_at: record.email_verified_at.map(|at| at.to_rfc3339()),
            created_at: None,
        }
    }

    pub(crate) fn into_data(self) -> Value {
        serde_json::json!({ "user": self })
    }
}

/// Permission set derived from a role; unknown roles get the member set.
pub(crate) fn role_permissions(role: &str) -> Vec<&'static str> {
    match role {
        "admin" => vec![
            "profile.read",
            "profile.update",
            "users.read",
            "users.manage",
        ],
        _ => vec!["profile.read", "profile.update"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn register_request_round_trips() -> Result<()> {
        let request = RegisterRequest {
            name: "Jane".to_string(),
            email: "jane@x.com".to_string(),
            password: "secret123".to_string(),
            password_confirmation: "secret123".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let decoded: RegisterRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.email, "jane@x.com");
        Ok(())
    }

    #[test]
    fn reset_request_confirmation_is_optional() -> Result<()> {
        let decoded: ResetPasswordRequest = serde_json::from_value(serde_json::json!({
            "token": "token",
            "email": "jane@x.com",
            "password": "secret123",
        }))?;
        assert!(decoded.password_confirmation.is_none());
        Ok(())
    }

    #[test]
    fn user_body_serializes_verification_state() -> Result<()> {
        let record = UserRecord {
            user_id: Uuid::nil(),
            name: "Jane".to_string(),
            email: "jane@x.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            role: "member".to_string(),
            email_verified_at: None,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(UserBody::from_record(&record))?;
        assert_eq!(value["email"], "jane@x.com");
        assert_eq!(value["email_verified_at"], Value::Null);
        assert!(value.get("password_hash").is_none());
        Ok(())
    }

    #[test]
    fn user_data_nests_under_user_key() {
        let record = SessionRecord {
            user_id: Uuid::nil(),
            name: "Jane".to_string(),
            email: "jane@x.com".to_string(),
            role: "member".to_string(),
            email_verified_at: Some(Utc::now()),
        };
        let data = UserBody::from_session(&record).into_data();
        assert_eq!(data["user"]["email"], "jane@x.com");
    }

    #[test]
    fn role_permissions_fall_back_to_member() {
        assert_eq!(
            role_permissions("unknown"),
            vec!["profile.read", "profile.update"]
        );
        assert!(role_permissions("admin").contains(&"users.manage"));
    }
}
