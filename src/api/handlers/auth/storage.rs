//! Database helpers for users, sessions, and reset tokens.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{generate_session_token, hash_session_token, is_unique_violation};

/// Outcome when attempting to create a new user.
#[derive(Debug)]
pub(crate) enum InsertUserOutcome {
    Created(Uuid),
    /// The email unique constraint rejected the insert.
    Conflict,
}

/// A user row as the handlers see it.
#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub(crate) user_id: Uuid,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) role: String,
    pub(crate) email_verified_at: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
}

/// Data resolved from a valid session token.
#[derive(Debug, Clone)]
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) role: String,
    pub(crate) email_verified_at: Option<DateTime<Utc>>,
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, email_verified_at, created_at";

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        user_id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        email_verified_at: row.get("email_verified_at"),
        created_at: row.get("created_at"),
    }
}

/// Insert a new user inside the caller's transaction.
///
/// Races on the same email are resolved by the unique constraint; the loser
/// sees `Conflict` instead of an error.
pub(crate) async fn insert_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    name: &str,
    email: &str,
    password_hash: &str,
    verified: bool,
) -> Result<InsertUserOutcome> {
    let query = r"
        INSERT INTO users (name, email, password_hash, email_verified_at)
        VALUES ($1, $2, $3, CASE WHEN $4 THEN NOW() ELSE NULL END)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(verified)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(InsertUserOutcome::Created(row.get("id"))),
        Err(err) if is_unique_violation(&err) => Ok(InsertUserOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

pub(crate) async fn lookup_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(crate) async fn lookup_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Create a session for the user and return the raw token for the cookie.
pub(crate) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw value
    // so the caller can set the session cookie.
    let query = r"
        INSERT INTO user_sessions (user_id, session_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    // Only accept unexpired sessions joined to their user.
    let query = r"
        SELECT users.id, users.name, users.email, users.role, users.email_verified_at
        FROM user_sessions
        JOIN users ON users.id = user_sessions.user_id
        WHERE user_sessions.session_hash = $1
          AND user_sessions.expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    // Record activity for audit/visibility without extending the session TTL.
    let query = r"
        UPDATE user_sessions
        SET last_seen_at = NOW()
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(Some(SessionRecord {
        user_id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: row.get("role"),
        email_verified_at: row.get("email_verified_at"),
    }))
}

pub(crate) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

/// Revoke every session the user holds (password reset).
pub(crate) async fn delete_sessions_for_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<()> {
    let query = "DELETE FROM user_sessions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to delete user sessions")?;
    Ok(())
}

/// Stamp the verification timestamp once.
///
/// Returns `true` when this call stamped it, `false` when it was already set.
pub(crate) async fn mark_email_verified(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let query = r"
        UPDATE users
        SET email_verified_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
          AND email_verified_at IS NULL
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to mark email verified")?;
    Ok(row.is_some())
}

/// Record the digest of an issued reset token for single-use enforcement.
pub(crate) async fn insert_reset_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(ttl_seconds)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert password reset token")?;
    Ok(())
}

/// Consume a reset token if it is still valid; `false` when unknown, expired,
/// or already used.
pub(crate) async fn consume_reset_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token_hash: &[u8],
    user_id: Uuid,
) -> Result<bool> {
    let query = r"
        UPDATE password_reset_tokens
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND user_id = $2
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume reset token")?;
    Ok(row.is_some())
}

pub(crate) async fn update_password(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update password")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{InsertUserOutcome, SessionRecord, UserRecord};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn insert_user_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", InsertUserOutcome::Created(Uuid::nil())),
            format!("Created({:?})", Uuid::nil())
        );
        assert_eq!(format!("{:?}", InsertUserOutcome::Conflict), "Conflict");
    }

    #[test]
    fn records_hold_values() {
        let now = Utc::now();
        let user = UserRecord {
            user_id: Uuid::nil(),
            name: "Jane".to_string(),
            email: "jane@x.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            role: "member".to_string(),
            email_verified_at: None,
            created_at: now,
        };
        assert_eq!(user.email, "jane@x.com");
        assert!(user.email_verified_at.is_none());

        let session = SessionRecord {
            user_id: Uuid::nil(),
            name: "Jane".to_string(),
            email: "jane@x.com".to_string(),
            role: "member".to_string(),
            email_verified_at: Some(now),
        };
        assert_eq!(session.role, "member");
    }
}
