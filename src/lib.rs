//! # Kompaso (Authentication & Account Email Backend)
//!
//! `kompaso` is the authentication backend for the Kompaso frontend. It
//! handles password-based registration and login, cookie/bearer sessions,
//! password reset, email verification, Google social login, and queued
//! account email (welcome, verification, reset, OTP, generic notices).
//!
//! ## Sessions
//!
//! Sessions are opaque random tokens delivered as an `HttpOnly` cookie and
//! accepted as a bearer token. The database stores only the token's SHA-256
//! digest. Every handler resolves the caller's identity explicitly from the
//! request; there is no ambient auth state.
//!
//! ## Email
//!
//! Account email goes through a transactional outbox: handlers enqueue a
//! notification row in the same transaction as the state change, and a
//! background worker renders and delivers it with retries. Delivery failures
//! never surface to the request that queued them.
//!
//! ## Signed links
//!
//! Password reset tokens and email verification links are HMAC-SHA256 signed
//! with an embedded expiry and verified by recomputing the signature in
//! constant time.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
