//! HMAC-signed tokens and verification links.
//!
//! Reset tokens and email verification links embed their expiry and are
//! signed with HMAC-SHA256 under the application secret. Verification
//! recomputes the signature and compares it in constant time
//! (`Mac::verify_slice`), so the tokens validate without any stored state;
//! the reset flow additionally stores a digest of the issued token to
//! enforce single use.

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const RESET_PURPOSE: &str = "reset";
const VERIFY_PURPOSE: &str = "verify";

#[derive(Debug, PartialEq, Eq)]
pub enum SignatureError {
    /// Token or link structure could not be parsed.
    Malformed,
    /// Signature did not match the recomputed value.
    Mismatch,
    /// Signature was valid but the embedded expiry has passed.
    Expired,
}

/// Claims recovered from a valid reset token.
#[derive(Debug)]
pub struct ResetClaims {
    pub user_id: Uuid,
    pub expires_at_unix: i64,
}

pub struct UrlSigner {
    key: SecretString,
}

impl UrlSigner {
    #[must_use]
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length, so new_from_slice cannot fail here.
        HmacSha256::new_from_slice(self.key.expose_secret().as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"))
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    fn verify(&self, payload: &str, signature: &str) -> Result<(), SignatureError> {
        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature.as_bytes())
            .map_err(|_| SignatureError::Malformed)?;
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature_bytes)
            .map_err(|_| SignatureError::Mismatch)
    }

    /// Issue a password reset token bound to a user and email, expiring after
    /// `ttl_seconds`.
    pub fn issue_reset_token(&self, user_id: Uuid, email: &str, ttl_seconds: i64) -> Result<String> {
        let expires = Utc::now().timestamp() + ttl_seconds;
        let mut nonce = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut nonce)
            .context("failed to generate reset token nonce")?;
        let payload = reset_payload(
            user_id,
            email,
            expires,
            &URL_SAFE_NO_PAD.encode(nonce),
        );
        let signature = self.sign(&payload);
        Ok(format!("{payload}.{signature}"))
    }

    /// Verify a reset token against the presented email and the clock.
    pub fn verify_reset_token(
        &self,
        token: &str,
        email: &str,
    ) -> Result<ResetClaims, SignatureError> {
        // payload = purpose.user_id.email_b64.expires.nonce, then the signature.
        let (payload, signature) = token.rsplit_once('.').ok_or(SignatureError::Malformed)?;
        let parts: Vec<&str> = payload.split('.').collect();
        let [purpose, user_id, email_b64, expires, _nonce] = parts.as_slice() else {
            return Err(SignatureError::Malformed);
        };
        if *purpose != RESET_PURPOSE {
            return Err(SignatureError::Malformed);
        }

        self.verify(payload, signature)?;

        let token_email = URL_SAFE_NO_PAD
            .decode(email_b64.as_bytes())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(SignatureError::Malformed)?;
        if token_email != email {
            return Err(SignatureError::Mismatch);
        }

        let expires_at_unix: i64 = expires.parse().map_err(|_| SignatureError::Malformed)?;
        if expires_at_unix <= Utc::now().timestamp() {
            return Err(SignatureError::Expired);
        }

        let user_id = Uuid::parse_str(user_id).map_err(|_| SignatureError::Malformed)?;
        Ok(ResetClaims {
            user_id,
            expires_at_unix,
        })
    }

    /// Signature for an email verification link.
    #[must_use]
    pub fn sign_verification(&self, user_id: Uuid, email_hash: &str, expires: i64) -> String {
        self.sign(&verify_payload(user_id, email_hash, expires))
    }

    /// Verify a presented verification link signature and its expiry.
    pub fn verify_verification(
        &self,
        user_id: Uuid,
        email_hash: &str,
        expires: i64,
        signature: &str,
    ) -> Result<(), SignatureError> {
        self.verify(&verify_payload(user_id, email_hash, expires), signature)?;
        if expires <= Utc::now().timestamp() {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }

    /// Build the absolute signed verification URL included in emails.
    #[must_use]
    pub fn build_verify_url(
        &self,
        api_base_url: &str,
        user_id: Uuid,
        email: &str,
        ttl_seconds: i64,
    ) -> String {
        let base = api_base_url.trim_end_matches('/');
        let expires = Utc::now().timestamp() + ttl_seconds;
        let hash = email_hash(email);
        let signature = self.sign_verification(user_id, &hash, expires);
        format!("{base}/auth/email/verify/{user_id}/{hash}?expires={expires}&signature={signature}")
    }
}

fn reset_payload(user_id: Uuid, email: &str, expires: i64, nonce: &str) -> String {
    let email_b64 = URL_SAFE_NO_PAD.encode(email.as_bytes());
    format!("{RESET_PURPOSE}.{user_id}.{email_b64}.{expires}.{nonce}")
}

fn verify_payload(user_id: Uuid, email_hash: &str, expires: i64) -> String {
    format!("{VERIFY_PURPOSE}.{user_id}.{email_hash}.{expires}")
}

/// URL-safe digest of an email address used as the verification link hash.
#[must_use]
pub fn email_hash(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Digest of a full token for at-rest storage (single-use enforcement).
pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
