//! Auth state and configuration shared across handlers.

use std::sync::Arc;

use super::rate_limit::RateLimiter;
use super::signing::UrlSigner;
use super::social::GoogleOauthConfig;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_VERIFICATION_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_RESET_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_OTP_EXPIRY_MINUTES: i64 = 10;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    api_base_url: String,
    session_ttl_seconds: i64,
    verification_ttl_seconds: i64,
    reset_ttl_seconds: i64,
    otp_expiry_minutes: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String, api_base_url: String) -> Self {
        Self {
            frontend_base_url,
            api_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            verification_ttl_seconds: DEFAULT_VERIFICATION_TTL_SECONDS,
            reset_ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
            otp_expiry_minutes: DEFAULT_OTP_EXPIRY_MINUTES,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_expiry_minutes(mut self, minutes: i64) -> Self {
        self.otp_expiry_minutes = minutes;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn verification_ttl_seconds(&self) -> i64 {
        self.verification_ttl_seconds
    }

    pub(crate) fn reset_ttl_seconds(&self) -> i64 {
        self.reset_ttl_seconds
    }

    pub(crate) fn otp_expiry_minutes(&self) -> i64 {
        self.otp_expiry_minutes
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    rate_limiter: Arc<dyn RateLimiter>,
    signer: UrlSigner,
    google: Option<GoogleOauthConfig>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        rate_limiter: Arc<dyn RateLimiter>,
        signer: UrlSigner,
        google: Option<GoogleOauthConfig>,
    ) -> Self {
        Self {
            config,
            rate_limiter,
            signer,
            google,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(crate) fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    pub(crate) fn google(&self) -> Option<&GoogleOauthConfig> {
        self.google.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::NoopRateLimiter;
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new(
            "https://app.kompaso.dev".to_string(),
            "https://api.kompaso.dev".to_string(),
        );

        assert_eq!(config.frontend_base_url(), "https://app.kompaso.dev");
        assert_eq!(config.api_base_url(), "https://api.kompaso.dev");
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(
            config.verification_ttl_seconds(),
            DEFAULT_VERIFICATION_TTL_SECONDS
        );
        assert_eq!(config.reset_ttl_seconds(), DEFAULT_RESET_TTL_SECONDS);
        assert_eq!(config.otp_expiry_minutes(), DEFAULT_OTP_EXPIRY_MINUTES);
        assert!(config.session_cookie_secure());

        let config = config
            .with_session_ttl_seconds(120)
            .with_verification_ttl_seconds(300)
            .with_reset_ttl_seconds(600)
            .with_otp_expiry_minutes(5);

        assert_eq!(config.session_ttl_seconds(), 120);
        assert_eq!(config.verification_ttl_seconds(), 300);
        assert_eq!(config.reset_ttl_seconds(), 600);
        assert_eq!(config.otp_expiry_minutes(), 5);
    }

    #[test]
    fn plain_http_frontend_disables_secure_cookie() {
        let config = AuthConfig::new(
            "http://localhost:5173".to_string(),
            "http://localhost:8080".to_string(),
        );
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn auth_state_constructs_without_google() {
        let config = AuthConfig::new(
            "https://app.kompaso.dev".to_string(),
            "https://api.kompaso.dev".to_string(),
        );
        let state = AuthState::new(
            config,
            Arc::new(NoopRateLimiter),
            UrlSigner::new(SecretString::from("sekreta")),
            None,
        );
        assert!(state.google().is_none());
    }
}
