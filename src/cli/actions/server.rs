use crate::api::{
    self,
    handlers::auth::{signing::UrlSigner, social::GoogleOauthConfig, state::AuthConfig},
};
use anyhow::Result;
use secrecy::SecretString;

/// Validated arguments for the server action.
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_url: String,
    pub api_url: String,
    pub secret: SecretString,
    pub session_ttl_seconds: i64,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<SecretString>,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("dsn", &self.dsn)
            .field("frontend_url", &self.frontend_url)
            .field("api_url", &self.api_url)
            .field("secret", &"***")
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("google_client_id", &self.google_client_id)
            .field("google_client_secret", &"***")
            .finish()
    }
}

/// Handle the server action
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.frontend_url.clone(), args.api_url.clone())
        .with_session_ttl_seconds(args.session_ttl_seconds);

    let signer = UrlSigner::new(args.secret);

    // Social login stays disabled unless both Google credentials are present.
    let google = match (args.google_client_id, args.google_client_secret) {
        (Some(client_id), Some(client_secret)) => Some(GoogleOauthConfig::new(
            client_id,
            client_secret,
            &args.api_url,
        )),
        _ => None,
    };

    api::new(
        args.port,
        args.dsn,
        auth_config,
        signer,
        google,
        api::email::EmailWorkerConfig::new(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_debug_masks_secrets() {
        let args = Args {
            port: 8080,
            dsn: "postgres://localhost/kompaso".to_string(),
            frontend_url: "https://app.kompaso.dev".to_string(),
            api_url: "https://api.kompaso.dev".to_string(),
            secret: SecretString::from("sekreta"),
            session_ttl_seconds: 43200,
            google_client_id: None,
            google_client_secret: Some(SecretString::from("oauth-secret")),
        };
        let debug = format!("{args:?}");
        assert!(debug.contains("***"));
        assert!(!debug.contains("sekreta"));
        assert!(!debug.contains("oauth-secret"));
    }
}
