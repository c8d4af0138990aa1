//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values (`CLIENT_ID` / `CLIENT_SECRET` seed the OAuth credentials)
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (PROFILEGATE__*, override)

use serde::Deserialize;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub oauth: OAuthConfig,
    pub session: SessionConfig,
    pub provider: ProviderConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Listen port (default: 8080)
    pub port: u16,
}

/// OAuth2 provider configuration (Google by default)
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Where the provider sends the user back, must be registered with it
    pub callback_url: String,
    /// Authorities requested on the consent screen (default: ["profile"])
    pub required_scopes: Vec<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Idle lifetime of a session in seconds (default: 1800)
    pub max_age_seconds: u64,
}

impl SessionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }
}

/// Outbound provider call settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Upper bound for any single provider request (default: 10)
    pub request_timeout_seconds: u64,
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (PROFILEGATE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default(
                "oauth.client_id",
                std::env::var("CLIENT_ID").unwrap_or_default(),
            )?
            .set_default(
                "oauth.client_secret",
                std::env::var("CLIENT_SECRET").unwrap_or_default(),
            )?
            .set_default("oauth.callback_url", "http://localhost:8080/callback")?
            .set_default("oauth.required_scopes", vec!["profile"])?
            .set_default(
                "oauth.authorization_endpoint",
                crate::auth::google::AUTHORIZATION_ENDPOINT,
            )?
            .set_default("oauth.token_endpoint", crate::auth::google::TOKEN_ENDPOINT)?
            .set_default(
                "oauth.userinfo_endpoint",
                crate::auth::google::USERINFO_ENDPOINT,
            )?
            .set_default("session.cookie_name", "session")?
            .set_default("session.max_age_seconds", 1800)?
            .set_default("provider.request_timeout_seconds", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("PROFILEGATE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("oauth.required_scopes")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Cookies are marked `Secure` when the provider calls us back over https.
    pub fn should_use_secure_cookies(&self) -> bool {
        url::Url::parse(&self.oauth.callback_url)
            .map(|url| url.scheme() == "https")
            .unwrap_or(false)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if self.oauth.client_id.trim().is_empty() {
            return Err(AppError::Config(
                "oauth.client_id must be set (PROFILEGATE__OAUTH__CLIENT_ID or CLIENT_ID)"
                    .to_string(),
            ));
        }

        if self.oauth.client_secret.trim().is_empty() {
            return Err(AppError::Config(
                "oauth.client_secret must be set (PROFILEGATE__OAUTH__CLIENT_SECRET or CLIENT_SECRET)"
                    .to_string(),
            ));
        }

        if self.oauth.required_scopes.is_empty()
            || self
                .oauth
                .required_scopes
                .iter()
                .any(|scope| scope.trim().is_empty() || scope.contains(' '))
        {
            return Err(AppError::Config(
                "oauth.required_scopes must list at least one non-blank scope".to_string(),
            ));
        }

        for (key, value) in [
            ("oauth.callback_url", &self.oauth.callback_url),
            (
                "oauth.authorization_endpoint",
                &self.oauth.authorization_endpoint,
            ),
            ("oauth.token_endpoint", &self.oauth.token_endpoint),
            ("oauth.userinfo_endpoint", &self.oauth.userinfo_endpoint),
        ] {
            url::Url::parse(value)
                .map_err(|e| AppError::Config(format!("{key} is not a valid URL: {e}")))?;
        }

        if self.session.max_age_seconds == 0 {
            return Err(AppError::Config(
                "session.max_age_seconds must be greater than 0".to_string(),
            ));
        }

        if self.provider.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "provider.request_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        Ok(())
    }
}
