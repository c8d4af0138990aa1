//! OAuth2 provider abstraction
//!
//! Handlers only see [`OAuth2Client`]; the concrete provider is chosen
//! when `AppState` is built.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use axum::async_trait;
use url::Url;

use crate::error::AppError;

/// Profile claims returned by the provider's user-info endpoint.
///
/// Kept as a flat JSON object and echoed verbatim.
pub type UserInfo = serde_json::Map<String, serde_json::Value>;

/// Bearer credential obtained from the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    pub token_type: String,
    /// Authorities granted, which may differ from the ones requested
    pub scopes: Vec<String>,
    pub expires_in: Option<u64>,
    /// Stored as received; nothing refreshes tokens.
    pub refresh_token: Option<String>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            token_type: "Bearer".to_string(),
            scopes: Vec::new(),
            expires_in: None,
            refresh_token: None,
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("scopes", &self.scopes)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Authorization code flow against a single identity provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuth2Client: Send + Sync + 'static {
    /// Consent screen URL carrying client id, redirect URI, scopes and `state`.
    fn authorize_url(&self, state: &str) -> Url;

    /// Trade an authorization code for an access token.
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, AppError>;

    /// Fetch the profile of the user the token belongs to.
    async fn user_info(&self, token: &AccessToken) -> Result<UserInfo, AppError>;
}

/// Bound a provider call; hitting the limit yields [`AppError::ProviderTimeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| AppError::ProviderTimeout)?
}
