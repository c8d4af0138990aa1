//! Google OAuth2 client
//!
//! Implements the authorization code flow against Google's endpoints
//! (or any endpoints configured in their place).

use axum::async_trait;
use axum::http::StatusCode;
use serde::Deserialize;
use url::Url;

use super::provider::{AccessToken, OAuth2Client, UserInfo};
use crate::config::OAuthConfig;
use crate::error::AppError;
use crate::metrics::PROVIDER_REQUEST_DURATION_SECONDS;

pub const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

pub struct GoogleClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    authorization_endpoint: Url,
    token_endpoint: Url,
    userinfo_endpoint: Url,
}

impl GoogleClient {
    pub fn new(oauth: &OAuthConfig, http: reqwest::Client) -> Result<Self, AppError> {
        let parse = |key: &str, value: &str| {
            Url::parse(value).map_err(|e| AppError::Config(format!("{key}: {e}")))
        };

        Ok(Self {
            http,
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone(),
            redirect_uri: oauth.callback_url.clone(),
            scopes: oauth.required_scopes.clone(),
            authorization_endpoint: parse(
                "oauth.authorization_endpoint",
                &oauth.authorization_endpoint,
            )?,
            token_endpoint: parse("oauth.token_endpoint", &oauth.token_endpoint)?,
            userinfo_endpoint: parse("oauth.userinfo_endpoint", &oauth.userinfo_endpoint)?,
        })
    }
}

/// Successful token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Space separated
    #[serde(default)]
    scope: Option<String>,
}

/// RFC 6749 error body
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorResponse {
    fn describe(body: &str) -> String {
        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(ErrorResponse {
                error,
                error_description: Some(description),
            }) => format!("{error}: {description}"),
            Ok(ErrorResponse { error, .. }) => error,
            Err(_) => body.chars().take(200).collect(),
        }
    }
}

fn request_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::ProviderTimeout
    } else {
        AppError::HttpClient(e)
    }
}

#[async_trait]
impl OAuth2Client for GoogleClient {
    fn authorize_url(&self, state: &str) -> Url {
        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state);
        url
    }

    async fn exchange_code(&self, code: &str) -> Result<AccessToken, AppError> {
        let _timer = PROVIDER_REQUEST_DURATION_SECONDS
            .with_label_values(&["exchange_code"])
            .start_timer();

        let response = self
            .http
            .post(self.token_endpoint.clone())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            return Err(AppError::ProviderExchange(ErrorResponse::describe(&body)));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::ProviderExchange(format!("unreadable token response: {e}"))
        })?;

        let scopes = token
            .scope
            .as_deref()
            .map(|scope| scope.split_whitespace().map(ToOwned::to_owned).collect())
            .unwrap_or_else(|| self.scopes.clone());

        let mut access = AccessToken::new(token.access_token).with_scopes(scopes);
        if let Some(token_type) = token.token_type {
            access.token_type = token_type;
        }
        access.expires_in = token.expires_in;
        access.refresh_token = token.refresh_token;

        Ok(access)
    }

    async fn user_info(&self, token: &AccessToken) -> Result<UserInfo, AppError> {
        let _timer = PROVIDER_REQUEST_DURATION_SECONDS
            .with_label_values(&["user_info"])
            .start_timer();

        let response = self
            .http
            .get(self.userinfo_endpoint.clone())
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;

        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::TokenRejected(ErrorResponse::describe(&body)));
            }
            s => {
                return Err(AppError::Provider(format!(
                    "user info request failed with {s}: {}",
                    ErrorResponse::describe(&body)
                )));
            }
        }

        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(serde_json::Value::Object(info)) => Ok(info),
            Ok(_) => Err(AppError::Provider(
                "user info is not a JSON object".to_string(),
            )),
            Err(e) => Err(AppError::Provider(format!("unreadable user info: {e}"))),
        }
    }
}
