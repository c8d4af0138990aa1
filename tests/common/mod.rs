//! Common test utilities for E2E tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::async_trait;
use profilegate::auth::{
    AccessToken, GoogleClient, MemorySessionStore, OAuth2Client, SessionStore, UserInfo,
};
use profilegate::error::AppError;
use profilegate::{AppState, config};
use tokio::net::TcpListener;
use url::Url;

pub const CLIENT_ID: &str = "test-client-id.apps.googleusercontent.com";
pub const CALLBACK_URL: &str = "http://localhost:8080/callback";

/// Scripted stand-in for Google.
///
/// Consent URLs come from a real `GoogleClient`; codes, tokens and
/// profiles are whatever the test grants.
pub struct FakeProvider {
    urls: GoogleClient,
    codes: Mutex<HashMap<String, String>>,
    profiles: Mutex<HashMap<String, UserInfo>>,
    delay: Mutex<Option<Duration>>,
    pub exchanges: AtomicUsize,
    pub lookups: AtomicUsize,
}

impl FakeProvider {
    pub fn new(config: &config::AppConfig) -> Self {
        Self {
            urls: GoogleClient::new(&config.oauth, reqwest::Client::new()).unwrap(),
            codes: Mutex::new(HashMap::new()),
            profiles: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            exchanges: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Make `code` exchangeable for `token`, whose owner has `profile`.
    pub fn grant(&self, code: &str, token: &str, profile: serde_json::Value) {
        let serde_json::Value::Object(profile) = profile else {
            panic!("profile must be a JSON object");
        };
        self.codes
            .lock()
            .unwrap()
            .insert(code.to_string(), token.to_string());
        self.profiles
            .lock()
            .unwrap()
            .insert(token.to_string(), profile);
    }

    pub fn revoke(&self, token: &str) {
        self.profiles.lock().unwrap().remove(token);
    }

    /// Delay every provider call by `delay`.
    pub fn stall(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn wait(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl OAuth2Client for FakeProvider {
    fn authorize_url(&self, state: &str) -> Url {
        self.urls.authorize_url(state)
    }

    async fn exchange_code(&self, code: &str) -> Result<AccessToken, AppError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        self.wait().await;

        let token = self.codes.lock().unwrap().remove(code);
        token
            .map(|secret| AccessToken::new(secret).with_scopes(["profile"]))
            .ok_or_else(|| AppError::ProviderExchange("invalid_grant".to_string()))
    }

    async fn user_info(&self, token: &AccessToken) -> Result<UserInfo, AppError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.wait().await;

        let profile = self.profiles.lock().unwrap().get(token.secret()).cloned();
        profile.ok_or_else(|| AppError::TokenRejected("invalid_token".to_string()))
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub provider: Arc<FakeProvider>,
    /// Does not follow redirects
    pub client: reqwest::Client,
}

pub fn test_config() -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        oauth: config::OAuthConfig {
            client_id: CLIENT_ID.to_string(),
            client_secret: "test-client-secret".to_string(),
            callback_url: CALLBACK_URL.to_string(),
            required_scopes: vec!["profile".to_string()],
            authorization_endpoint: profilegate::auth::google::AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: profilegate::auth::google::TOKEN_ENDPOINT.to_string(),
            userinfo_endpoint: profilegate::auth::google::USERINFO_ENDPOINT.to_string(),
        },
        session: config::SessionConfig {
            cookie_name: "session".to_string(),
            max_age_seconds: 600,
        },
        provider: config::ProviderConfig {
            request_timeout_seconds: 5,
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: config::AppConfig) -> Self {
        let provider = Arc::new(FakeProvider::new(&config));
        let sessions: Arc<dyn SessionStore> =
            Arc::new(MemorySessionStore::new(config.session.max_age()));
        let state = AppState::with_collaborators(config, sessions, provider.clone());

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = profilegate::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            provider,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }
        request.send().await.unwrap()
    }

    /// Run the whole consent round trip for a granted `code`.
    ///
    /// Returns the authenticated session cookie (`session=...`) issued by
    /// the callback, which differs from the pre-login one.
    pub async fn login(&self, code: &str) -> String {
        let redirect = self.get("/protected/me", None).await;
        assert_eq!(redirect.status(), 302);
        let cookie = session_cookie(&redirect).expect("session cookie issued");
        let state = query_param(&location(&redirect), "state").expect("state in consent url");

        let callback = self
            .get(
                &format!("/callback?code={code}&state={state}"),
                Some(&cookie),
            )
            .await;
        assert_eq!(callback.status(), 302, "callback should redirect back");

        let authenticated = session_cookie(&callback).expect("session cookie after login");
        assert_ne!(authenticated, cookie, "login must issue a new session id");
        authenticated
    }
}

pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

pub fn query_param(url: &str, key: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// `name=value` of the session cookie set by `response`, if any.
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| raw.split(';').next())
        .find(|pair| pair.starts_with("session="))
        .map(ToString::to_string)
}
