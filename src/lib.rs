//! Profilegate - OAuth2 (Google) login in front of session-protected routes
//!
//! # Architecture
//!
//! ```text
//! request
//!    │
//!    ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Router (Axum) + TraceLayer                                 │
//! └─────────────────────────────────────────────────────────────┘
//!    │
//! ┌─────────────────────────────────────────────────────────────┐
//! │  session_layer: cookie -> SessionHandle (SessionStore)      │
//! └─────────────────────────────────────────────────────────────┘
//!    │                                  │
//! ┌────────────────────────────┐   ┌───────────────────────────┐
//! │ require_auth (/protected)  │   │ /, /callback, /logout     │
//! │  no token -> consent page  │   │                           │
//! └────────────────────────────┘   └───────────────────────────┘
//!    │
//! ┌─────────────────────────────────────────────────────────────┐
//! │  /protected/me -> OAuth2Client::user_info -> JSON           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: index, protected profile and metrics handlers
//! - `auth`: sessions, OAuth2 provider client, middleware, callback
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// The session store and the OAuth2 client are trait objects so tests
/// can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Server-side sessions (volatile)
    pub sessions: Arc<dyn auth::SessionStore>,

    /// OAuth2 provider client
    pub oauth: Arc<dyn auth::OAuth2Client>,
}

impl AppState {
    /// Initialize application state with the in-memory session store
    /// and the Google client.
    ///
    /// # Errors
    /// Returns error if the HTTP client or provider endpoints cannot be set up
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("Profilegate/", env!("CARGO_PKG_VERSION")))
            .timeout(config.provider.request_timeout())
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let oauth = auth::GoogleClient::new(&config.oauth, http_client)?;
        let sessions = auth::MemorySessionStore::new(config.session.max_age());

        tracing::info!(
            scopes = ?config.oauth.required_scopes,
            callback_url = %config.oauth.callback_url,
            "OAuth2 client initialized"
        );

        Ok(Self::with_collaborators(
            config,
            Arc::new(sessions),
            Arc::new(oauth),
        ))
    }

    /// Assemble state from explicit collaborators.
    pub fn with_collaborators(
        config: config::AppConfig,
        sessions: Arc<dyn auth::SessionStore>,
        oauth: Arc<dyn auth::OAuth2Client>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
            oauth,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware, routing::get};
    use tower_http::trace::TraceLayer;

    let session_routes = Router::new()
        .route("/", get(api::index))
        .merge(api::protected_router(state.clone()))
        .merge(auth::auth_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_layer,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(session_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
