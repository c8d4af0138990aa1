//! OAuth2 callback and logout
//!
//! Completes the authorization code flow started by `require_auth`.

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;

use super::provider::with_timeout;
use super::session::SessionHandle;
use crate::AppState;
use crate::error::AppError;
use crate::metrics::{CODE_EXCHANGE_FAILURES_TOTAL, LOGINS_COMPLETED_TOTAL};

pub const CALLBACK_PATH: &str = "/callback";

/// Create authentication router
///
/// Routes:
/// - GET /callback - OAuth callback
/// - GET|POST /logout - Logout
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route(CALLBACK_PATH, get(callback))
        .route("/logout", get(logout).post(logout))
}

/// Query parameters the provider appends to the callback URL
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code
    code: Option<String>,
    /// CSRF state token
    state: Option<String>,
    /// Set instead of `code` when the user or provider refused
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /callback
///
/// # Steps
/// 1. Consume the pending login recorded by the auth gate
/// 2. Verify CSRF state
/// 3. Exchange code for access token
/// 4. Store the token under a regenerated session id
/// 5. Redirect to the originally requested path
async fn callback(
    State(state): State<AppState>,
    session: SessionHandle,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    let mut current = session.load().await?;

    // A pending login is single use, whatever the outcome.
    let pending = current.pending.take().ok_or_else(|| {
        AppError::Validation("no login in progress for this session".to_string())
    })?;
    session.save(current.clone()).await?;

    if query.state.as_deref() != Some(pending.state.as_str()) {
        tracing::warn!("OAuth callback state mismatch");
        return Err(AppError::Validation("state mismatch".to_string()));
    }

    if let Some(error) = query.error {
        CODE_EXCHANGE_FAILURES_TOTAL.inc();
        let message = match query.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        tracing::warn!(error = %message, "Provider declined authorization");
        return Err(AppError::ProviderExchange(message));
    }

    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Validation("missing authorization code".to_string()))?;

    let token = match with_timeout(
        state.config.provider.request_timeout(),
        state.oauth.exchange_code(&code),
    )
    .await
    {
        Ok(token) => token,
        Err(error) => {
            CODE_EXCHANGE_FAILURES_TOTAL.inc();
            tracing::warn!(%error, "Authorization code exchange failed");
            return Err(error);
        }
    };

    tracing::info!(scopes = ?token.scopes, "Login completed");
    LOGINS_COMPLETED_TOTAL.inc();

    current.token = Some(token);
    session.regenerate(current).await?;

    Ok((StatusCode::FOUND, [(LOCATION, pending.return_to)]).into_response())
}

/// GET|POST /logout
///
/// Destroys the session and sends the user to the index.
async fn logout(session: SessionHandle) -> Result<Redirect, AppError> {
    session.destroy().await?;
    Ok(Redirect::to("/"))
}
