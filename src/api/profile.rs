//! Protected profile resource

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::{any, get},
};

use crate::AppState;
use crate::auth::{Authenticated, SessionHandle, UserInfo, require_auth, with_timeout};
use crate::error::AppError;
use crate::metrics::USERINFO_REQUESTS_TOTAL;

/// Create protected router
///
/// Routes:
/// - GET /protected/me
/// - any other /protected path: 404 once authenticated
///
/// Every route here sits behind `require_auth`, so unauthenticated
/// requests anywhere under `/protected` go to the consent screen.
pub fn protected_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/protected/me", get(me))
        .route("/protected", any(not_found))
        .route("/protected/*rest", any(not_found))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// GET /protected/me
///
/// Echoes the provider's user-info document. A failed lookup means the
/// token is no good any more (revoked, expired, or the provider is
/// unreachable): the session is destroyed so the next request starts a
/// fresh login, and the failure is returned.
async fn me(
    State(state): State<AppState>,
    session: SessionHandle,
    Authenticated(token): Authenticated,
) -> Result<Json<UserInfo>, AppError> {
    let lookup = with_timeout(
        state.config.provider.request_timeout(),
        state.oauth.user_info(&token),
    )
    .await;

    match lookup {
        Ok(info) => {
            USERINFO_REQUESTS_TOTAL.with_label_values(&["ok"]).inc();
            Ok(Json(info))
        }
        Err(error) => {
            USERINFO_REQUESTS_TOTAL.with_label_values(&["failed"]).inc();
            tracing::warn!(%error, "User info lookup failed, destroying session");
            session.destroy().await?;
            Err(error)
        }
    }
}
