//! Session and authentication middleware
//!
//! `session_layer` attaches a [`SessionHandle`] to every request.
//! `require_auth` guards protected routes and starts the login flow.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, StatusCode, header::LOCATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use super::provider::AccessToken;
use super::session::{PendingLogin, SessionHandle, generate_token};
use crate::AppState;
use crate::error::AppError;
use crate::metrics::LOGINS_STARTED_TOTAL;

fn session_cookie(state: &AppState, id: &str) -> Cookie<'static> {
    let max_age = time::Duration::seconds(state.config.session.max_age_seconds as i64);

    Cookie::build((state.config.session.cookie_name.clone(), id.to_owned()))
        .http_only(true)
        .secure(state.config.should_use_secure_cookies())
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

fn removal_cookie(state: &AppState) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), ""))
        .path("/")
        .build()
}

/// Middleware that resolves the session cookie
///
/// Loads the session named by the cookie or creates a fresh one, and
/// inserts a [`SessionHandle`] into the request extensions. Live
/// sessions get their cookie re-issued on every response so its
/// `Max-Age` slides along with the store's idle expiry; destroyed ones
/// get the cookie expired.
pub async fn session_layer(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let cookie_name = &state.config.session.cookie_name;

    let existing = match jar.get(cookie_name) {
        Some(cookie) => state
            .sessions
            .load(cookie.value())
            .await?
            .map(|_| cookie.value().to_owned()),
        None => None,
    };

    let id = match existing {
        Some(id) => id,
        None => {
            tracing::debug!("Issuing new session");
            state.sessions.create().await?
        }
    };

    let handle = SessionHandle::new(id, state.sessions.clone());
    request.extensions_mut().insert(handle.clone());

    let response = next.run(request).await;

    if handle.is_destroyed() {
        return Ok((jar.remove(removal_cookie(&state)), response).into_response());
    }

    Ok((jar.add(session_cookie(&state, &handle.id())), response).into_response())
}

/// Middleware to require an authenticated session
///
/// Sessions holding an access token pass through with an
/// [`Authenticated`] extension. Anything else is sent to the provider's
/// consent screen, remembering where the user wanted to go.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/protected/me", get(me))
///     .route_layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    session: SessionHandle,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let mut current = session.load().await?;

    if let Some(token) = current.token.clone() {
        request.extensions_mut().insert(Authenticated(token));
        return Ok(next.run(request).await);
    }

    let return_to = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_string());

    let csrf_state = generate_token();
    let authorize_url = state.oauth.authorize_url(&csrf_state);

    current.pending = Some(PendingLogin {
        state: csrf_state,
        return_to,
    });
    session.save(current).await?;

    LOGINS_STARTED_TOTAL.inc();
    tracing::info!(path = %request.uri().path(), "Redirecting to provider consent screen");

    Ok((StatusCode::FOUND, [(LOCATION, authorize_url.to_string())]).into_response())
}

/// Extractor for the access token of an authenticated request
///
/// Only present behind [`require_auth`].
#[derive(Debug, Clone)]
pub struct Authenticated(pub AccessToken);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Authenticated>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::provider::{AccessToken, MockOAuth2Client, UserInfo};
    use crate::auth::session::{MemorySessionStore, SessionStore};
    use crate::config::{
        AppConfig, LoggingConfig, OAuthConfig, ProviderConfig, ServerConfig, SessionConfig,
    };

    fn test_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            oauth: OAuthConfig {
                client_id: "test-client-id".to_string(),
                client_secret: "test-client-secret".to_string(),
                callback_url: "http://localhost:8080/callback".to_string(),
                required_scopes: vec!["profile".to_string()],
                authorization_endpoint: crate::auth::google::AUTHORIZATION_ENDPOINT.to_string(),
                token_endpoint: crate::auth::google::TOKEN_ENDPOINT.to_string(),
                userinfo_endpoint: crate::auth::google::USERINFO_ENDPOINT.to_string(),
            },
            session: SessionConfig {
                cookie_name: "session".to_string(),
                max_age_seconds: 600,
            },
            provider: ProviderConfig {
                request_timeout_seconds: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    async fn authenticated_session(store: &Arc<dyn SessionStore>) -> String {
        let id = store.create().await.unwrap();
        let mut session = store.load(&id).await.unwrap().unwrap();
        session.token = Some(AccessToken::new("valid-token"));
        store.save(&id, session).await.unwrap();
        id
    }

    fn app(mock: MockOAuth2Client, store: Arc<dyn SessionStore>) -> axum::Router {
        let state = AppState::with_collaborators(test_config(), store, Arc::new(mock));
        crate::build_router(state)
    }

    #[tokio::test]
    async fn unauthenticated_request_redirects_and_sets_cookie() {
        let mut mock = MockOAuth2Client::new();
        mock.expect_authorize_url().times(1).returning(|state| {
            url::Url::parse(&format!("https://accounts.google.com/auth?state={state}")).unwrap()
        });
        mock.expect_user_info().never();

        let store: Arc<dyn SessionStore> =
            Arc::new(MemorySessionStore::new(Duration::from_secs(600)));
        let response = app(mock, store)
            .oneshot(
                Request::builder()
                    .uri("/protected/me?x=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://accounts.google.com/auth?state="));

        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("session="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
    }

    #[tokio::test]
    async fn redirect_remembers_original_path() {
        let mut mock = MockOAuth2Client::new();
        mock.expect_authorize_url()
            .returning(|_| url::Url::parse("https://accounts.google.com/auth").unwrap());

        let store: Arc<dyn SessionStore> =
            Arc::new(MemorySessionStore::new(Duration::from_secs(600)));
        let id = store.create().await.unwrap();

        let response = app(mock, store.clone())
            .oneshot(
                Request::builder()
                    .uri("/protected/me?x=1")
                    .header(COOKIE, format!("session={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let session = store.load(&id).await.unwrap().unwrap();
        let pending = session.pending.expect("pending login recorded");
        assert_eq!(pending.return_to, "/protected/me?x=1");
        assert!(!pending.state.is_empty());
    }

    #[tokio::test]
    async fn authenticated_request_echoes_user_info() {
        let mut mock = MockOAuth2Client::new();
        mock.expect_authorize_url().never();
        mock.expect_user_info()
            .withf(|token| token.secret() == "valid-token")
            .times(1)
            .returning(|_| {
                let mut info = UserInfo::new();
                info.insert("email".to_string(), "a@b.com".into());
                Ok(info)
            });

        let store: Arc<dyn SessionStore> =
            Arc::new(MemorySessionStore::new(Duration::from_secs(600)));
        let id = authenticated_session(&store).await;

        let response = app(mock, store)
            .oneshot(
                Request::builder()
                    .uri("/protected/me")
                    .header(COOKIE, format!("session={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with(&format!("session={id};")));
        assert!(set_cookie.contains("Max-Age=600"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"email":"a@b.com"}"#);
    }

    #[tokio::test]
    async fn user_info_failure_destroys_session() {
        let mut mock = MockOAuth2Client::new();
        mock.expect_user_info()
            .times(1)
            .returning(|_| Err(AppError::TokenRejected("invalid_token".to_string())));

        let store: Arc<dyn SessionStore> =
            Arc::new(MemorySessionStore::new(Duration::from_secs(600)));
        let id = authenticated_session(&store).await;

        let response = app(mock, store.clone())
            .oneshot(
                Request::builder()
                    .uri("/protected/me")
                    .header(COOKIE, format!("session={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(store.load(&id).await.unwrap().is_none());

        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("session=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn unknown_cookie_gets_fresh_session() {
        let mut mock = MockOAuth2Client::new();
        mock.expect_authorize_url()
            .returning(|_| url::Url::parse("https://accounts.google.com/auth").unwrap());

        let store: Arc<dyn SessionStore> =
            Arc::new(MemorySessionStore::new(Duration::from_secs(600)));
        let response = app(mock, store)
            .oneshot(
                Request::builder()
                    .uri("/protected/me")
                    .header(COOKIE, "session=forged")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("session="));
        assert!(!set_cookie.starts_with("session=forged"));
    }
}
