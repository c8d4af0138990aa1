//! Session management
//!
//! Server-side sessions keyed by an opaque id carried in a cookie.
//! The default store keeps everything in memory; sessions are lost on restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use rand::RngCore;
use rand::rngs::OsRng;

use super::provider::AccessToken;
use crate::error::AppError;
use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_DESTROYED_TOTAL};

/// Login started on the consent screen but not yet completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    /// CSRF token echoed back by the provider
    pub state: String,
    /// Path and query the user originally asked for
    pub return_to: String,
}

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    /// Set once the code exchange succeeded
    pub token: Option<AccessToken>,
    pub pending: Option<PendingLogin>,
    pub created_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            token: None,
            pending: None,
            created_at: Utc::now(),
        }
    }
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// 32 random bytes, base64url. Used for session ids and CSRF state.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Process-wide session storage.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Create an empty session and return its id.
    async fn create(&self) -> Result<String, AppError>;

    async fn load(&self, id: &str) -> Result<Option<Session>, AppError>;

    async fn save(&self, id: &str, session: Session) -> Result<(), AppError>;

    /// Remove the session. Unknown ids are ignored.
    async fn destroy(&self, id: &str) -> Result<(), AppError>;
}

/// In-memory store with idle expiry.
pub struct MemorySessionStore {
    sessions: Cache<String, Session>,
}

impl MemorySessionStore {
    /// # Arguments
    /// * `max_idle` - Sessions untouched for this long are dropped
    pub fn new(max_idle: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(max_idle)
            .build();

        Self { sessions }
    }

    /// Live sessions, after expired ones have been evicted.
    pub async fn active_sessions(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }

    async fn record_size(&self) {
        SESSIONS_ACTIVE.set(self.active_sessions().await as i64);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self) -> Result<String, AppError> {
        let id = generate_token();
        self.sessions.insert(id.clone(), Session::default()).await;
        self.record_size().await;
        Ok(id)
    }

    async fn load(&self, id: &str) -> Result<Option<Session>, AppError> {
        let session = self.sessions.get(id).await;
        if session.is_none() {
            // A miss may be an idle expiry.
            self.record_size().await;
        }
        Ok(session)
    }

    async fn save(&self, id: &str, session: Session) -> Result<(), AppError> {
        self.sessions.insert(id.to_owned(), session).await;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), AppError> {
        self.sessions.invalidate(id).await;
        self.record_size().await;
        Ok(())
    }
}

/// The current request's session, attached by the session layer.
///
/// Reads and writes go straight to the store. Destroying or
/// regenerating the session is reported back to the session layer,
/// which then expires or replaces the cookie.
#[derive(Clone)]
pub struct SessionHandle {
    id: Arc<Mutex<String>>,
    store: Arc<dyn SessionStore>,
    destroyed: Arc<AtomicBool>,
    regenerated: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn new(id: String, store: Arc<dyn SessionStore>) -> Self {
        Self {
            id: Arc::new(Mutex::new(id)),
            store,
            destroyed: Arc::new(AtomicBool::new(false)),
            regenerated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current session id; changes after [`SessionHandle::regenerate`].
    pub fn id(&self) -> String {
        self.id.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn replace_id(&self, id: String) -> String {
        std::mem::replace(&mut *self.id.lock().unwrap_or_else(|e| e.into_inner()), id)
    }

    /// Current session data; an empty session if it has expired meanwhile.
    pub async fn load(&self) -> Result<Session, AppError> {
        Ok(self.store.load(&self.id()).await?.unwrap_or_default())
    }

    pub async fn save(&self, session: Session) -> Result<(), AppError> {
        self.store.save(&self.id(), session).await
    }

    /// Move `session` to a fresh id and drop the old one.
    ///
    /// Called on privilege change (login) so an id known before
    /// authentication never becomes an authenticated session.
    pub async fn regenerate(&self, session: Session) -> Result<(), AppError> {
        let fresh = self.store.create().await?;
        self.store.save(&fresh, session).await?;

        let previous = self.replace_id(fresh);
        self.store.destroy(&previous).await?;
        self.regenerated.store(true, Ordering::SeqCst);

        tracing::debug!("Session id regenerated");
        Ok(())
    }

    pub async fn destroy(&self) -> Result<(), AppError> {
        self.store.destroy(&self.id()).await?;
        self.destroyed.store(true, Ordering::SeqCst);
        SESSIONS_DESTROYED_TOTAL.inc();
        tracing::debug!("Session destroyed");
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn is_regenerated(&self) -> bool {
        self.regenerated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("session layer is not installed")))
    }
}
