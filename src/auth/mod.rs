//! Google OAuth2 authentication
//!
//! Handles:
//! - Server-side sessions behind a cookie
//! - The authorization code flow (consent redirect, callback)
//! - Authentication middleware for protected routes

pub mod google;
mod middleware;
mod oauth;
pub mod provider;
pub mod session;

pub use google::GoogleClient;
pub use middleware::{Authenticated, require_auth, session_layer};
pub use oauth::{CALLBACK_PATH, auth_router};
pub use provider::{AccessToken, OAuth2Client, UserInfo, with_timeout};
pub use session::{MemorySessionStore, Session, SessionHandle, SessionStore};
