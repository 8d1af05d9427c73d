//! # Session state
//!
//! The session lifecycle is a tagged union rather than a nullable user plus a
//! loading flag, so "loading but signed in" and similar impossible states
//! cannot be expressed:
//!
//! ```text
//! Uninitialized -> Checking -> Authenticated | Anonymous
//! Authenticated -> Refreshing -> Authenticated | Anonymous
//! Authenticated -> (logout) -> Anonymous
//! ```
//!
//! Auth events from the backend (sign-in, sign-out, token refreshed, user
//! updated) jump straight to the matching state. There is no terminal state.

use std::time::Duration;

use crate::models::{Session, User};

/// A live session together with the user derived from it.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthSession {
    pub session: Session,
    pub user: User,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Checking,
    Authenticated(AuthSession),
    /// A background refresh is in flight; the previous session stays usable.
    Refreshing(AuthSession),
    Anonymous,
}

impl SessionState {
    /// Still waiting for the first answer from the backend.
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Uninitialized | SessionState::Checking)
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|u| u.is_admin())
    }

    pub fn auth(&self) -> Option<&AuthSession> {
        match self {
            SessionState::Authenticated(auth) | SessionState::Refreshing(auth) => Some(auth),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.auth().map(|a| &a.user)
    }

    pub fn session(&self) -> Option<&Session> {
        self.auth().map(|a| &a.session)
    }

    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Checking => "checking",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Refreshing(_) => "refreshing",
            SessionState::Anonymous => "anonymous",
        }
    }
}

/// How long to wait before refreshing a session that expires at
/// `expires_at` (unix seconds), refreshing `buffer` early.
///
/// Returns zero when the session is already inside the buffer.
pub fn refresh_delay(expires_at: i64, now: i64, buffer: Duration) -> Duration {
    let fire_at = expires_at.saturating_sub(buffer.as_secs() as i64);
    if fire_at <= now {
        Duration::ZERO
    } else {
        Duration::from_secs((fire_at - now) as u64)
    }
}
