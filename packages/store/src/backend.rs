//! The auth seam between the session controller and the hosted backend.
//!
//! [`AuthBackend`] is implemented by `api::Backend` over HTTP and by an
//! in-memory fake in this crate's tests.

use std::future::Future;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::BackendError;
use crate::models::{Identity, Profile, ProfileUpdate, Session};

/// Session-level notifications emitted by the backend client.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    UserUpdated(Identity),
}

/// Input of a sign-up.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Result of a sign-up. The session is absent when the project requires
/// email confirmation before the first sign-in.
#[derive(Clone, Debug, PartialEq)]
pub struct SignUpOutcome {
    pub identity: Identity,
    pub session: Option<Session>,
}

/// Async interface to the hosted auth service and the `profiles` table.
pub trait AuthBackend {
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Session, BackendError>>;

    fn sign_up(
        &self,
        request: &RegisterRequest,
    ) -> impl Future<Output = Result<SignUpOutcome, BackendError>>;

    fn sign_out(&self, session: &Session) -> impl Future<Output = Result<(), BackendError>>;

    /// Session restored from persisted storage, if any.
    fn get_session(&self) -> impl Future<Output = Result<Option<Session>, BackendError>>;

    fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<Session, BackendError>>;

    /// Validate an access token against the auth service.
    fn get_user(&self, access_token: &str) -> impl Future<Output = Result<Identity, BackendError>>;

    fn fetch_profile(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<Option<Profile>, BackendError>>;

    /// Insert or merge a profile row. `session` is absent right after a
    /// sign-up that still needs email confirmation.
    fn upsert_profile(
        &self,
        session: Option<&Session>,
        profile: &Profile,
    ) -> impl Future<Output = Result<Profile, BackendError>>;

    fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> impl Future<Output = Result<Profile, BackendError>>;

    fn reset_password_for_email(&self, email: &str)
        -> impl Future<Output = Result<(), BackendError>>;

    fn update_password(
        &self,
        session: &Session,
        password: &str,
    ) -> impl Future<Output = Result<Identity, BackendError>>;

    fn resend_confirmation(&self, email: &str) -> impl Future<Output = Result<(), BackendError>>;

    /// Forget the persisted session without contacting the server.
    fn clear_stored_session(&self);

    /// Subscribe to session events.
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;
}
