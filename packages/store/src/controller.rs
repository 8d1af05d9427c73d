//! # Session controller
//!
//! [`SessionController`] is the only writer of the current [`SessionState`].
//! Everything else in the application gets a read-only
//! [`watch::Receiver`] from [`SessionController::subscribe`].
//!
//! ## Operations
//!
//! | Method | Effect |
//! |--------|--------|
//! | [`initialize`](SessionController::initialize) | Restore a persisted session (`Checking` → `Authenticated`/`Anonymous`). Never leaves the state loading. |
//! | [`login`](SessionController::login) | Password sign-in plus best-effort profile merge. |
//! | [`logout`](SessionController::logout) | Remote sign-out, local clear, signed-out hook. Safe when already signed out. |
//! | [`register`](SessionController::register) | Sign-up plus best-effort profile upsert. |
//! | [`refresh_user`](SessionController::refresh_user) / [`update_profile`](SessionController::update_profile) | Re-read or write the profile row and merge it into the user. |
//! | [`refresh_session`](SessionController::refresh_session) | Re-issue the tokens, retrying once on transport failure. |
//! | [`revalidate`](SessionController::revalidate) | Check the access token is still accepted (tab refocus, polling). |
//! | [`expire_session`](SessionController::expire_session) | Drop a session whose token an API call just refused. |
//! | [`apply_event`](SessionController::apply_event) | Jump to the state an [`AuthEvent`] describes. |
//!
//! ## Long-running tasks
//!
//! [`run_refresh_loop`](SessionController::run_refresh_loop),
//! [`run_recheck_loop`](SessionController::run_recheck_loop) and
//! [`run_event_loop`](SessionController::run_event_loop) never return on their
//! own. The owner spawns them and cancels them on teardown by dropping the
//! future.
//!
//! ## Ordering
//!
//! Every session write bumps an epoch. Work that awaits the backend records
//! the epoch first and drops its result if another write happened meanwhile,
//! so the latest event always wins over an older in-flight refresh.

use std::cell::Cell;
use std::pin::pin;
use std::time::Duration;

use futures::future::{select, Either};
use tokio::sync::{broadcast, watch};

use crate::backend::{AuthBackend, AuthEvent, RegisterRequest};
use crate::config::SessionConfig;
use crate::error::{AuthError, BackendError};
use crate::models::{Profile, ProfileUpdate, Session, User};
use crate::session::{refresh_delay, AuthSession, SessionState};
use crate::time;

/// Smallest gap between two scheduled refreshes, for sessions whose lifetime
/// is shorter than the refresh buffer.
const MIN_REFRESH_GAP: Duration = Duration::from_secs(10);

pub struct SessionController<B> {
    backend: B,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    epoch: Cell<u64>,
    signing_in: Cell<bool>,
    clock: Box<dyn Fn() -> i64>,
    on_signed_out: Option<Box<dyn Fn()>>,
}

impl<B: AuthBackend> SessionController<B> {
    pub fn new(backend: B, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            backend,
            config,
            state,
            epoch: Cell::new(0),
            signing_in: Cell::new(false),
            clock: Box::new(time::now_secs),
            on_signed_out: None,
        }
    }

    /// Replace the unix-seconds clock used for expiry checks.
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Hook run after an explicit logout, typically a navigation to the
    /// login screen.
    pub fn on_signed_out(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_signed_out = Some(Box::new(hook));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Read-only view of the session state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    /// Access token of the current session, for bearer headers.
    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().session().map(|s| s.access_token.clone())
    }

    fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    fn current_auth(&self) -> Option<AuthSession> {
        self.state.borrow().auth().cloned()
    }

    fn write(&self, next: SessionState) {
        self.epoch.set(self.epoch.get() + 1);
        let previous = self.state.send_replace(next);
        tracing::debug!(
            from = previous.label(),
            to = self.state.borrow().label(),
            "session state changed"
        );
    }

    /// Change the user in place without touching the session, so an
    /// in-flight refresh is not invalidated.
    fn update_user(&self, user_id: &str, f: impl FnOnce(&mut User)) {
        self.state.send_if_modified(|state| match state {
            SessionState::Authenticated(auth) | SessionState::Refreshing(auth)
                if auth.user.id == user_id =>
            {
                let before = auth.user.clone();
                f(&mut auth.user);
                auth.user != before
            }
            _ => false,
        });
    }

    /// Build the user for a session, merging the profile row if it can be
    /// read. Profile failures are logged and tolerated.
    async fn attach_profile(&self, session: Session) -> AuthSession {
        let profile = match self.backend.fetch_profile(&session).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(user_id = %session.user.id, "Failed to load profile: {e}");
                None
            }
        };
        let user = User::from_identity(&session.user).with_profile(profile.as_ref());
        AuthSession { session, user }
    }

    /// Restore the persisted session. Any failure ends in `Anonymous`.
    pub async fn initialize(&self) {
        self.write(SessionState::Checking);
        let epoch = self.epoch();

        let next = match self.restore().await {
            Ok(Some(auth)) => SessionState::Authenticated(auth),
            Ok(None) => SessionState::Anonymous,
            Err(e) => {
                tracing::warn!("Session check failed, continuing signed out: {e}");
                SessionState::Anonymous
            }
        };

        if self.epoch() == epoch {
            self.write(next);
        } else {
            tracing::debug!("initial session check superseded by a newer event");
        }
    }

    async fn restore(&self) -> Result<Option<AuthSession>, BackendError> {
        let Some(session) = self.backend.get_session().await? else {
            return Ok(None);
        };
        let session = if session.is_expired_at((self.clock)()) {
            tracing::debug!("stored session expired, refreshing");
            self.backend.refresh_session(&session.refresh_token).await?
        } else {
            session
        };
        Ok(Some(self.attach_profile(session).await))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        // The backend announces the new session before the profile is
        // merged; the event loop leaves it to us.
        let _signing_in = SigningIn::enter(&self.signing_in);
        let session = self
            .backend
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| {
                tracing::warn!("Sign-in failed: {e}");
                AuthError::classify(&e)
            })?;

        let auth = self.attach_profile(session).await;
        let user = auth.user.clone();
        tracing::info!(user_id = %user.id, "signed in");
        self.write(SessionState::Authenticated(auth));
        Ok(user)
    }

    /// Sign out remotely and locally. Remote failures are tolerated: the
    /// local session is cleared regardless.
    pub async fn logout(&self) {
        let session = self.state.borrow().session().cloned();
        let Some(session) = session else {
            tracing::debug!("logout without a session");
            if !matches!(*self.state.borrow(), SessionState::Anonymous) {
                self.write(SessionState::Anonymous);
            }
            return;
        };

        if let Err(e) = self.backend.sign_out(&session).await {
            tracing::warn!("Remote sign-out failed: {e}");
        }
        tracing::info!(user_id = %session.user.id, "signed out");
        self.write(SessionState::Anonymous);

        if let Some(hook) = &self.on_signed_out {
            hook();
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<User, AuthError> {
        if request.email.trim().is_empty() || request.password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let outcome = self.backend.sign_up(&request).await.map_err(|e| {
            tracing::warn!("Sign-up failed: {e}");
            AuthError::classify(&e)
        })?;

        let profile = Profile {
            id: outcome.identity.id.clone(),
            email: outcome.identity.email.clone(),
            full_name: Some(request.full_name.trim().to_string()).filter(|n| !n.is_empty()),
            phone: request.phone.clone().filter(|p| !p.trim().is_empty()),
            ..Default::default()
        };
        let stored = match self
            .backend
            .upsert_profile(outcome.session.as_ref(), &profile)
            .await
        {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::warn!(user_id = %profile.id, "Failed to create profile: {e}");
                None
            }
        };

        let user = User::from_identity(&outcome.identity).with_profile(stored.as_ref());
        tracing::info!(user_id = %user.id, confirmed = outcome.session.is_some(), "registered");
        if let Some(session) = outcome.session {
            self.write(SessionState::Authenticated(AuthSession {
                session,
                user: user.clone(),
            }));
        }
        Ok(user)
    }

    /// End the session after an API call answered 401. Takes effect
    /// immediately, so a redirect issued right after sees `Anonymous`. The
    /// stored copy is dropped; the server is not contacted and the
    /// signed-out hook does not run.
    pub fn expire_session(&self) {
        let Some(session) = self.state.borrow().session().cloned() else {
            return;
        };
        tracing::warn!(user_id = %session.user.id, "access token refused, ending session");
        self.backend.clear_stored_session();
        self.write(SessionState::Anonymous);
    }

    /// Re-read the profile row. Returns `None` when signed out.
    pub async fn refresh_user(&self) -> Result<Option<User>, AuthError> {
        let Some(auth) = self.current_auth() else {
            return Ok(None);
        };
        let profile = self.backend.fetch_profile(&auth.session).await?;
        let user = User::from_identity(&auth.session.user).with_profile(profile.as_ref());
        let merged = user.clone();
        self.update_user(&auth.user.id, move |u| *u = merged);
        Ok(Some(user))
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User, AuthError> {
        let auth = self.current_auth().ok_or(AuthError::NotAuthenticated)?;
        let profile = self.backend.update_profile(&auth.session, &update).await?;
        let user = auth.user.with_profile(Some(&profile));
        let merged = user.clone();
        self.update_user(&user.id, move |u| *u = merged);
        Ok(user)
    }

    /// Re-issue the session.
    ///
    /// A transport failure is retried once after the configured backoff; if
    /// that also fails the stale session stays in place. A rejected refresh
    /// token ends the session.
    pub async fn refresh_session(&self) -> Result<(), AuthError> {
        let Some(auth) = self.current_auth() else {
            return Ok(());
        };
        self.write(SessionState::Refreshing(auth.clone()));
        let epoch = self.epoch();

        let mut result = self
            .backend
            .refresh_session(&auth.session.refresh_token)
            .await;
        if let Err(e) = &result {
            if !e.is_rejection() {
                tracing::warn!("Session refresh failed, retrying: {e}");
                time::sleep(self.config.retry_backoff()).await;
                if self.epoch() != epoch {
                    return Ok(());
                }
                result = self
                    .backend
                    .refresh_session(&auth.session.refresh_token)
                    .await;
            }
        }

        if self.epoch() != epoch {
            tracing::debug!("discarding refresh result superseded by a newer event");
            return Ok(());
        }

        match result {
            Ok(session) => {
                let mut user = auth.user;
                user.merge_identity(&session.user);
                self.write(SessionState::Authenticated(AuthSession { session, user }));
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                tracing::warn!(user_id = %auth.user.id, "Refresh token rejected, signing out: {e}");
                self.write(SessionState::Anonymous);
                Err(AuthError::classify(&e))
            }
            Err(e) => {
                tracing::warn!("Session refresh failed again, keeping stale session: {e}");
                self.write(SessionState::Authenticated(auth));
                Err(AuthError::classify(&e))
            }
        }
    }

    /// Confirm the current access token is still accepted. Used when the
    /// tab becomes visible again and on a polling interval.
    pub async fn revalidate(&self) -> Result<(), AuthError> {
        let auth = match &*self.state.borrow() {
            SessionState::Authenticated(auth) => auth.clone(),
            _ => return Ok(()),
        };
        if auth.session.is_expired_at((self.clock)()) {
            return self.refresh_session().await;
        }

        let epoch = self.epoch();
        match self.backend.get_user(&auth.session.access_token).await {
            Ok(identity) => {
                self.update_user(&auth.user.id, |u| u.merge_identity(&identity));
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                if self.epoch() == epoch {
                    tracing::warn!(user_id = %auth.user.id, "Session no longer valid: {e}");
                    self.write(SessionState::Anonymous);
                }
                Err(AuthError::classify(&e))
            }
            Err(e) => {
                tracing::debug!("Session re-check skipped: {e}");
                Ok(())
            }
        }
    }

    /// Move to the state an auth event describes. Repeated events are
    /// no-ops.
    pub async fn apply_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(_) if self.signing_in.get() => {
                tracing::debug!("sign-in event left to the pending login");
            }
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                if self.state.borrow().session() == Some(&session) {
                    return;
                }
                let same_user = self
                    .current_auth()
                    .filter(|auth| auth.user.id == session.user.id);
                let next = match same_user {
                    Some(auth) => {
                        let mut user = auth.user;
                        user.merge_identity(&session.user);
                        AuthSession { session, user }
                    }
                    None => {
                        let epoch = self.epoch();
                        let auth = self.attach_profile(session).await;
                        if self.epoch() != epoch {
                            return;
                        }
                        auth
                    }
                };
                self.write(SessionState::Authenticated(next));
            }
            AuthEvent::SignedOut => {
                if !matches!(*self.state.borrow(), SessionState::Anonymous) {
                    self.write(SessionState::Anonymous);
                }
            }
            AuthEvent::UserUpdated(identity) => {
                self.update_user(&identity.id, |u| u.merge_identity(&identity));
            }
        }
    }

    /// Drain backend auth events until the backend goes away.
    pub async fn run_event_loop(&self) {
        let mut events = self.backend.auth_events();
        loop {
            match events.recv().await {
                Ok(event) => self.apply_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "auth events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Refresh the session shortly before it expires, rescheduling whenever
    /// the state changes.
    ///
    /// A session whose refresh already failed (attempt plus retry) is not
    /// scheduled again; the loop waits for a new session instead.
    pub async fn run_refresh_loop(&self) {
        let mut rx = self.subscribe();
        let mut refreshed_last = false;
        let mut failed_expiry = None;
        loop {
            let expires_at = match &*rx.borrow_and_update() {
                SessionState::Authenticated(auth) => Some(auth.session.expires_at),
                _ => None,
            };

            let Some(expires_at) = expires_at.filter(|at| failed_expiry != Some(*at)) else {
                if rx.changed().await.is_err() {
                    return;
                }
                continue;
            };

            let mut delay = refresh_delay(expires_at, (self.clock)(), self.config.refresh_buffer());
            if refreshed_last {
                delay = delay.max(MIN_REFRESH_GAP);
            }
            tracing::debug!(delay_secs = delay.as_secs(), "session refresh scheduled");
            if !wait_unless_changed(&mut rx, delay).await {
                refreshed_last = false;
                continue;
            }
            refreshed_last = true;
            if self.refresh_session().await.is_err() {
                tracing::debug!(expires_at, "refresh gave up, keeping the stale session");
                failed_expiry = Some(expires_at);
            }
            // Our own Refreshing/Authenticated writes are not a reason to
            // reschedule.
            rx.borrow_and_update();
        }
    }

    /// Periodic [`revalidate`](Self::revalidate).
    pub async fn run_recheck_loop(&self) {
        loop {
            time::sleep(self.config.recheck_interval()).await;
            let _ = self.revalidate().await;
        }
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(self.backend.reset_password_for_email(email).await?)
    }

    pub async fn update_password(&self, password: &str) -> Result<(), AuthError> {
        if password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let auth = self.current_auth().ok_or(AuthError::NotAuthenticated)?;
        let identity = self.backend.update_password(&auth.session, password).await?;
        self.update_user(&auth.user.id, |u| u.merge_identity(&identity));
        Ok(())
    }

    pub async fn resend_confirmation(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(self.backend.resend_confirmation(email).await?)
    }
}

/// Marks a login as in flight until dropped.
struct SigningIn<'a>(&'a Cell<bool>);

impl<'a> SigningIn<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for SigningIn<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Sleep for `duration`. Returns `false` if the state changed first.
async fn wait_unless_changed(rx: &mut watch::Receiver<SessionState>, duration: Duration) -> bool {
    let timer = pin!(time::sleep(duration));
    let changed = pin!(rx.changed());
    matches!(select(timer, changed).await, Either::Left(_))
}
