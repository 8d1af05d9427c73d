//! In-memory [`AuthBackend`] for controller tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tokio::sync::broadcast;

use crate::backend::{AuthBackend, AuthEvent, RegisterRequest, SignUpOutcome};
use crate::error::BackendError;
use crate::models::{Identity, Profile, ProfileUpdate, Session};

/// Fixed unix time the fake clock starts at.
pub const NOW: i64 = 1_760_000_000;

struct Account {
    identity: Identity,
    password: String,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    profiles: HashMap<String, Profile>,
    access_tokens: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    stored: Option<Session>,
    calls: HashMap<&'static str, usize>,
    refresh_errors: VecDeque<BackendError>,
    get_session_error: Option<BackendError>,
    get_user_error: Option<BackendError>,
    fail_profile_reads: bool,
    yield_on_profile_reads: bool,
    fail_profile_writes: bool,
    fail_sign_out: bool,
    auto_confirm: bool,
    ttl: i64,
    next_token: u64,
}

#[derive(Clone)]
pub struct FakeBackend {
    inner: Rc<RefCell<Inner>>,
    events: broadcast::Sender<AuthEvent>,
    clock: Rc<dyn Fn() -> i64>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::with_clock(Rc::new(|| NOW))
    }

    /// Clock that follows Tokio's (pausable) time, starting at [`NOW`].
    pub fn with_ticking_clock() -> Self {
        let start = tokio::time::Instant::now();
        Self::with_clock(Rc::new(move || NOW + start.elapsed().as_secs() as i64))
    }

    fn with_clock(clock: Rc<dyn Fn() -> i64>) -> Self {
        let (events, _) = broadcast::channel(16);
        let inner = Inner {
            ttl: 3600,
            ..Default::default()
        };
        Self {
            inner: Rc::new(RefCell::new(inner)),
            events,
            clock,
        }
    }

    pub fn clock(&self) -> Rc<dyn Fn() -> i64> {
        self.clock.clone()
    }

    pub fn add_user(&self, email: &str, password: &str, confirmed: bool) -> String {
        let mut inner = self.inner.borrow_mut();
        let id = format!("user-{}", inner.accounts.len() + 1);
        let identity = Identity {
            id: id.clone(),
            email: email.to_string(),
            email_confirmed_at: confirmed.then(chrono::Utc::now),
            created_at: None,
        };
        inner.accounts.insert(
            email.to_string(),
            Account {
                identity,
                password: password.to_string(),
            },
        );
        id
    }

    pub fn set_profile(&self, profile: Profile) {
        self.inner
            .borrow_mut()
            .profiles
            .insert(profile.id.clone(), profile);
    }

    pub fn profile(&self, id: &str) -> Option<Profile> {
        self.inner.borrow().profiles.get(id).cloned()
    }

    pub fn has_stored_session(&self) -> bool {
        self.inner.borrow().stored.is_some()
    }

    pub fn calls(&self, name: &str) -> usize {
        self.inner.borrow().calls.get(name).copied().unwrap_or(0)
    }

    pub fn fail_profile_reads(&self, fail: bool) {
        self.inner.borrow_mut().fail_profile_reads = fail;
    }

    /// Make profile reads suspend once, so other tasks can run mid-login.
    pub fn yield_on_profile_reads(&self, on: bool) {
        self.inner.borrow_mut().yield_on_profile_reads = on;
    }

    pub fn fail_profile_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_profile_writes = fail;
    }

    pub fn fail_sign_out(&self, fail: bool) {
        self.inner.borrow_mut().fail_sign_out = fail;
    }

    pub fn fail_get_session(&self, err: BackendError) {
        self.inner.borrow_mut().get_session_error = Some(err);
    }

    pub fn fail_get_user(&self, err: Option<BackendError>) {
        self.inner.borrow_mut().get_user_error = err;
    }

    pub fn queue_refresh_errors(&self, errors: Vec<BackendError>) {
        self.inner.borrow_mut().refresh_errors.extend(errors);
    }

    pub fn auto_confirm(&self, on: bool) {
        self.inner.borrow_mut().auto_confirm = on;
    }

    pub fn set_session_ttl(&self, secs: i64) {
        self.inner.borrow_mut().ttl = secs;
    }

    /// Issue a session for an existing account, as if signed in elsewhere.
    pub fn issue_session(&self, email: &str) -> Session {
        let expires_at = (self.clock)() + self.inner.borrow().ttl;
        self.issue_with_expiry(email, expires_at)
    }

    /// Store a session as if a previous visit had persisted it.
    pub fn persist_session_for(&self, email: &str, expires_at: i64) {
        let session = self.issue_with_expiry(email, expires_at);
        self.inner.borrow_mut().stored = Some(session);
    }

    fn issue_with_expiry(&self, email: &str, expires_at: i64) -> Session {
        let mut inner = self.inner.borrow_mut();
        inner.next_token += 1;
        let n = inner.next_token;
        let identity = inner
            .accounts
            .get(email)
            .map(|a| a.identity.clone())
            .unwrap_or_else(|| panic!("no account for {email}"));
        let session = Session {
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
            token_type: "bearer".into(),
            expires_in: inner.ttl,
            expires_at,
            user: identity,
        };
        inner
            .access_tokens
            .insert(session.access_token.clone(), email.to_string());
        inner
            .refresh_tokens
            .insert(session.refresh_token.clone(), email.to_string());
        session
    }

    fn count(&self, name: &'static str) {
        *self.inner.borrow_mut().calls.entry(name).or_default() += 1;
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

fn rejected(status: u16, code: &str, message: &str) -> BackendError {
    BackendError::Auth {
        status,
        code: Some(code.to_string()),
        message: message.to_string(),
    }
}

impl AuthBackend for FakeBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.count("sign_in");
        let confirmed = {
            let inner = self.inner.borrow();
            let account = inner
                .accounts
                .get(email)
                .filter(|a| a.password == password)
                .ok_or_else(|| rejected(400, "invalid_credentials", "Invalid login credentials"))?;
            account.identity.email_confirmed_at.is_some()
        };
        if !confirmed {
            return Err(rejected(400, "email_not_confirmed", "Email not confirmed"));
        }
        let session = self.issue_session(email);
        self.inner.borrow_mut().stored = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, request: &RegisterRequest) -> Result<SignUpOutcome, BackendError> {
        self.count("sign_up");
        if self.inner.borrow().accounts.contains_key(&request.email) {
            return Err(rejected(422, "user_already_exists", "User already registered"));
        }
        let confirmed = self.inner.borrow().auto_confirm;
        self.add_user(&request.email, &request.password, confirmed);
        let identity = self.inner.borrow().accounts[&request.email].identity.clone();
        let session = confirmed.then(|| self.issue_session(&request.email));
        if let Some(session) = &session {
            self.emit(AuthEvent::SignedIn(session.clone()));
        }
        Ok(SignUpOutcome { identity, session })
    }

    async fn sign_out(&self, _session: &Session) -> Result<(), BackendError> {
        self.count("sign_out");
        let mut inner = self.inner.borrow_mut();
        inner.stored = None;
        if inner.fail_sign_out {
            return Err(BackendError::Network("connection reset".into()));
        }
        drop(inner);
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.count("get_session");
        let inner = self.inner.borrow();
        match &inner.get_session_error {
            Some(err) => Err(err.clone()),
            None => Ok(inner.stored.clone()),
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        self.count("refresh");
        if let Some(err) = self.inner.borrow_mut().refresh_errors.pop_front() {
            return Err(err);
        }
        let email = self
            .inner
            .borrow()
            .refresh_tokens
            .get(refresh_token)
            .cloned()
            .ok_or_else(|| rejected(400, "invalid_grant", "Invalid Refresh Token"))?;
        let session = self.issue_session(&email);
        self.inner.borrow_mut().stored = Some(session.clone());
        self.emit(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    async fn get_user(&self, access_token: &str) -> Result<Identity, BackendError> {
        self.count("get_user");
        let inner = self.inner.borrow();
        if let Some(err) = &inner.get_user_error {
            return Err(err.clone());
        }
        inner
            .access_tokens
            .get(access_token)
            .and_then(|email| inner.accounts.get(email))
            .map(|a| a.identity.clone())
            .ok_or_else(|| rejected(401, "bad_jwt", "invalid JWT"))
    }

    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, BackendError> {
        self.count("fetch_profile");
        if self.inner.borrow().yield_on_profile_reads {
            tokio::task::yield_now().await;
        }
        let inner = self.inner.borrow();
        if inner.fail_profile_reads {
            return Err(BackendError::Server {
                status: 500,
                message: "relation \"profiles\" does not exist".into(),
            });
        }
        Ok(inner.profiles.get(&session.user.id).cloned())
    }

    async fn upsert_profile(
        &self,
        _session: Option<&Session>,
        profile: &Profile,
    ) -> Result<Profile, BackendError> {
        self.count("upsert_profile");
        let mut inner = self.inner.borrow_mut();
        if inner.fail_profile_writes {
            return Err(BackendError::Server {
                status: 403,
                message: "new row violates row-level security policy".into(),
            });
        }
        let role = inner.profiles.get(&profile.id).map(|p| p.role).unwrap_or_default();
        let stored = Profile {
            role,
            ..profile.clone()
        };
        inner.profiles.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        self.count("update_profile");
        let mut inner = self.inner.borrow_mut();
        let profile = inner
            .profiles
            .entry(session.user.id.clone())
            .or_insert_with(|| Profile {
                id: session.user.id.clone(),
                email: session.user.email.clone(),
                ..Default::default()
            });
        if let Some(name) = &update.full_name {
            profile.full_name = Some(name.clone());
        }
        if let Some(phone) = &update.phone {
            profile.phone = Some(phone.clone());
        }
        Ok(profile.clone())
    }

    async fn reset_password_for_email(&self, _email: &str) -> Result<(), BackendError> {
        self.count("recover");
        Ok(())
    }

    async fn update_password(&self, session: &Session, password: &str) -> Result<Identity, BackendError> {
        self.count("update_password");
        let mut inner = self.inner.borrow_mut();
        let account = inner
            .accounts
            .get_mut(&session.user.email)
            .ok_or_else(|| rejected(401, "bad_jwt", "invalid JWT"))?;
        account.password = password.to_string();
        Ok(account.identity.clone())
    }

    async fn resend_confirmation(&self, _email: &str) -> Result<(), BackendError> {
        self.count("resend");
        Ok(())
    }

    fn clear_stored_session(&self) {
        self.count("clear_stored");
        self.inner.borrow_mut().stored = None;
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
