//! # Hosted backend client
//!
//! [`Backend`] speaks the Supabase-compatible REST surface of the hosted
//! backend: the auth service under `/auth/v1` and PostgREST tables under
//! `/rest/v1`. It implements [`AuthBackend`] for the session controller and
//! adds the table reads and writes the pages need.
//!
//! ## Sessions
//!
//! The backend client owns persistence of the current session (see
//! [`store::persist`]): sign-in, sign-up and refresh store it, sign-out
//! clears it, and [`get_session`](AuthBackend::get_session) reads it back.
//! Each of those also emits an [`AuthEvent`] on a broadcast channel.
//!
//! ## Headers
//!
//! Every request sends `apikey: <anon key>` and
//! `Authorization: Bearer <access token>`, falling back to the anon key for
//! anonymous calls.

use std::rc::Rc;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use store::guard::decode_component;
use store::persist::{default_storage, SessionStorage};
use store::time::now_secs;
use store::{
    AuthBackend, AuthEvent, BackendError, DashboardStats, Identity, Investment, InvestmentPlan,
    NewInvestment, NewTransaction, Profile, ProfileUpdate, RegisterRequest, Session,
    SignUpOutcome, Transaction,
};

use crate::config::BackendConfig;
use crate::http::error_message;

/// Transactions shown in the dashboard's recent list.
pub const RECENT_TRANSACTIONS: usize = 5;

const PROFILES: &str = "profiles";
const PLANS: &str = "investment_plans";
const TRANSACTIONS: &str = "transactions";
const INVESTMENTS: &str = "investments";

/// Everything the dashboard shows, fetched in one go.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub recent_transactions: Vec<Transaction>,
    pub investments: Vec<Investment>,
}

#[derive(Clone)]
pub struct Backend {
    inner: Rc<Inner>,
}

struct Inner {
    http: Client,
    config: BackendConfig,
    storage: Rc<dyn SessionStorage>,
    events: broadcast::Sender<AuthEvent>,
}

impl Backend {
    pub fn new(config: BackendConfig) -> Self {
        Self::with_storage(config, default_storage())
    }

    pub fn with_storage(config: BackendConfig, storage: Rc<dyn SessionStorage>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Rc::new(Inner {
                http: Client::new(),
                config,
                storage,
                events,
            }),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.inner.config
    }

    fn emit(&self, event: AuthEvent) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.inner.events.send(event);
    }

    fn request(&self, method: Method, url: &str, token: Option<&str>) -> RequestBuilder {
        let config = &self.inner.config;
        self.inner
            .http
            .request(method, url)
            .header("apikey", &config.anon_key)
            .bearer_auth(token.unwrap_or(&config.anon_key))
    }

    fn auth(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        self.request(method, &self.inner.config.auth_url(path), token)
    }

    fn table(&self, method: Method, table: &str, token: Option<&str>) -> RequestBuilder {
        self.request(method, &self.inner.config.rest_url(table), token)
    }

    async fn send_auth<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let text = read(request, auth_error).await?;
        decode(&text)
    }

    async fn send_auth_empty(&self, request: RequestBuilder) -> Result<(), BackendError> {
        read(request, auth_error).await.map(|_| ())
    }

    async fn send_rest<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let text = read(request, rest_error).await?;
        decode(&text)
    }

    /// Insert or update through PostgREST and return the first written row.
    async fn write_one<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let rows: Vec<T> = self.send_rest(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("write returned no rows".into()))
    }

    fn store_session(&self, session: &Session) {
        self.inner.storage.store(session);
    }

    pub async fn list_plans(&self, token: Option<&str>) -> Result<Vec<InvestmentPlan>, BackendError> {
        let request = self
            .table(Method::GET, PLANS, token)
            .query(&[("select", "*"), ("is_active", "eq.true"), ("order", "min_amount.asc")]);
        self.send_rest(request).await
    }

    /// A user's transactions, newest first.
    pub async fn list_transactions(
        &self,
        token: &str,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, BackendError> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        let request = self.table(Method::GET, TRANSACTIONS, Some(token)).query(&query);
        self.send_rest(request).await
    }

    pub async fn list_investments(&self, token: &str, user_id: &str) -> Result<Vec<Investment>, BackendError> {
        let request = self
            .table(Method::GET, INVESTMENTS, Some(token))
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("order", "created_at.desc".to_string()),
            ]);
        self.send_rest(request).await
    }

    /// Record a pending deposit or withdrawal request.
    pub async fn create_transaction(
        &self,
        token: &str,
        transaction: &NewTransaction,
    ) -> Result<Transaction, BackendError> {
        tracing::info!(kind = ?transaction.kind, amount = %transaction.amount, "creating transaction");
        let request = self
            .table(Method::POST, TRANSACTIONS, Some(token))
            .header("Prefer", "return=representation")
            .json(transaction);
        self.write_one(request).await
    }

    pub async fn create_investment(
        &self,
        token: &str,
        investment: &NewInvestment,
    ) -> Result<Investment, BackendError> {
        tracing::info!(plan_id = %investment.plan_id, amount = %investment.amount, "creating investment");
        let request = self
            .table(Method::POST, INVESTMENTS, Some(token))
            .header("Prefer", "return=representation")
            .json(investment);
        self.write_one(request).await
    }

    /// Transactions, investments and plans in parallel, folded into the
    /// dashboard view.
    pub async fn dashboard(&self, token: &str, user_id: &str) -> Result<Dashboard, BackendError> {
        let (transactions, investments, plans) = futures::join!(
            self.list_transactions(token, user_id, None),
            self.list_investments(token, user_id),
            self.list_plans(Some(token)),
        );
        let (transactions, investments, plans) = (transactions?, investments?, plans?);
        let stats = DashboardStats::compute(&transactions, &investments, &plans);
        Ok(Dashboard {
            stats,
            recent_transactions: transactions.into_iter().take(RECENT_TRANSACTIONS).collect(),
            investments,
        })
    }

    /// Adopt the session carried by a password-recovery link. The auth
    /// service appends it to the redirect URL as a fragment
    /// (`#access_token=..&refresh_token=..&type=recovery`).
    pub async fn recover_session(&self, fragment: &str) -> Result<Session, BackendError> {
        let tokens = parse_recovery_fragment(fragment)?;
        let user = self.get_user(&tokens.access_token).await?;
        let session = Session {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "bearer".to_string(),
            expires_in: tokens.expires_in,
            expires_at: tokens.expires_at,
            user,
        }
        .with_expiry_from(now_secs());
        tracing::info!(user_id = %session.user.id, "recovered session from reset link");
        self.store_session(&session);
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }
}

/// Fields of a profile row the client may write. `role` and `kyc_status`
/// are owned by the backend and never sent.
#[derive(Serialize)]
struct ProfileWrite<'a> {
    id: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
}

impl AuthBackend for Backend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let request = self
            .auth(Method::POST, "token?grant_type=password", None)
            .json(&json!({ "email": email, "password": password }));
        let session: Session = self.send_auth(request).await?;
        let session = session.with_expiry_from(now_secs());
        self.store_session(&session);
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, request: &RegisterRequest) -> Result<SignUpOutcome, BackendError> {
        let body = json!({
            "email": request.email,
            "password": request.password,
            "data": { "full_name": request.full_name, "phone": request.phone },
        });
        let value: Value = self
            .send_auth(self.auth(Method::POST, "signup", None).json(&body))
            .await?;
        let outcome = parse_sign_up(value, now_secs())?;
        if let Some(session) = &outcome.session {
            self.store_session(session);
            self.emit(AuthEvent::SignedIn(session.clone()));
        }
        Ok(outcome)
    }

    async fn sign_out(&self, session: &Session) -> Result<(), BackendError> {
        self.inner.storage.clear();
        let result = self
            .send_auth_empty(self.auth(Method::POST, "logout", Some(&session.access_token)))
            .await;
        self.emit(AuthEvent::SignedOut);
        result
    }

    fn clear_stored_session(&self) {
        self.inner.storage.clear();
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.inner.storage.load())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let request = self
            .auth(Method::POST, "token?grant_type=refresh_token", None)
            .json(&json!({ "refresh_token": refresh_token }));
        let session: Session = match self.send_auth(request).await {
            Ok(session) => session,
            Err(e) => {
                if e.is_rejection() {
                    self.inner.storage.clear();
                }
                return Err(e);
            }
        };
        let session = session.with_expiry_from(now_secs());
        self.store_session(&session);
        self.emit(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    async fn get_user(&self, access_token: &str) -> Result<Identity, BackendError> {
        self.send_auth(self.auth(Method::GET, "user", Some(access_token)))
            .await
    }

    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, BackendError> {
        let request = self
            .table(Method::GET, PROFILES, Some(&session.access_token))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", session.user.id))]);
        let rows: Vec<Profile> = self.send_rest(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_profile(
        &self,
        session: Option<&Session>,
        profile: &Profile,
    ) -> Result<Profile, BackendError> {
        let body = ProfileWrite {
            id: &profile.id,
            email: &profile.email,
            full_name: profile.full_name.as_deref(),
            phone: profile.phone.as_deref(),
        };
        let request = self
            .table(Method::POST, PROFILES, session.map(|s| s.access_token.as_str()))
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&body);
        self.write_one(request).await
    }

    async fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        let request = self
            .table(Method::PATCH, PROFILES, Some(&session.access_token))
            .query(&[("id", format!("eq.{}", session.user.id))])
            .header("Prefer", "return=representation")
            .json(update);
        self.write_one(request).await
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<(), BackendError> {
        let request = self
            .auth(Method::POST, "recover", None)
            .json(&json!({ "email": email }));
        self.send_auth_empty(request).await
    }

    async fn update_password(&self, session: &Session, password: &str) -> Result<Identity, BackendError> {
        let request = self
            .auth(Method::PUT, "user", Some(&session.access_token))
            .json(&json!({ "password": password }));
        let identity: Identity = self.send_auth(request).await?;
        self.emit(AuthEvent::UserUpdated(identity.clone()));
        Ok(identity)
    }

    async fn resend_confirmation(&self, email: &str) -> Result<(), BackendError> {
        let request = self
            .auth(Method::POST, "resend", None)
            .json(&json!({ "type": "signup", "email": email }));
        self.send_auth_empty(request).await
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}

/// Send a request and return the body of a 2xx response.
async fn read(
    request: RequestBuilder,
    map_error: fn(StatusCode, &str) -> BackendError,
) -> Result<String, BackendError> {
    let response = request
        .send()
        .await
        .map_err(|e| BackendError::Network(e.to_string()))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| BackendError::Network(e.to_string()))?;
    if status.is_success() {
        Ok(text)
    } else {
        let err = map_error(status, &text);
        tracing::debug!(status = status.as_u16(), "backend error: {err}");
        Err(err)
    }
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, BackendError> {
    serde_json::from_str(text).map_err(|e| BackendError::Decode(e.to_string()))
}

#[derive(Deserialize)]
struct AuthErrorCode {
    error_code: Option<String>,
    error: Option<String>,
}

/// Error from the auth service. Newer servers send `error_code` and `msg`,
/// older ones an OAuth-style `error` and `error_description`.
pub(crate) fn auth_error(status: StatusCode, body: &str) -> BackendError {
    let code = serde_json::from_str::<AuthErrorCode>(body)
        .ok()
        .and_then(|c| c.error_code.or(c.error))
        .filter(|c| !c.contains(' '));
    BackendError::Auth {
        status: status.as_u16(),
        code,
        message: error_message(body).unwrap_or_else(|| reason(status)),
    }
}

/// Error from a PostgREST table call.
pub(crate) fn rest_error(status: StatusCode, body: &str) -> BackendError {
    BackendError::Server {
        status: status.as_u16(),
        message: error_message(body).unwrap_or_else(|| reason(status)),
    }
}

fn reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Request failed").to_string()
}

/// Sign-up answers with a full session when email confirmation is off and
/// with the bare user object when it is on.
pub(crate) fn parse_sign_up(value: Value, now: i64) -> Result<SignUpOutcome, BackendError> {
    if value.get("access_token").is_some() {
        let session: Session =
            serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))?;
        let session = session.with_expiry_from(now);
        Ok(SignUpOutcome {
            identity: session.user.clone(),
            session: Some(session),
        })
    } else {
        let identity: Identity =
            serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(SignUpOutcome {
            identity,
            session: None,
        })
    }
}

#[derive(Debug, PartialEq)]
pub(crate) struct RecoveryTokens {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    expires_at: i64,
}

/// Tokens from a recovery link fragment. An `error_description` in the
/// fragment (expired or reused link) is returned as an auth error.
pub(crate) fn parse_recovery_fragment(fragment: &str) -> Result<RecoveryTokens, BackendError> {
    let mut access_token = None;
    let mut refresh_token = None;
    let mut expires_in = 0;
    let mut expires_at = 0;
    let mut error = None;
    let mut error_code = None;

    for pair in fragment.trim_start_matches('#').split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = decode_component(&value.replace('+', " "));
        match key {
            "access_token" => access_token = Some(value),
            "refresh_token" => refresh_token = Some(value),
            "expires_in" => expires_in = value.parse().unwrap_or_default(),
            "expires_at" => expires_at = value.parse().unwrap_or_default(),
            "error_description" => error = Some(value),
            "error_code" => error_code = Some(value),
            _ => {}
        }
    }

    if let Some(message) = error {
        return Err(BackendError::Auth {
            status: 403,
            code: error_code,
            message,
        });
    }
    match (access_token, refresh_token) {
        (Some(access_token), Some(refresh_token)) if !access_token.is_empty() => Ok(RecoveryTokens {
            access_token,
            refresh_token,
            expires_in,
            expires_at,
        }),
        _ => Err(BackendError::Decode("recovery link is missing its tokens".into())),
    }
}

#[cfg(test)]
mod tests {
    use store::AuthError;

    use super::*;

    #[test]
    fn test_auth_error_new_format() {
        let err = auth_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        );
        assert_eq!(
            err,
            BackendError::Auth {
                status: 400,
                code: Some("invalid_credentials".into()),
                message: "Invalid login credentials".into(),
            }
        );
        assert_eq!(AuthError::classify(&err), AuthError::InvalidCredentials);
    }

    #[test]
    fn test_auth_error_oauth_format() {
        let err = auth_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid Refresh Token: Refresh Token Not Found"}"#,
        );
        assert!(err.is_rejection());
        match err {
            BackendError::Auth { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("invalid_grant"));
                assert_eq!(message, "Invalid Refresh Token: Refresh Token Not Found");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_auth_error_rate_limit_without_body() {
        let err = auth_error(StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(AuthError::classify(&err), AuthError::RateLimited);
    }

    #[test]
    fn test_rest_error_message() {
        assert_eq!(
            rest_error(
                StatusCode::FORBIDDEN,
                r#"{"code":"42501","message":"new row violates row-level security policy","details":null}"#
            ),
            BackendError::Server {
                status: 403,
                message: "new row violates row-level security policy".into(),
            }
        );
    }

    #[test]
    fn test_sign_up_without_confirmation() {
        let outcome = parse_sign_up(
            json!({
                "access_token": "a", "refresh_token": "r", "token_type": "bearer",
                "expires_in": 3600,
                "user": { "id": "u1", "email": "ada@example.com" }
            }),
            1_000,
        )
        .unwrap();
        let session = outcome.session.unwrap();
        assert_eq!(session.expires_at, 4_600);
        assert_eq!(outcome.identity.id, "u1");
    }

    #[test]
    fn test_sign_up_pending_confirmation() {
        let outcome = parse_sign_up(
            json!({ "id": "u2", "email": "bob@example.com", "confirmation_sent_at": "2025-10-09T12:00:00Z" }),
            1_000,
        )
        .unwrap();
        assert!(outcome.session.is_none());
        assert_eq!(outcome.identity.email, "bob@example.com");
    }

    #[test]
    fn test_profile_write_omits_backend_fields() {
        let body = serde_json::to_value(ProfileWrite {
            id: "u1",
            email: "ada@example.com",
            full_name: Some("Ada"),
            phone: None,
        })
        .unwrap();
        assert_eq!(body, json!({ "id": "u1", "email": "ada@example.com", "full_name": "Ada" }));
    }

    #[test]
    fn test_recovery_fragment() {
        let tokens = parse_recovery_fragment(
            "#access_token=eyJ.a.b&expires_at=1760000000&expires_in=3600&refresh_token=r1&token_type=bearer&type=recovery",
        )
        .unwrap();
        assert_eq!(
            tokens,
            RecoveryTokens {
                access_token: "eyJ.a.b".into(),
                refresh_token: "r1".into(),
                expires_in: 3600,
                expires_at: 1_760_000_000,
            }
        );
    }

    #[test]
    fn test_recovery_fragment_errors() {
        let err = parse_recovery_fragment(
            "#error=access_denied&error_code=otp_expired&error_description=Email+link+is+invalid+or+has+expired",
        )
        .unwrap_err();
        assert_eq!(
            err,
            BackendError::Auth {
                status: 403,
                code: Some("otp_expired".into()),
                message: "Email link is invalid or has expired".into(),
            }
        );

        assert!(matches!(
            parse_recovery_fragment("#type=recovery"),
            Err(BackendError::Decode(_))
        ));
        assert!(matches!(parse_recovery_fragment(""), Err(BackendError::Decode(_))));
    }
}
