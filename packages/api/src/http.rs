//! # HTTP API client
//!
//! [`ApiClient`] calls the project's HTTP API (functions that are not plain
//! table reads, e.g. admin statistics). Every request carries the current
//! access token from a [`TokenSource`].
//!
//! Responses are mapped uniformly:
//!
//! | Response | Result |
//! |----------|--------|
//! | 2xx | body decoded as JSON |
//! | 401 | [`ApiError::Unauthorized`], and the unauthorized hook runs |
//! | other non-2xx | [`ApiError::Server`] with the server's message, and the error hook runs |
//! | no response | [`ApiError::Network`] |

use std::rc::Rc;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use store::AdminStats;

use crate::config::BackendConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("Your session has expired. Please sign in again.")]
    Unauthorized,

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("Unable to reach the server. Check your connection and try again.")]
    Network(String),

    #[error("Unexpected response from the server.")]
    Decode(String),
}

/// Supplies the bearer token for each request.
pub trait TokenSource {
    fn access_token(&self) -> Option<String>;
}

impl<F: Fn() -> Option<String>> TokenSource for F {
    fn access_token(&self) -> Option<String> {
        self()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
}

/// Pull a human-readable message out of an error body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .message
        .or(parsed.msg)
        .or(parsed.error_description)
        .or(parsed.error)
        .filter(|m| !m.trim().is_empty())
}

/// Map a non-2xx status and its body to an [`ApiError`].
pub(crate) fn status_error(status: StatusCode, body: &str) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
    }
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    });
    ApiError::Server {
        status: status.as_u16(),
        message,
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    anon_key: String,
    tokens: Rc<dyn TokenSource>,
    on_unauthorized: Option<Rc<dyn Fn()>>,
    on_error: Option<Rc<dyn Fn(&ApiError)>>,
}

/// Which hook a failed request triggers.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Notify {
    Unauthorized,
    ServerError,
    Nothing,
}

pub(crate) fn notify_for(err: &ApiError) -> Notify {
    match err {
        ApiError::Unauthorized => Notify::Unauthorized,
        ApiError::Server { .. } => Notify::ServerError,
        ApiError::Network(_) | ApiError::Decode(_) => Notify::Nothing,
    }
}

impl ApiClient {
    pub fn new(config: &BackendConfig, tokens: impl TokenSource + 'static) -> Self {
        Self {
            http: Client::new(),
            base_url: config.api_url.clone(),
            anon_key: config.anon_key.clone(),
            tokens: Rc::new(tokens),
            on_unauthorized: None,
            on_error: None,
        }
    }

    /// Hook run on every 401, typically a toast plus navigation to the
    /// login screen.
    pub fn on_unauthorized(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_unauthorized = Some(Rc::new(hook));
        self
    }

    /// Hook run with every server-reported error other than a 401, usually
    /// to surface the message as a toast.
    pub fn on_error(mut self, hook: impl Fn(&ApiError) + 'static) -> Self {
        self.on_error = Some(Rc::new(hook));
        self
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send::<T, ()>(Method::GET, path, None).await
    }

    pub async fn admin_stats(&self) -> Result<AdminStats, ApiError> {
        self.get("/admin-stats").await
    }

    async fn send<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        tracing::debug!(%method, %url, "api request");

        let token = self
            .tokens
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(%method, %url, "API request failed: {e}");
            ApiError::Network(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = status_error(status, &text);
            tracing::warn!(%method, %url, status = status.as_u16(), "API error: {err}");
            self.report(&err);
            return Err(err);
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn report(&self, err: &ApiError) {
        match notify_for(err) {
            Notify::Unauthorized => {
                if let Some(hook) = &self.on_unauthorized {
                    hook();
                }
            }
            Notify::ServerError => {
                if let Some(hook) = &self.on_error {
                    hook(err);
                }
            }
            Notify::Nothing => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    #[test]
    fn test_error_message_fields() {
        assert_eq!(
            error_message(r#"{"message":"Plan is closed"}"#).as_deref(),
            Some("Plan is closed")
        );
        assert_eq!(error_message(r#"{"error":"forbidden"}"#).as_deref(), Some("forbidden"));
        assert_eq!(error_message(r#"{"msg":"Email rate limit exceeded"}"#).as_deref(), Some("Email rate limit exceeded"));
        assert_eq!(error_message(r#"{"message":""}"#), None);
        assert_eq!(error_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn test_status_error() {
        assert_eq!(status_error(StatusCode::UNAUTHORIZED, "{}"), ApiError::Unauthorized);
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, r#"{"error":"admin only"}"#),
            ApiError::Server {
                status: 403,
                message: "admin only".into()
            }
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            ApiError::Server {
                status: 502,
                message: "Bad Gateway".into()
            }
        );
    }

    #[test]
    fn test_notify_for() {
        assert_eq!(notify_for(&ApiError::Unauthorized), Notify::Unauthorized);
        assert_eq!(
            notify_for(&status_error(StatusCode::FORBIDDEN, r#"{"error":"admin only"}"#)),
            Notify::ServerError
        );
        assert_eq!(notify_for(&ApiError::Network("offline".into())), Notify::Nothing);
        assert_eq!(notify_for(&ApiError::Decode("eof".into())), Notify::Nothing);
    }

    #[test]
    fn test_report_runs_matching_hook() {
        let config = BackendConfig::from_lookup(|key| match key {
            crate::config::BACKEND_URL_VAR => Some("https://demo.supabase.co".into()),
            crate::config::ANON_KEY_VAR => Some("anon".into()),
            _ => None,
        })
        .unwrap();
        let expired = Rc::new(Cell::new(0));
        let messages = Rc::new(RefCell::new(Vec::new()));
        let client = {
            let expired = expired.clone();
            let messages = messages.clone();
            ApiClient::new(&config, || None::<String>)
                .on_unauthorized(move || expired.set(expired.get() + 1))
                .on_error(move |err| messages.borrow_mut().push(err.to_string()))
        };

        client.report(&status_error(StatusCode::UNAUTHORIZED, "{}"));
        client.report(&status_error(StatusCode::CONFLICT, r#"{"message":"Plan is closed"}"#));
        client.report(&ApiError::Network("offline".into()));

        assert_eq!(expired.get(), 1);
        assert_eq!(*messages.borrow(), vec!["Plan is closed".to_string()]);
    }

    #[test]
    fn test_closure_token_source() {
        let source = || Some("token-1".to_string());
        assert_eq!(source.access_token().as_deref(), Some("token-1"));
    }
}
