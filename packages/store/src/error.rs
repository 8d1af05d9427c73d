//! Backend errors and the user-facing auth error taxonomy.

use thiserror::Error;

/// Error returned by a backend call, before classification.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum BackendError {
    /// The auth service rejected the request (bad credentials, revoked
    /// refresh token, rate limit, ...).
    #[error("auth error ({status}): {message}")]
    Auth {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Any other non-2xx response.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether the backend positively rejected the credential, as opposed to
    /// the call failing for transport reasons.
    pub fn is_rejection(&self) -> bool {
        match self {
            BackendError::Auth { status, .. } => matches!(status, 400 | 401 | 403 | 422),
            BackendError::Server { status, .. } => matches!(status, 401 | 403),
            _ => false,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, BackendError::Network(_))
    }
}

/// Normalized authentication error. `Display` is the message shown to the
/// user.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum AuthError {
    #[error("Please enter both email and password.")]
    MissingCredentials,

    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("Please confirm your email address before signing in.")]
    EmailNotConfirmed,

    #[error("Too many attempts. Please wait a moment and try again.")]
    RateLimited,

    #[error("Unable to reach the server. Check your connection and try again.")]
    Network,

    #[error("You need to be signed in to do that.")]
    NotAuthenticated,

    #[error("Something went wrong. Please try again.")]
    Generic(String),
}

impl AuthError {
    /// Map a backend error onto the fixed taxonomy.
    ///
    /// Codes are checked first; older auth servers only send a message, so
    /// the message text is matched as a fallback.
    pub fn classify(err: &BackendError) -> Self {
        match err {
            BackendError::Network(_) => AuthError::Network,
            BackendError::Auth {
                status,
                code,
                message,
            } => {
                let code = code.as_deref().unwrap_or_default();
                let message = message.to_lowercase();
                if *status == 429
                    || code == "over_request_rate_limit"
                    || code == "over_email_send_rate_limit"
                    || message.contains("rate limit")
                {
                    AuthError::RateLimited
                } else if code == "email_not_confirmed" || message.contains("email not confirmed") {
                    AuthError::EmailNotConfirmed
                } else if code == "invalid_credentials"
                    || code == "invalid_grant"
                    || message.contains("invalid login credentials")
                {
                    AuthError::InvalidCredentials
                } else {
                    AuthError::Generic(message)
                }
            }
            BackendError::Server { status: 429, .. } => AuthError::RateLimited,
            other => AuthError::Generic(other.to_string()),
        }
    }
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        AuthError::classify(&err)
    }
}
