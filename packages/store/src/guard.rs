//! Route guard decisions.
//!
//! The UI's `Protected` component asks [`decide`] what to do for the current
//! [`SessionState`]; this module has no rendering concerns.

use crate::models::Role;
use crate::session::SessionState;

pub const LOGIN_PATH: &str = "/login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";
pub const VERIFY_EMAIL_PATH: &str = "/verify-email";
pub const DEFAULT_LANDING_PATH: &str = "/dashboard";

/// What a guarded route needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Role(Role),
    EmailVerified,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session not known yet; show a placeholder.
    Loading,
    Allow,
    Redirect(String),
}

/// Decide whether `target` may render.
pub fn decide(state: &SessionState, requirement: &Requirement, target: &str) -> GuardDecision {
    if state.is_loading() {
        return GuardDecision::Loading;
    }
    let Some(user) = state.user() else {
        return GuardDecision::Redirect(login_redirect(target));
    };
    match requirement {
        Requirement::Authenticated => GuardDecision::Allow,
        Requirement::Role(role) if user.role == *role => GuardDecision::Allow,
        Requirement::Role(_) => GuardDecision::Redirect(UNAUTHORIZED_PATH.to_string()),
        Requirement::EmailVerified if user.email_verified => GuardDecision::Allow,
        Requirement::EmailVerified => GuardDecision::Redirect(VERIFY_EMAIL_PATH.to_string()),
    }
}

/// Login URL that returns to `target` afterwards.
pub fn login_redirect(target: &str) -> String {
    if target.is_empty() || target == "/" {
        return LOGIN_PATH.to_string();
    }
    format!("{LOGIN_PATH}?redirect={}", encode_component(target))
}

/// Where to send a user after signing in. Only same-site relative paths are
/// honoured. Accepts the parameter raw or already decoded.
pub fn post_login_target(redirect: Option<&str>) -> String {
    let path = redirect.map(decode_component).unwrap_or_default();
    if path.starts_with('/') && !path.starts_with("//") && path != LOGIN_PATH {
        path
    } else {
        DEFAULT_LANDING_PATH.to_string()
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Undo percent-encoding. Malformed escapes are kept as-is.
pub fn decode_component(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let hex = bytes
            .get(i + 1..i + 3)
            .and_then(|h| std::str::from_utf8(h).ok())
            .and_then(|h| u8::from_str_radix(h, 16).ok());
        match (bytes[i], hex) {
            (b'%', Some(byte)) => {
                out.push(byte);
                i += 3;
            }
            (byte, _) => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Identity, Session, User};
    use crate::session::AuthSession;

    fn signed_in(role: Role, verified: bool) -> SessionState {
        let identity = Identity {
            id: "u1".into(),
            email: "ada@example.com".into(),
            email_confirmed_at: verified.then(chrono::Utc::now),
            created_at: None,
        };
        let mut user = User::from_identity(&identity);
        user.role = role;
        SessionState::Authenticated(AuthSession {
            session: Session {
                access_token: "a".into(),
                refresh_token: "r".into(),
                token_type: "bearer".into(),
                expires_in: 3600,
                expires_at: 0,
                user: identity,
            },
            user,
        })
    }

    #[test]
    fn test_loading_never_redirects() {
        for state in [SessionState::Uninitialized, SessionState::Checking] {
            assert_eq!(
                decide(&state, &Requirement::Role(Role::Admin), "/admin"),
                GuardDecision::Loading
            );
        }
    }

    #[test]
    fn test_anonymous_goes_to_login_with_target() {
        assert_eq!(
            decide(&SessionState::Anonymous, &Requirement::Authenticated, "/deposit?amount=50"),
            GuardDecision::Redirect("/login?redirect=%2Fdeposit%3Famount%3D50".into())
        );
        assert_eq!(login_redirect("/"), "/login");
    }

    #[test]
    fn test_admin_role_required() {
        let admin = Requirement::Role(Role::Admin);
        assert_eq!(
            decide(&signed_in(Role::User, true), &admin, "/admin"),
            GuardDecision::Redirect(UNAUTHORIZED_PATH.into())
        );
        assert_eq!(decide(&signed_in(Role::Admin, true), &admin, "/admin"), GuardDecision::Allow);
    }

    #[test]
    fn test_email_verification_required() {
        assert_eq!(
            decide(&signed_in(Role::User, false), &Requirement::EmailVerified, "/withdraw"),
            GuardDecision::Redirect(VERIFY_EMAIL_PATH.into())
        );
        assert_eq!(
            decide(&signed_in(Role::User, true), &Requirement::EmailVerified, "/withdraw"),
            GuardDecision::Allow
        );
        assert_eq!(
            decide(&signed_in(Role::User, false), &Requirement::Authenticated, "/dashboard"),
            GuardDecision::Allow
        );
    }

    #[test]
    fn test_post_login_target_rejects_offsite() {
        assert_eq!(post_login_target(Some("/invest")), "/invest");
        assert_eq!(post_login_target(Some("%2Fdeposit%3Famount%3D50")), "/deposit?amount=50");
        assert_eq!(post_login_target(Some("%2F%2Fevil.example")), DEFAULT_LANDING_PATH);
        assert_eq!(post_login_target(Some("//evil.example")), DEFAULT_LANDING_PATH);
        assert_eq!(post_login_target(Some("https://evil.example")), DEFAULT_LANDING_PATH);
        assert_eq!(post_login_target(Some("/login")), DEFAULT_LANDING_PATH);
        assert_eq!(post_login_target(None), DEFAULT_LANDING_PATH);
    }
}
