//! Password recovery: request a reset link, then choose a new password.

use dioxus::prelude::*;
use store::guard::DEFAULT_LANDING_PATH;
use store::{AuthEvent, BackendError};
use ui::components::{Button, FormError, Input, Spinner};
use ui::{describe, use_auth, use_session, use_toast};

use super::check_password;
use crate::Route;

/// Hands the URL fragment (where the auth service puts the recovery
/// tokens) back to Rust.
const READ_HASH_JS: &str = r#"
const hash = window.location.hash || "";
history.replaceState(null, "", window.location.pathname + window.location.search);
dioxus.send(hash);
"#;

#[component]
pub fn ForgotPassword() -> Element {
    let auth = use_auth();
    let mut email = use_signal(String::new);
    let mut error = use_signal(|| None::<String>);
    let mut sent = use_signal(|| false);
    let mut busy = use_signal(|| false);

    let onsubmit = move |evt: FormEvent| {
        evt.prevent_default();
        let controller = auth.controller();
        async move {
            busy.set(true);
            error.set(None);
            match controller.send_password_reset(&email()).await {
                Ok(()) => sent.set(true),
                Err(e) => error.set(Some(e.to_string())),
            }
            busy.set(false);
        }
    };

    rsx! {
        div {
            class: "auth-card",
            h1 { "Reset your password" }
            if sent() {
                p { "If an account exists for " strong { "{email}" } ", a reset link is on its way." }
                Link { to: Route::Login { redirect: String::new() }, "Back to sign in" }
            } else {
                p { class: "muted", "Enter your email and we'll send you a link to choose a new password." }
                FormError { message: error() }
                form {
                    onsubmit: onsubmit,
                    Input {
                        label: "Email",
                        r#type: "email",
                        value: email(),
                        oninput: move |e: FormEvent| email.set(e.value()),
                    }
                    Button {
                        r#type: "submit",
                        class: "btn-block",
                        disabled: busy(),
                        "Send reset link"
                    }
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Recovery {
    Checking,
    /// Opened without a link; usable by a signed-in user.
    NoLink,
    Ready,
    Failed(String),
}

/// Landing page of the recovery link.
#[component]
pub fn ResetPassword() -> Element {
    let auth = use_auth();
    let session = use_session();
    let toasts = use_toast();
    let nav = use_navigator();
    let mut recovery = use_signal(|| Recovery::Checking);
    let mut password = use_signal(String::new);
    let mut confirm = use_signal(String::new);
    let mut error = use_signal(|| None::<String>);
    let mut busy = use_signal(|| false);

    let adopt = auth.clone();
    use_hook(move || {
        spawn(async move {
            let mut eval = document::eval(READ_HASH_JS);
            let hash = eval.recv::<String>().await.unwrap_or_default();
            if !hash.contains("access_token=") && !hash.contains("error") {
                recovery.set(Recovery::NoLink);
                return;
            }
            match adopt.backend().recover_session(&hash).await {
                Ok(recovered) => {
                    adopt.controller().apply_event(AuthEvent::SignedIn(recovered)).await;
                    recovery.set(Recovery::Ready);
                }
                Err(e) => {
                    tracing::warn!("recovery link rejected: {e}");
                    let message = match e {
                        BackendError::Auth { message, .. } => message,
                        other => describe(&other),
                    };
                    recovery.set(Recovery::Failed(message));
                }
            }
        })
    });

    let onsubmit = move |evt: FormEvent| {
        evt.prevent_default();
        let controller = auth.controller();
        async move {
            if let Err(message) = check_password(&password(), Some(&confirm())) {
                error.set(Some(message));
                return;
            }
            busy.set(true);
            error.set(None);
            let result = controller.update_password(&password()).await;
            busy.set(false);
            match result {
                Ok(()) => {
                    toasts.success("Your password has been updated.");
                    nav.replace(DEFAULT_LANDING_PATH);
                }
                Err(e) => error.set(Some(e.to_string())),
            }
        }
    };

    let state = match recovery() {
        Recovery::NoLink if session.read().is_authenticated() => Recovery::Ready,
        Recovery::NoLink if session.read().is_loading() => Recovery::Checking,
        Recovery::NoLink => Recovery::Failed("This page needs a valid password reset link.".into()),
        other => other,
    };

    rsx! {
        div {
            class: "auth-card",
            h1 { "Choose a new password" }
            match state {
                Recovery::Checking | Recovery::NoLink => rsx! {
                    Spinner { label: "Checking your reset link..." }
                },
                Recovery::Failed(message) => rsx! {
                    FormError { message: Some(message) }
                    Link { to: Route::ForgotPassword {}, "Request a new link" }
                },
                Recovery::Ready => rsx! {
                    FormError { message: error() }
                    form {
                        onsubmit: onsubmit,
                        Input {
                            label: "New password",
                            r#type: "password",
                            value: password(),
                            oninput: move |e: FormEvent| password.set(e.value()),
                        }
                        Input {
                            label: "Confirm password",
                            r#type: "password",
                            value: confirm(),
                            oninput: move |e: FormEvent| confirm.set(e.value()),
                        }
                        Button {
                            r#type: "submit",
                            class: "btn-block",
                            disabled: busy(),
                            "Update password"
                        }
                    }
                },
            }
        }
    }
}
