//! Email and password sign-in.

use dioxus::prelude::*;
use store::guard::post_login_target;
use store::AuthError;
use ui::components::{Button, FormError, Input};
use ui::{use_auth, GuestOnly};

use crate::Route;

#[component]
pub fn Login(redirect: String) -> Element {
    let auth = use_auth();
    let nav = use_navigator();
    let mut email = use_signal(String::new);
    let mut password = use_signal(String::new);
    let mut error = use_signal(|| None::<String>);
    let mut busy = use_signal(|| false);

    let redirect = (!redirect.is_empty()).then_some(redirect);

    let onsubmit = {
        let redirect = redirect.clone();
        move |evt: FormEvent| {
            evt.prevent_default();
            let controller = auth.controller();
            let redirect = redirect.clone();
            async move {
                busy.set(true);
                error.set(None);
                let result = controller.login(&email(), &password()).await;
                busy.set(false);
                match result {
                    Ok(user) => {
                        tracing::debug!(user_id = %user.id, "login form succeeded");
                        nav.replace(post_login_target(redirect.as_deref()));
                    }
                    Err(AuthError::EmailNotConfirmed) => {
                        nav.push(Route::VerifyEmail { email: email() });
                    }
                    Err(e) => error.set(Some(e.to_string())),
                }
            }
        }
    };

    rsx! {
        GuestOnly {
            redirect,
            div {
                class: "auth-card",
                h1 { "Welcome back" }
                p { class: "muted", "Sign in to manage your investments." }

                FormError { message: error() }

                form {
                    onsubmit: onsubmit,
                    Input {
                        label: "Email",
                        r#type: "email",
                        placeholder: "you@example.com",
                        value: email(),
                        oninput: move |e: FormEvent| email.set(e.value()),
                    }
                    Input {
                        label: "Password",
                        r#type: "password",
                        value: password(),
                        oninput: move |e: FormEvent| password.set(e.value()),
                    }
                    Button {
                        r#type: "submit",
                        class: "btn-block",
                        disabled: busy(),
                        if busy() { "Signing in..." } else { "Sign in" }
                    }
                }

                div {
                    class: "auth-links",
                    Link { to: Route::ForgotPassword {}, "Forgot your password?" }
                    span {
                        "No account yet? "
                        Link { to: Route::Register {}, "Create one" }
                    }
                }
            }
        }
    }
}
