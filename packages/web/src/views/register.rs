use dioxus::prelude::*;
use store::guard::DEFAULT_LANDING_PATH;
use store::RegisterRequest;
use ui::components::{Button, FormError, Input};
use ui::{use_auth, use_toast, GuestOnly};

use super::check_password;
use crate::Route;

#[component]
pub fn Register() -> Element {
    let auth = use_auth();
    let toasts = use_toast();
    let nav = use_navigator();
    let mut full_name = use_signal(String::new);
    let mut email = use_signal(String::new);
    let mut phone = use_signal(String::new);
    let mut password = use_signal(String::new);
    let mut error = use_signal(|| None::<String>);
    let mut busy = use_signal(|| false);

    let onsubmit = move |evt: FormEvent| {
        evt.prevent_default();
        let controller = auth.controller();
        async move {
            if let Err(message) = check_password(&password(), None) {
                error.set(Some(message));
                return;
            }
            let phone = phone().trim().to_string();
            let request = RegisterRequest {
                email: email().trim().to_string(),
                password: password(),
                full_name: full_name().trim().to_string(),
                phone: (!phone.is_empty()).then_some(phone),
            };

            busy.set(true);
            error.set(None);
            let result = controller.register(request).await;
            busy.set(false);
            match result {
                Ok(user) if controller.is_authenticated() => {
                    toasts.success(format!("Welcome, {}!", user.display_name()));
                    nav.replace(DEFAULT_LANDING_PATH);
                }
                Ok(user) => {
                    nav.replace(Route::VerifyEmail { email: user.email });
                }
                Err(e) => error.set(Some(e.to_string())),
            }
        }
    };

    rsx! {
        GuestOnly {
            div {
                class: "auth-card",
                h1 { "Create your account" }
                p { class: "muted", "Start investing in a few minutes." }

                FormError { message: error() }

                form {
                    onsubmit: onsubmit,
                    Input {
                        label: "Full name",
                        value: full_name(),
                        oninput: move |e: FormEvent| full_name.set(e.value()),
                    }
                    Input {
                        label: "Email",
                        r#type: "email",
                        placeholder: "you@example.com",
                        value: email(),
                        oninput: move |e: FormEvent| email.set(e.value()),
                    }
                    Input {
                        label: "Phone (optional)",
                        r#type: "tel",
                        value: phone(),
                        oninput: move |e: FormEvent| phone.set(e.value()),
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
                        if busy() { "Creating account..." } else { "Create account" }
                    }
                }

                div {
                    class: "auth-links",
                    span {
                        "Already registered? "
                        Link { to: Route::Login { redirect: String::new() }, "Sign in" }
                    }
                }
            }
        }
    }
}
