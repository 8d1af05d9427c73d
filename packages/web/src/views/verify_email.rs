use dioxus::prelude::*;
use store::guard::DEFAULT_LANDING_PATH;
use ui::components::{Button, ButtonVariant, FormError};
use ui::icons::FaEnvelope;
use ui::{use_auth, use_session, use_toast, Icon};

use crate::Route;

/// Shown after sign-up when the project requires email confirmation, and to
/// signed-in users whose address is not confirmed yet.
#[component]
pub fn VerifyEmail(email: String) -> Element {
    let auth = use_auth();
    let session = use_session();
    let toasts = use_toast();
    let nav = use_navigator();
    let mut error = use_signal(|| None::<String>);
    let mut busy = use_signal(|| false);

    let verified = use_memo(move || session.read().user().is_some_and(|u| u.email_verified));
    use_effect(move || {
        if verified() {
            nav.replace(DEFAULT_LANDING_PATH);
        }
    });

    // Prefer the signed-in user's address over the query parameter.
    let address = session
        .read()
        .user()
        .map(|u| u.email.clone())
        .unwrap_or(email);

    let resend = {
        let auth = auth.clone();
        let address = address.clone();
        move |_| {
            let controller = auth.controller();
            let address = address.clone();
            async move {
                busy.set(true);
                error.set(None);
                match controller.resend_confirmation(&address).await {
                    Ok(()) => toasts.info("Confirmation email sent."),
                    Err(e) => error.set(Some(e.to_string())),
                }
                busy.set(false);
            }
        }
    };

    let recheck = move |_| {
        let controller = auth.controller();
        async move {
            if let Err(e) = controller.revalidate().await {
                toasts.error(e.to_string());
            }
        }
    };

    rsx! {
        div {
            class: "auth-card",
            Icon { icon: FaEnvelope, width: 40, height: 40 }
            h1 { "Check your inbox" }
            if address.is_empty() {
                p { "We sent you a confirmation link. Open it to activate your account." }
            } else {
                p { "We sent a confirmation link to " strong { "{address}" } ". Open it to activate your account." }
            }

            FormError { message: error() }

            div {
                class: "button-row",
                if !address.is_empty() {
                    Button {
                        variant: ButtonVariant::Secondary,
                        disabled: busy(),
                        onclick: resend,
                        "Resend email"
                    }
                }
                if session.read().is_authenticated() {
                    Button {
                        variant: ButtonVariant::Ghost,
                        onclick: recheck,
                        "I've confirmed it"
                    }
                } else {
                    Link { to: Route::Login { redirect: String::new() }, class: "btn btn-ghost", "Back to sign in" }
                }
            }
        }
    }
}
