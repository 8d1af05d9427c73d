//! Profile details and password change for the signed-in user.

use dioxus::prelude::*;
use store::ProfileUpdate;
use ui::components::{Button, ButtonVariant, FormError, Input};
use ui::{use_auth, use_session, use_toast};

use super::check_password;

#[component]
pub fn Settings() -> Element {
    let session = use_session();
    let user = session.read().user().cloned();

    rsx! {
        div {
            class: "page-header",
            h1 { "Settings" }
        }
        if let Some(user) = user {
            section {
                class: "card",
                h2 { "Account" }
                dl {
                    class: "facts",
                    dt { "Email" }
                    dd {
                        "{user.email}"
                        if !user.email_verified {
                            span { class: "badge badge-pending", "unverified" }
                        }
                    }
                    dt { "Role" }
                    dd { "{user.role.as_str()}" }
                    if let Some(kyc) = user.kyc_status.clone() {
                        dt { "Verification" }
                        dd { "{kyc}" }
                    }
                }
            }
            ProfileForm {
                key: "{user.id}",
                full_name: user.full_name.clone().unwrap_or_default(),
                phone: user.phone.clone().unwrap_or_default(),
            }
            PasswordForm {}
        }
    }
}

#[component]
fn ProfileForm(full_name: String, phone: String) -> Element {
    let auth = use_auth();
    let toasts = use_toast();
    let mut name = use_signal(|| full_name);
    let mut phone = use_signal(|| phone);
    let mut error = use_signal(|| None::<String>);
    let mut busy = use_signal(|| false);

    let onsubmit = {
        let auth = auth.clone();
        move |evt: FormEvent| {
            evt.prevent_default();
            let controller = auth.controller();
            async move {
                let update = ProfileUpdate {
                    full_name: Some(name().trim().to_string()),
                    phone: Some(phone().trim().to_string()),
                };
                busy.set(true);
                error.set(None);
                let result = controller.update_profile(update).await;
                busy.set(false);
                match result {
                    Ok(_) => toasts.success("Profile saved."),
                    Err(e) => error.set(Some(e.to_string())),
                }
            }
        }
    };

    let reload = move |_| {
        let controller = auth.controller();
        async move {
            match controller.refresh_user().await {
                Ok(Some(user)) => {
                    name.set(user.full_name.unwrap_or_default());
                    phone.set(user.phone.unwrap_or_default());
                }
                Ok(None) => {}
                Err(e) => toasts.error(e.to_string()),
            }
        }
    };

    rsx! {
        section {
            class: "card",
            h2 { "Profile" }
            FormError { message: error() }
            form {
                onsubmit: onsubmit,
                Input {
                    label: "Full name",
                    value: name(),
                    oninput: move |e: FormEvent| name.set(e.value()),
                }
                Input {
                    label: "Phone",
                    r#type: "tel",
                    value: phone(),
                    oninput: move |e: FormEvent| phone.set(e.value()),
                }
                div {
                    class: "button-row",
                    Button { r#type: "submit", disabled: busy(), "Save profile" }
                    Button { variant: ButtonVariant::Ghost, onclick: reload, "Reload" }
                }
            }
        }
    }
}

#[component]
fn PasswordForm() -> Element {
    let auth = use_auth();
    let toasts = use_toast();
    let mut password = use_signal(String::new);
    let mut confirm = use_signal(String::new);
    let mut error = use_signal(|| None::<String>);
    let mut busy = use_signal(|| false);

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
                    password.set(String::new());
                    confirm.set(String::new());
                    toasts.success("Password updated.");
                }
                Err(e) => error.set(Some(e.to_string())),
            }
        }
    };

    rsx! {
        section {
            class: "card",
            h2 { "Change password" }
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
                Button { r#type: "submit", disabled: busy(), "Update password" }
            }
        }
    }
}
