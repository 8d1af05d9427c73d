use dioxus::prelude::*;

use crate::auth::{use_session, LogoutButton, SessionIndicator};

/// Top bar. `children` are the navigation links; the session controls are
/// appended on the right for signed-in users.
#[component]
pub fn Navbar(brand: Element, children: Element) -> Element {
    let session = use_session();
    let name = use_memo(move || session.read().user().map(|u| u.display_name().to_string()));

    rsx! {
        nav {
            class: "navbar",
            div { class: "navbar-brand", {brand} }
            div { class: "navbar-links", {children} }
            div {
                class: "navbar-session",
                SessionIndicator {}
                if let Some(name) = name() {
                    span { class: "navbar-user", "{name}" }
                    LogoutButton { class: "btn btn-ghost" }
                }
            }
        }
    }
}
