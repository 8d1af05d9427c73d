//! Route guard components.

use dioxus::prelude::*;
use store::guard::{decide, post_login_target, GuardDecision, Requirement};

use crate::auth::use_session;
use crate::components::Spinner;

/// Renders `children` only when the session satisfies `requirement`.
///
/// `target` is the URL being guarded; anonymous visitors are sent to the
/// login page with it as the `redirect` parameter.
#[component]
pub fn Protected(requirement: Requirement, target: String, children: Element) -> Element {
    let session = use_session();
    let nav = use_navigator();

    let decision = use_memo(use_reactive!(|(requirement, target)| {
        decide(&session.read(), &requirement, &target)
    }));

    use_effect(move || {
        if let GuardDecision::Redirect(to) = decision() {
            tracing::debug!(%to, "guard redirect");
            let _ = nav.replace(to);
        }
    });

    match decision() {
        GuardDecision::Allow => rsx! {
            {children}
        },
        GuardDecision::Loading | GuardDecision::Redirect(_) => rsx! {
            Spinner { label: "Checking your session..." }
        },
    }
}

/// For login and registration: signed-in visitors are sent on to
/// `redirect` (or the dashboard).
#[component]
pub fn GuestOnly(#[props(default)] redirect: Option<String>, children: Element) -> Element {
    let session = use_session();
    let nav = use_navigator();
    let authenticated = use_memo(move || session.read().is_authenticated());

    use_effect(use_reactive!(|redirect| {
        if authenticated() {
            let _ = nav.replace(post_login_target(redirect.as_deref()));
        }
    }));

    if session.read().is_loading() {
        return rsx! {
            Spinner {}
        };
    }

    rsx! {
        {children}
    }
}
