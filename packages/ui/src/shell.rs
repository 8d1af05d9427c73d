//! Top-level screens outside the normal page flow.

use dioxus::prelude::*;

use crate::components::{Button, Spinner};
use crate::icons::{FaGear, FaTriangleExclamation};
use crate::Icon;

/// Catches render errors anywhere below it and offers a reload.
#[component]
pub fn AppErrorBoundary(children: Element) -> Element {
    rsx! {
        ErrorBoundary {
            handle_error: |errors: ErrorContext| {
                for error in errors.errors().iter() {
                    tracing::error!("render error: {error}");
                }
                rsx! {
                    div {
                        class: "fatal-screen",
                        Icon { icon: FaTriangleExclamation, width: 32, height: 32 }
                        h1 { "Something went wrong" }
                        p { "An unexpected error occurred. Reloading the page usually fixes it." }
                        Button {
                            onclick: move |_| {
                                let _ = document::eval("window.location.reload()");
                            },
                            "Reload"
                        }
                    }
                }
            },
            {children}
        }
    }
}

/// Shown instead of the app when the backend configuration is unusable.
#[component]
pub fn FatalConfig(error: String) -> Element {
    rsx! {
        div {
            class: "fatal-screen",
            Icon { icon: FaGear, width: 32, height: 32 }
            h1 { "Configuration error" }
            p { "The application is not configured correctly and cannot start." }
            pre { class: "fatal-detail", "{error}" }
        }
    }
}

/// Call-to-action block for pages reached without the data they need.
#[component]
pub fn EmptyState(title: String, message: String, children: Element) -> Element {
    rsx! {
        div {
            class: "empty-state",
            h2 { "{title}" }
            p { "{message}" }
            {children}
        }
    }
}
