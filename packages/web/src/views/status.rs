use dioxus::prelude::*;
use ui::icons::{FaCompass, FaLock};
use ui::Icon;

use crate::Route;

#[component]
pub fn Unauthorized() -> Element {
    rsx! {
        div {
            class: "status-page",
            Icon { icon: FaLock, width: 40, height: 40 }
            h1 { "Access denied" }
            p { "You don't have permission to view that page." }
            Link { to: Route::Dashboard {}, class: "btn btn-primary", "Back to your dashboard" }
        }
    }
}

#[component]
pub fn NotFound(segments: Vec<String>) -> Element {
    let path = format!("/{}", segments.join("/"));
    tracing::debug!(%path, "no route matched");

    rsx! {
        div {
            class: "status-page",
            Icon { icon: FaCompass, width: 40, height: 40 }
            h1 { "Page not found" }
            p { "There is nothing at " code { "{path}" } "." }
            Link { to: Route::Home {}, class: "btn btn-primary", "Go home" }
        }
    }
}
