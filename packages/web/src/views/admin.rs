//! Admin area. Read-only: platform totals come from the HTTP API.

use api::ApiError;
use dioxus::prelude::*;
use ui::components::{Button, ButtonVariant, Spinner};
use ui::format::format_amount;
use ui::icons::{FaArrowsRotate, FaChartLine};
use ui::{use_api_client, Icon};

use crate::Route;

#[component]
pub fn Admin() -> Element {
    rsx! {
        div {
            class: "page-header",
            h1 { "Admin" }
        }
        div {
            class: "card-grid",
            Link {
                to: Route::AdminStatsPage {},
                class: "card card-link",
                Icon { icon: FaChartLine, width: 24, height: 24 }
                h2 { "Platform statistics" }
                p { class: "muted", "Users, deposits, withdrawals and open requests." }
            }
        }
    }
}

#[component]
pub fn AdminStatsPage() -> Element {
    let client = use_api_client(use_route::<Route>().to_string());

    let mut stats = use_resource(move || {
        let client = client.clone();
        async move { client.admin_stats().await }
    });

    let body = match &*stats.read() {
        None => rsx! { Spinner { label: "Loading statistics..." } },
        Some(Err(ApiError::Unauthorized)) => rsx! {},
        // Already raised as a toast.
        Some(Err(ApiError::Server { .. })) => rsx! {
            div { class: "form-error", role: "alert", "Statistics are unavailable right now." }
        },
        Some(Err(e)) => rsx! {
            div { class: "form-error", role: "alert", "Could not load statistics: {e}" }
        },
        Some(Ok(stats)) => rsx! {
            div {
                class: "stat-grid",
                div { class: "stat-card",
                    span { class: "stat-label", "Users" }
                    span { class: "stat-value", "{stats.total_users}" }
                }
                div { class: "stat-card",
                    span { class: "stat-label", "Total deposits" }
                    span { class: "stat-value", "{format_amount(stats.total_deposits)}" }
                }
                div { class: "stat-card",
                    span { class: "stat-label", "Total withdrawals" }
                    span { class: "stat-value", "{format_amount(stats.total_withdrawals)}" }
                }
                div { class: "stat-card",
                    span { class: "stat-label", "Pending requests" }
                    span { class: "stat-value", "{stats.pending_transactions}" }
                }
                div { class: "stat-card",
                    span { class: "stat-label", "Active investments" }
                    span { class: "stat-value", "{stats.active_investments}" }
                }
            }
        },
    };

    rsx! {
        div {
            class: "page-header",
            h1 { "Platform statistics" }
            Button {
                variant: ButtonVariant::Ghost,
                onclick: move |_| stats.restart(),
                Icon { icon: FaArrowsRotate, width: 14, height: 14 }
                " Refresh"
            }
        }
        {body}
    }
}
