use dioxus::prelude::*;
use store::InvestmentPlan;
use ui::components::Spinner;
use ui::format::{format_amount, format_percent};
use ui::icons::FaCheck;
use ui::{use_investment_plans, use_session, Icon};

use crate::Route;

#[component]
pub fn Home() -> Element {
    let session = use_session();
    let plans = use_investment_plans();
    let state = plans.state();

    let cta = if session.read().is_authenticated() {
        rsx! { Link { to: Route::Dashboard {}, class: "btn btn-primary", "Go to dashboard" } }
    } else {
        rsx! { Link { to: Route::Register {}, class: "btn btn-primary", "Start investing" } }
    };

    rsx! {
        section {
            class: "hero",
            h1 { "Grow your savings with fixed-return plans" }
            p { class: "lead", "Pick a plan, fund it, and watch your returns on a live dashboard." }
            {cta}
        }

        section {
            class: "plans",
            h2 { "Investment plans" }
            if let Some(message) = state.error.clone() {
                p { class: "form-error", "{message}" }
            }
            match state.data {
                None => rsx! { Spinner { label: "Loading plans..." } },
                Some(rows) => {
                    let active: Vec<InvestmentPlan> = rows
                        .sorted_by_key(|p| p.min_amount)
                        .into_iter()
                        .filter(|p| p.is_active)
                        .collect();
                    rsx! {
                        div {
                            class: "plan-grid",
                            for plan in active {
                                PlanCard { key: "{plan.id}", plan }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[component]
pub fn PlanCard(plan: InvestmentPlan, children: Element) -> Element {
    let range = match plan.max_amount {
        Some(max) => format!("{} - {}", format_amount(plan.min_amount), format_amount(max)),
        None => format!("From {}", format_amount(plan.min_amount)),
    };

    rsx! {
        div {
            class: "plan-card",
            h3 { "{plan.name}" }
            p { class: "plan-rate", "{format_percent(plan.return_percentage)}" }
            p { class: "muted", "over {plan.duration_days} days" }
            p { "{range}" }
            p { class: "muted", "Total return {format_percent(plan.total_return)}" }
            ul {
                class: "plan-features",
                for feature in plan.features.iter() {
                    li {
                        Icon { icon: FaCheck, width: 12, height: 12 }
                        " {feature}"
                    }
                }
            }
            {children}
        }
    }
}
