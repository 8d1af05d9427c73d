use dioxus::prelude::*;
use store::{AuthError, InvestmentPlan, InvestmentStatus, NewInvestment};
use ui::components::{Button, ButtonVariant, FormError, Input, Spinner};
use ui::format::{format_amount, parse_amount};
use ui::{describe, use_auth, use_dashboard, use_investment_plans, use_toast, use_user_id};

use super::home::PlanCard;
use crate::Route;

#[component]
pub fn Invest() -> Element {
    let plans = use_investment_plans();
    let user_id = use_user_id();
    let dashboard = use_dashboard(user_id);
    let selected = use_signal(|| None::<String>);

    let state = plans.state();
    let balance = dashboard.state().data.map(|d| d.stats.balance);

    let active: Vec<InvestmentPlan> = state
        .data
        .as_ref()
        .map(|rows| {
            rows.sorted_by_key(|p| p.min_amount)
                .into_iter()
                .filter(|p| p.is_active)
                .collect()
        })
        .unwrap_or_default();
    // A plan that went inactive or was deleted while selected drops out.
    let chosen = selected().and_then(|id| active.iter().find(|p| p.id == id).cloned());
    let chosen_id = chosen.as_ref().map(|p| p.id.clone());

    rsx! {
        div {
            class: "page-header",
            h1 { "Invest" }
            if let Some(balance) = balance {
                span { class: "muted", "Available balance: {format_amount(balance)}" }
            }
        }

        if let Some(message) = state.error.clone() {
            div { class: "form-error", role: "alert", "{message}" }
        }

        if state.data.is_none() {
            Spinner { label: "Loading plans..." }
        } else if active.is_empty() {
            p { class: "muted", "No plans are open right now. Check back soon." }
        } else {
            div {
                class: "plan-grid",
                for plan in active {
                    PlanCard {
                        key: "{plan.id}",
                        plan: plan.clone(),
                        ChooseButton {
                            id: plan.id.clone(),
                            active: chosen_id.as_deref() == Some(plan.id.as_str()),
                            selected,
                        }
                    }
                }
            }
        }

        if let Some(plan) = chosen {
            InvestForm { key: "{plan.id}", plan, balance }
        }
    }
}

#[component]
fn ChooseButton(id: String, active: bool, selected: Signal<Option<String>>) -> Element {
    let mut selected = selected;
    let variant = if active { ButtonVariant::Primary } else { ButtonVariant::Secondary };
    rsx! {
        Button {
            variant,
            onclick: move |_| selected.set(Some(id.clone())),
            if active { "Selected" } else { "Choose" }
        }
    }
}

#[component]
fn InvestForm(plan: InvestmentPlan, balance: Option<rust_decimal::Decimal>) -> Element {
    let auth = use_auth();
    let toasts = use_toast();
    let nav = use_navigator();
    let mut amount = use_signal(String::new);
    let mut error = use_signal(|| None::<String>);
    let mut busy = use_signal(|| false);

    let limits = match plan.max_amount {
        Some(max) => format!("between {} and {}", format_amount(plan.min_amount), format_amount(max)),
        None => format!("at least {}", format_amount(plan.min_amount)),
    };

    let onsubmit = {
        let plan = plan.clone();
        let limits = limits.clone();
        move |evt: FormEvent| {
            evt.prevent_default();
            let auth = auth.clone();
            let plan = plan.clone();
            let limits = limits.clone();
            async move {
                let Some(value) = parse_amount(&amount()) else {
                    error.set(Some("Enter a positive amount with at most two decimals.".into()));
                    return;
                };
                if !plan.accepts(value) {
                    error.set(Some(format!("{} takes amounts {limits}.", plan.name)));
                    return;
                }
                if balance.is_some_and(|b| value > b) {
                    error.set(Some("That is more than your available balance.".into()));
                    return;
                }
                let (Some(user), Some(token)) = (auth.user(), auth.access_token()) else {
                    error.set(Some(AuthError::NotAuthenticated.to_string()));
                    return;
                };

                busy.set(true);
                error.set(None);
                let request = NewInvestment {
                    user_id: user.id,
                    plan_id: plan.id.clone(),
                    amount: value,
                    status: InvestmentStatus::Active,
                };
                let result = auth.backend().create_investment(&token, &request).await;
                busy.set(false);
                match result {
                    Ok(investment) => {
                        tracing::info!(id = %investment.id, "investment created");
                        toasts.success(format!(
                            "Invested {} in {}.",
                            format_amount(investment.amount),
                            plan.name
                        ));
                        nav.push(Route::Dashboard {});
                    }
                    Err(e) => error.set(Some(describe(&e))),
                }
            }
        }
    };

    rsx! {
        section {
            class: "card",
            h2 { "Invest in {plan.name}" }
            p { class: "muted", "This plan takes amounts {limits}." }
            FormError { message: error() }
            form {
                onsubmit: onsubmit,
                Input {
                    label: "Amount (USD)",
                    placeholder: "{format_amount(plan.min_amount)}",
                    value: amount(),
                    oninput: move |e: FormEvent| amount.set(e.value()),
                }
                Button {
                    r#type: "submit",
                    disabled: busy(),
                    "Confirm investment"
                }
            }
        }
    }
}
