//! Deposit and withdrawal requests. Both create a `pending` transaction;
//! settlement happens on the backend and shows up through the live list.

use std::cmp::Reverse;

use dioxus::prelude::*;
use store::{NewTransaction, TransactionType};
use ui::components::{Button, FormError, Input, Spinner};
use ui::format::{format_amount, parse_amount};
use ui::{describe, use_auth, use_dashboard, use_toast, use_transactions, use_user_id};

use super::dashboard::TransactionRow;

#[component]
pub fn Deposit() -> Element {
    rsx! {
        TransactionForm { kind: TransactionType::Deposit }
    }
}

#[component]
pub fn Withdraw() -> Element {
    rsx! {
        TransactionForm { kind: TransactionType::Withdrawal }
    }
}

#[component]
fn TransactionForm(kind: TransactionType) -> Element {
    let auth = use_auth();
    let toasts = use_toast();
    let user_id = use_user_id();
    let dashboard = use_dashboard(user_id);
    let history = use_transactions(user_id);
    let mut amount = use_signal(String::new);
    let mut error = use_signal(|| None::<String>);
    let mut busy = use_signal(|| false);

    let (title, verb) = match kind {
        TransactionType::Deposit => ("Deposit funds", "Request deposit"),
        TransactionType::Withdrawal => ("Withdraw funds", "Request withdrawal"),
    };
    let balance = dashboard.state().data.map(|d| d.stats.balance);

    let onsubmit = {
        let dashboard = dashboard.clone();
        move |evt: FormEvent| {
            evt.prevent_default();
            let auth = auth.clone();
            let dashboard = dashboard.clone();
            async move {
                let Some(value) = parse_amount(&amount()) else {
                    error.set(Some("Enter a positive amount with at most two decimals.".into()));
                    return;
                };
                if kind == TransactionType::Withdrawal && balance.is_some_and(|b| value > b) {
                    error.set(Some("That is more than your available balance.".into()));
                    return;
                }
                let (Some(user), Some(token)) = (auth.user(), auth.access_token()) else {
                    error.set(Some(store::AuthError::NotAuthenticated.to_string()));
                    return;
                };

                busy.set(true);
                error.set(None);
                let request = NewTransaction::pending(user.id, kind, value);
                let result = auth.backend().create_transaction(&token, &request).await;
                busy.set(false);
                match result {
                    Ok(tx) => {
                        tracing::info!(id = %tx.id, "transaction requested");
                        toasts.success(format!(
                            "{} of {} submitted for review.",
                            if kind == TransactionType::Deposit { "Deposit" } else { "Withdrawal" },
                            format_amount(tx.amount)
                        ));
                        amount.set(String::new());
                        dashboard.refresh();
                    }
                    Err(e) => error.set(Some(describe(&e))),
                }
            }
        }
    };

    let state = history.state();
    let rows = state
        .data
        .map(|rows| {
            let mut rows = rows.sorted_by_key(|t| Reverse(t.created_at));
            rows.retain(|t| t.kind == kind);
            rows
        });

    rsx! {
        div {
            class: "page-header",
            h1 { "{title}" }
            if let Some(balance) = balance {
                span { class: "muted", "Available balance: {format_amount(balance)}" }
            }
        }

        section {
            class: "card",
            FormError { message: error() }
            form {
                onsubmit: onsubmit,
                Input {
                    label: "Amount (USD)",
                    placeholder: "100.00",
                    value: amount(),
                    oninput: move |e: FormEvent| amount.set(e.value()),
                }
                Button {
                    r#type: "submit",
                    disabled: busy(),
                    "{verb}"
                }
            }
            p { class: "muted", "Requests stay pending until they are confirmed by our team." }
        }

        section {
            class: "card",
            h2 { "History" }
            if let Some(message) = state.error.clone() {
                div { class: "form-error", role: "alert", "{message}" }
            }
            match rows {
                None => rsx! { Spinner {} },
                Some(rows) if rows.is_empty() => rsx! { p { class: "muted", "No requests yet." } },
                Some(rows) => rsx! {
                    ul {
                        class: "tx-list",
                        for tx in rows {
                            TransactionRow { key: "{tx.id}", tx }
                        }
                    }
                },
            }
        }
    }
}
