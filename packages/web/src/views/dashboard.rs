use dioxus::prelude::*;
use store::{DashboardStats, Investment, InvestmentStatus, Transaction, TransactionStatus, TransactionType};
use ui::components::{Button, ButtonVariant, Spinner};
use ui::format::{format_amount, format_date};
use ui::icons::{FaArrowDown, FaArrowUp, FaArrowsRotate};
use ui::{use_dashboard, use_session, use_user_id, EmptyState, Icon};

use crate::Route;

#[component]
pub fn Dashboard() -> Element {
    let session = use_session();
    let user_id = use_user_id();
    let dashboard = use_dashboard(user_id);
    let state = dashboard.state();

    let greeting = session
        .read()
        .user()
        .map(|u| u.display_name().to_string())
        .unwrap_or_default();

    let refresh = {
        let dashboard = dashboard.clone();
        move |_| dashboard.refresh()
    };

    rsx! {
        div {
            class: "page-header",
            h1 { "Hello, {greeting}" }
            Button {
                variant: ButtonVariant::Ghost,
                disabled: state.loading,
                onclick: refresh,
                Icon { icon: FaArrowsRotate, width: 14, height: 14 }
                " Refresh"
            }
        }

        if let Some(message) = state.error.clone() {
            div { class: "form-error", role: "alert", "{message}" }
        }

        match state.data {
            None if state.loading => rsx! { Spinner { label: "Loading your dashboard..." } },
            None => rsx! {},
            Some(data) => rsx! {
                StatCards { stats: data.stats }
                div {
                    class: "dashboard-grid",
                    RecentTransactions { transactions: data.recent_transactions }
                    Investments { investments: data.investments }
                }
            },
        }
    }
}

#[component]
fn StatCards(stats: DashboardStats) -> Element {
    rsx! {
        div {
            class: "stat-grid",
            div { class: "stat-card",
                span { class: "stat-label", "Available balance" }
                span { class: "stat-value", "{format_amount(stats.balance)}" }
            }
            div { class: "stat-card",
                span { class: "stat-label", "Invested" }
                span { class: "stat-value", "{format_amount(stats.total_invested)}" }
            }
            div { class: "stat-card",
                span { class: "stat-label", "Expected returns" }
                span { class: "stat-value", "{format_amount(stats.total_returns)}" }
            }
            div { class: "stat-card",
                span { class: "stat-label", "Active investments" }
                span { class: "stat-value", "{stats.active_investments}" }
            }
        }
    }
}

#[component]
fn RecentTransactions(transactions: Vec<Transaction>) -> Element {
    rsx! {
        section {
            class: "card",
            h2 { "Recent activity" }
            if transactions.is_empty() {
                EmptyState {
                    title: "No transactions yet",
                    message: "Fund your account to start investing.",
                    Link { to: Route::Deposit {}, class: "btn btn-primary", "Make a deposit" }
                }
            } else {
                ul {
                    class: "tx-list",
                    for tx in transactions {
                        TransactionRow { key: "{tx.id}", tx }
                    }
                }
            }
        }
    }
}

#[component]
pub fn TransactionRow(tx: Transaction) -> Element {
    let (label, sign) = match tx.kind {
        TransactionType::Deposit => ("Deposit", "+"),
        TransactionType::Withdrawal => ("Withdrawal", "-"),
    };
    let status = match tx.status {
        TransactionStatus::Pending => "pending",
        TransactionStatus::Completed => "completed",
        TransactionStatus::Failed => "failed",
    };

    rsx! {
        li {
            class: "tx-row",
            match tx.kind {
                TransactionType::Deposit => rsx! { Icon { icon: FaArrowDown, width: 14, height: 14 } },
                TransactionType::Withdrawal => rsx! { Icon { icon: FaArrowUp, width: 14, height: 14 } },
            }
            span { class: "tx-kind", "{label}" }
            span { class: "tx-date muted", "{format_date(&tx.created_at)}" }
            span { class: "tx-amount", "{sign}{format_amount(tx.amount)}" }
            span { class: "badge badge-{status}", "{status}" }
        }
    }
}

#[component]
fn Investments(investments: Vec<Investment>) -> Element {
    rsx! {
        section {
            class: "card",
            h2 { "Your investments" }
            if investments.is_empty() {
                EmptyState {
                    title: "Nothing invested yet",
                    message: "Choose a plan to put your balance to work.",
                    Link { to: Route::Invest {}, class: "btn btn-primary", "Browse plans" }
                }
            } else {
                ul {
                    class: "tx-list",
                    for inv in investments {
                        InvestmentRow { key: "{inv.id}", inv }
                    }
                }
            }
        }
    }
}

#[component]
fn InvestmentRow(inv: Investment) -> Element {
    let status = match inv.status {
        InvestmentStatus::Active => "active",
        InvestmentStatus::Completed => "completed",
        InvestmentStatus::Cancelled => "cancelled",
    };

    rsx! {
        li {
            class: "tx-row",
            span { class: "tx-kind", "{format_amount(inv.amount)}" }
            span { class: "tx-date muted", "{format_date(&inv.created_at)}" }
            span { class: "badge badge-{status}", "{status}" }
        }
    }
}
