//! Shared UI for the workspace: session context, data hooks, route guards
//! and the handful of components every page uses.

pub mod components;
pub mod format;
pub mod hooks;

// Re-export icon library
pub use dioxus_free_icons::Icon;
pub mod icons {
    pub use dioxus_free_icons::icons::fa_solid_icons::*;
}

mod auth;
pub use auth::{
    use_api_client, use_auth, use_session, use_user_id, Auth, AuthProvider, Controller, LogoutButton,
    SessionIndicator,
};

mod guard;
pub use guard::{GuestOnly, Protected};

mod navbar;
pub use navbar::Navbar;

mod shell;
pub use shell::{AppErrorBoundary, EmptyState, FatalConfig};

mod toast;
pub use toast::{use_toast, Toast, ToastLevel, ToastProvider, Toasts};

pub use hooks::{
    describe, use_dashboard, use_investment_plans, use_live_collection, use_query,
    use_transactions, QueryHandle,
};
