use api::BackendConfig;
use dioxus::prelude::*;
use store::{Requirement, Role};

use ui::{AppErrorBoundary, AuthProvider, FatalConfig, Navbar, Protected, ToastProvider};
use views::{
    Admin, AdminStatsPage, Dashboard, Deposit, ForgotPassword, Home, Invest, Login, NotFound,
    Register, ResetPassword, Settings, Unauthorized, VerifyEmail, Withdraw,
};

mod views;

#[derive(Debug, Clone, Routable, PartialEq)]
#[rustfmt::skip]
enum Route {
    #[layout(Shell)]
        #[route("/")]
        Home {},
        #[route("/login?:redirect")]
        Login { redirect: String },
        #[route("/register")]
        Register {},
        #[route("/verify-email?:email")]
        VerifyEmail { email: String },
        #[route("/forgot-password")]
        ForgotPassword {},
        #[route("/reset-password")]
        ResetPassword {},
        #[route("/unauthorized")]
        Unauthorized {},

        #[layout(RequireAuth)]
            #[route("/dashboard")]
            Dashboard {},
            #[route("/settings")]
            Settings {},
        #[end_layout]

        #[layout(RequireVerified)]
            #[route("/invest")]
            Invest {},
            #[route("/deposit")]
            Deposit {},
            #[route("/withdraw")]
            Withdraw {},
        #[end_layout]

        #[layout(RequireAdmin)]
            #[route("/admin")]
            Admin {},
            #[route("/admin/stats")]
            AdminStatsPage {},
        #[end_layout]

        #[route("/:..segments")]
        NotFound { segments: Vec<String> },
}

const MAIN_CSS: Asset = asset!("/assets/main.css");

fn main() {
    dioxus::logger::initialize_default();
    dioxus::launch(App);
}

#[component]
fn App() -> Element {
    let config = use_hook(|| {
        BackendConfig::from_env().map_err(|e| {
            tracing::error!("invalid backend configuration: {e}");
            e.to_string()
        })
    });

    rsx! {
        document::Link { rel: "stylesheet", href: MAIN_CSS }

        match config {
            Ok(config) => rsx! {
                ConfiguredApp { config }
            },
            Err(error) => rsx! {
                FatalConfig { error }
            },
        }
    }
}

#[component]
fn ConfiguredApp(config: BackendConfig) -> Element {
    use_context_provider(|| config);

    rsx! {
        AppErrorBoundary {
            ToastProvider {
                Router::<Route> {}
            }
        }
    }
}

/// Layout for every route: owns the session and renders the top bar.
#[component]
fn Shell() -> Element {
    let config = use_context::<BackendConfig>();

    rsx! {
        AuthProvider {
            config,
            Navbar {
                brand: rsx! {
                    Link { to: Route::Home {}, "Yieldnest" }
                },
                NavLinks {}
            }
            main {
                class: "page",
                Outlet::<Route> {}
            }
        }
    }
}

#[component]
fn NavLinks() -> Element {
    let session = ui::use_session();
    let state = session.read();

    match state.user() {
        Some(user) => {
            let is_admin = user.is_admin();
            rsx! {
                Link { to: Route::Dashboard {}, "Dashboard" }
                Link { to: Route::Invest {}, "Invest" }
                Link { to: Route::Deposit {}, "Deposit" }
                Link { to: Route::Withdraw {}, "Withdraw" }
                Link { to: Route::Settings {}, "Settings" }
                if is_admin {
                    Link { to: Route::Admin {}, "Admin" }
                }
            }
        }
        None => rsx! {
            Link { to: Route::Login { redirect: String::new() }, "Log in" }
            Link { to: Route::Register {}, class: "btn btn-primary", "Get started" }
        },
    }
}

#[component]
fn RequireAuth() -> Element {
    guarded(Requirement::Authenticated)
}

#[component]
fn RequireVerified() -> Element {
    guarded(Requirement::EmailVerified)
}

#[component]
fn RequireAdmin() -> Element {
    guarded(Requirement::Role(Role::Admin))
}

fn guarded(requirement: Requirement) -> Element {
    let target = use_route::<Route>().to_string();
    rsx! {
        Protected {
            requirement,
            target,
            Outlet::<Route> {}
        }
    }
}
