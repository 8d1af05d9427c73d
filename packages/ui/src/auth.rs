//! Authentication context and hooks for the UI.
//!
//! [`AuthProvider`] owns the [`SessionController`] and its background tasks;
//! components read the session through [`use_auth`] / [`use_session`] and
//! never write it.

use std::rc::Rc;

use api::{ApiClient, ApiError, Backend, BackendConfig};
use dioxus::prelude::*;
use store::guard::{login_redirect, LOGIN_PATH};
use store::{SessionConfig, SessionController, SessionState, User};

use crate::icons::{FaArrowsRotate, FaCircleUser, FaUserSlash};
use crate::toast::use_toast;
use crate::Icon;

pub type Controller = SessionController<Backend>;

/// Resolves once per `visibilitychange` to "visible".
const VISIBILITY_JS: &str = r#"
document.addEventListener("visibilitychange", () => {
    if (document.visibilityState === "visible") {
        dioxus.send(true);
    }
});
"#;

/// Read-only view of the session plus access to the controller's
/// operations.
#[derive(Clone)]
pub struct Auth {
    controller: Rc<Controller>,
    state: Signal<SessionState>,
}

impl Auth {
    /// Current state. Reading it subscribes the calling component.
    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn state_signal(&self) -> ReadOnlySignal<SessionState> {
        self.state.into()
    }

    pub fn user(&self) -> Option<User> {
        self.state.read().user().cloned()
    }

    pub fn controller(&self) -> Rc<Controller> {
        self.controller.clone()
    }

    pub fn backend(&self) -> Backend {
        self.controller.backend().clone()
    }

    /// Token for bearer headers. Not reactive.
    pub fn access_token(&self) -> Option<String> {
        self.controller.access_token()
    }
}

pub fn use_auth() -> Auth {
    use_context::<Auth>()
}

pub fn use_session() -> ReadOnlySignal<SessionState> {
    use_auth().state_signal()
}

/// Id of the signed-in user, changing only when the user does.
pub fn use_user_id() -> Memo<Option<String>> {
    let session = use_session();
    use_memo(move || session.read().user().map(|u| u.id.clone()))
}

/// [`ApiClient`] bound to the current session.
///
/// Server errors are raised as toasts. A 401 ends the session and sends the
/// user to the login page, returning to `current_path` afterwards.
pub fn use_api_client(current_path: String) -> ApiClient {
    let auth = use_auth();
    let toasts = use_toast();
    let nav = use_navigator();

    use_hook(move || {
        let controller = auth.controller();
        let tokens = {
            let controller = controller.clone();
            move || controller.access_token()
        };
        let backend = auth.backend();
        ApiClient::new(backend.config(), tokens)
            .on_unauthorized(move || {
                controller.expire_session();
                toasts.warning(ApiError::Unauthorized.to_string());
                let _ = nav.replace(login_redirect(&current_path));
            })
            .on_error(move |err| toasts.error(err.to_string()))
    })
}

/// Provider component that owns the session. Must be rendered inside the
/// router so logout can navigate.
#[component]
pub fn AuthProvider(config: BackendConfig, children: Element) -> Element {
    let nav = use_navigator();
    let state = use_signal(SessionState::default);

    let auth = use_context_provider(|| {
        let controller = SessionController::new(Backend::new(config.clone()), SessionConfig::default())
            .on_signed_out(move || {
                let _ = nav.replace(LOGIN_PATH);
            });
        Auth {
            controller: Rc::new(controller),
            state,
        }
    });

    let tasks = use_hook(|| {
        let controller = auth.controller();
        let mut tasks = Vec::new();

        // Mirror the controller's watch channel into a signal.
        let mut rx = controller.subscribe();
        let mut state = state;
        tasks.push(spawn(async move {
            loop {
                let next = rx.borrow_and_update().clone();
                state.set(next);
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }));

        let c = controller.clone();
        tasks.push(spawn(async move { c.run_event_loop().await }));
        let c = controller.clone();
        tasks.push(spawn(async move { c.initialize().await }));
        let c = controller.clone();
        tasks.push(spawn(async move { c.run_refresh_loop().await }));
        let c = controller.clone();
        tasks.push(spawn(async move { c.run_recheck_loop().await }));

        let c = controller;
        tasks.push(spawn(async move {
            let mut visibility = document::eval(VISIBILITY_JS);
            while let Ok(true) = visibility.recv::<bool>().await {
                tracing::debug!("tab visible again, re-checking session");
                let _ = c.revalidate().await;
            }
        }));

        tasks
    });

    use_drop(move || {
        for task in tasks {
            task.cancel();
        }
    });

    rsx! {
        {children}
    }
}

/// Button to log out the current user.
#[component]
pub fn LogoutButton(
    #[props(default = "Log out".to_string())] label: String,
    #[props(default = "".to_string())] class: String,
) -> Element {
    let auth = use_auth();
    let mut busy = use_signal(|| false);

    let onclick = move |_| {
        let controller = auth.controller();
        async move {
            busy.set(true);
            controller.logout().await;
            busy.set(false);
        }
    };

    rsx! {
        button {
            class: "{class}",
            disabled: busy(),
            onclick: onclick,
            "{label}"
        }
    }
}

/// A small icon that shows where the session stands.
///
/// - **Signed in**: user icon
/// - **Refreshing**: rotating arrows while the token is re-issued
/// - **Signed out**: slashed user
#[component]
pub fn SessionIndicator() -> Element {
    let session = use_session();

    let indicator = match &*session.read() {
        SessionState::Uninitialized | SessionState::Checking => rsx! {},
        SessionState::Authenticated(auth) => rsx! {
            span {
                class: "session-indicator session-indicator--active",
                title: "Signed in as {auth.user.email}",
                Icon { icon: FaCircleUser, width: 14, height: 14 }
            }
        },
        SessionState::Refreshing(_) => rsx! {
            span {
                class: "session-indicator session-indicator--refreshing",
                title: "Refreshing session",
                Icon { icon: FaArrowsRotate, width: 14, height: 14 }
            }
        },
        SessionState::Anonymous => rsx! {
            span {
                class: "session-indicator session-indicator--anonymous",
                title: "Signed out",
                Icon { icon: FaUserSlash, width: 14, height: 14 }
            }
        },
    };
    indicator
}
