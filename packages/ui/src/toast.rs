//! Transient notifications for global and network errors.

use std::time::Duration;

use dioxus::prelude::*;

use crate::icons::{FaCircleCheck, FaCircleExclamation, FaCircleInfo, FaTriangleExclamation, FaXmark};
use crate::Icon;

const DISMISS_AFTER: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl ToastLevel {
    fn class(&self) -> &'static str {
        match self {
            ToastLevel::Info => "toast toast-info",
            ToastLevel::Success => "toast toast-success",
            ToastLevel::Warning => "toast toast-warning",
            ToastLevel::Error => "toast toast-error",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Toast {
    pub id: usize,
    pub level: ToastLevel,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct ToastList {
    next_id: usize,
    toasts: Vec<Toast>,
}

/// Handle for raising toasts. Cheap to copy into event handlers.
#[derive(Clone, Copy, PartialEq)]
pub struct Toasts {
    list: Signal<ToastList>,
}

impl Toasts {
    pub fn show(&self, level: ToastLevel, message: impl Into<String>) {
        let mut list = self.list;
        let id = {
            let mut list = list.write();
            let id = list.next_id;
            list.next_id += 1;
            list.toasts.push(Toast {
                id,
                level,
                message: message.into(),
            });
            id
        };
        // Outlive the component that raised the toast.
        spawn_forever(async move {
            store::time::sleep(DISMISS_AFTER).await;
            list.write().toasts.retain(|t| t.id != id);
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.show(ToastLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.show(ToastLevel::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.show(ToastLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.show(ToastLevel::Error, message);
    }

    pub fn dismiss(&self, id: usize) {
        let mut list = self.list;
        list.write().toasts.retain(|t| t.id != id);
    }
}

pub fn use_toast() -> Toasts {
    use_context::<Toasts>()
}

#[component]
pub fn ToastProvider(children: Element) -> Element {
    let list = use_signal(ToastList::default);
    let toasts = use_context_provider(|| Toasts { list });

    rsx! {
        {children}
        div {
            class: "toast-stack",
            for toast in list().toasts {
                div {
                    key: "{toast.id}",
                    class: toast.level.class(),
                    match toast.level {
                        ToastLevel::Info => rsx! { Icon { icon: FaCircleInfo, width: 14, height: 14 } },
                        ToastLevel::Success => rsx! { Icon { icon: FaCircleCheck, width: 14, height: 14 } },
                        ToastLevel::Warning => rsx! { Icon { icon: FaTriangleExclamation, width: 14, height: 14 } },
                        ToastLevel::Error => rsx! { Icon { icon: FaCircleExclamation, width: 14, height: 14 } },
                    }
                    span { "{toast.message}" }
                    button {
                        class: "toast-close",
                        onclick: move |_| toasts.dismiss(toast.id),
                        Icon { icon: FaXmark, width: 12, height: 12 }
                    }
                }
            }
        }
    }
}
