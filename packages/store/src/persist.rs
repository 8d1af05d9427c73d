//! # Session persistence
//!
//! The only client-side state that survives a reload is the current
//! [`Session`], stored as JSON under [`SESSION_KEY`].
//!
//! | Implementation | Platform | Backing |
//! |----------------|----------|---------|
//! | [`MemorySessionStorage`] | native, tests | process memory |
//! | [`LocalSessionStorage`] | wasm32 + `web` feature | `window.localStorage` |
//!
//! Storage failures are logged and otherwise ignored: an unreadable entry
//! behaves like no entry, so the visitor just starts signed out.

use std::cell::RefCell;
use std::rc::Rc;

use crate::models::Session;

pub const SESSION_KEY: &str = "yieldnest.auth.session";

pub trait SessionStorage {
    fn load_raw(&self) -> Option<String>;
    fn store_raw(&self, value: &str);
    fn clear(&self);

    fn load(&self) -> Option<Session> {
        let raw = self.load_raw()?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Discarding unreadable stored session: {e}");
                self.clear();
                None
            }
        }
    }

    fn store(&self, session: &Session) {
        match serde_json::to_string(session) {
            Ok(raw) => self.store_raw(&raw),
            Err(e) => tracing::warn!("Failed to encode session: {e}"),
        }
    }
}

/// In-memory storage. Clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionStorage {
    slot: Rc<RefCell<Option<String>>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load_raw(&self) -> Option<String> {
        self.slot.borrow().clone()
    }

    fn store_raw(&self, value: &str) {
        *self.slot.borrow_mut() = Some(value.to_string());
    }

    fn clear(&self) {
        self.slot.borrow_mut().take();
    }
}

#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub use local::LocalSessionStorage;

#[cfg(all(target_arch = "wasm32", feature = "web"))]
mod local {
    use super::{SessionStorage, SESSION_KEY};

    /// `window.localStorage`. Every call looks the storage up again so the
    /// struct stays `Clone` and zero-sized.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct LocalSessionStorage;

    fn storage() -> Option<web_sys::Storage> {
        web_sys::window()?.local_storage().ok().flatten()
    }

    impl SessionStorage for LocalSessionStorage {
        fn load_raw(&self) -> Option<String> {
            storage()?.get_item(SESSION_KEY).ok().flatten()
        }

        fn store_raw(&self, value: &str) {
            let Some(storage) = storage() else {
                tracing::warn!("localStorage unavailable, session not persisted");
                return;
            };
            if storage.set_item(SESSION_KEY, value).is_err() {
                tracing::warn!("Failed to persist session");
            }
        }

        fn clear(&self) {
            if let Some(storage) = storage() {
                let _ = storage.remove_item(SESSION_KEY);
            }
        }
    }
}

/// Platform default storage.
#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub fn default_storage() -> Rc<dyn SessionStorage> {
    Rc::new(LocalSessionStorage)
}

/// Platform default storage.
#[cfg(not(all(target_arch = "wasm32", feature = "web")))]
pub fn default_storage() -> Rc<dyn SessionStorage> {
    Rc::new(MemorySessionStorage::new())
}
