//! Mount gating for background work.
//!
//! A component that starts a fetch or a realtime subscription owns a
//! [`MountGuard`]; the spawned work holds a [`MountHandle`]. Once the guard is
//! dropped every [`MountHandle::apply`] becomes a no-op, so a response or
//! change event that arrives after unmount can no longer touch state.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug)]
pub struct MountGuard {
    alive: Rc<Cell<bool>>,
}

#[derive(Clone, Debug)]
pub struct MountHandle {
    alive: Rc<Cell<bool>>,
}

impl MountGuard {
    pub fn new() -> Self {
        Self {
            alive: Rc::new(Cell::new(true)),
        }
    }

    pub fn handle(&self) -> MountHandle {
        MountHandle {
            alive: self.alive.clone(),
        }
    }

    /// Stop updates without waiting for the guard to drop.
    pub fn unmount(&self) {
        self.alive.set(false);
    }
}

impl Default for MountGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl MountHandle {
    pub fn is_mounted(&self) -> bool {
        self.alive.get()
    }

    /// Run `f` only while the owner is mounted. Returns whether it ran.
    pub fn apply(&self, f: impl FnOnce()) -> bool {
        if !self.is_mounted() {
            tracing::debug!("dropping update for unmounted owner");
            return false;
        }
        f();
        true
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use tokio::sync::mpsc;

    use super::*;
    use crate::collection::{ChangeEvent, ChangeKind, Collection};
    use crate::models::Transaction;

    #[test]
    fn test_handle_outlives_guard() {
        let guard = MountGuard::new();
        let handle = guard.handle();
        let hits = Cell::new(0);
        assert!(handle.apply(|| hits.set(hits.get() + 1)));
        drop(guard);
        assert!(!handle.is_mounted());
        assert!(!handle.apply(|| hits.set(hits.get() + 1)));
        assert_eq!(hits.get(), 1);
    }

    fn tx(id: &str) -> Transaction {
        serde_json::from_value(serde_json::json!({
            "id": id, "user_id": "u1", "type": "deposit", "amount": 50,
            "status": "pending", "created_at": "2025-10-09T12:00:00Z"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_unmounted_subscription_stops_updating() {
        let state = Rc::new(RefCell::new(Collection::<Transaction>::new()));
        let (feed, mut events) = mpsc::unbounded_channel();

        let guard = MountGuard::new();
        let handle = guard.handle();

        feed.send(ChangeEvent {
            kind: ChangeKind::Insert,
            key: "t1".into(),
            record: Some(tx("t1")),
            commit_timestamp: None,
        })
        .unwrap();
        let event = events.recv().await.unwrap();
        handle.apply(|| {
            state.borrow_mut().apply(event);
        });
        assert_eq!(state.borrow().len(), 1);

        drop(guard);
        feed.send(ChangeEvent {
            kind: ChangeKind::Insert,
            key: "t2".into(),
            record: Some(tx("t2")),
            commit_timestamp: None,
        })
        .unwrap();
        let event = events.recv().await.unwrap();
        assert!(!handle.apply(|| {
            state.borrow_mut().apply(event);
        }));
        assert_eq!(state.borrow().len(), 1);
    }
}
