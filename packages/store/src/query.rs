//! # Keyed fetch state
//!
//! [`Query`] is the state behind every data-fetching hook. It answers two
//! questions for the hook: *should a request go out now?* (a [`Ticket`] is
//! handed out) and *is this response still wanted?* (the ticket's generation
//! still matches).
//!
//! - no key, no request;
//! - one request per distinct key value; setting the same key again is a
//!   no-op, [`Query::refresh`] asks explicitly;
//! - a response for an older generation or a different key is dropped, so
//!   rapid key changes cannot let a slow stale response overwrite a newer
//!   one;
//! - edits made while a request is out (realtime changes) are replayed on
//!   top of its response, so a read that raced a change cannot undo it.

use std::fmt;
use std::rc::Rc;

/// `{data, loading, error}` as exposed to components.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

/// Permission to run one request for `key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket<K> {
    pub key: K,
    generation: u64,
}

type Edit<T> = Rc<dyn Fn(&mut T)>;

pub struct Query<K, T> {
    key: Option<K>,
    generation: u64,
    state: FetchState<T>,
    /// Edits to replay on the next successful response.
    pending: Vec<Edit<T>>,
}

impl<K, T> Default for Query<K, T> {
    fn default() -> Self {
        Self {
            key: None,
            generation: 0,
            state: FetchState::default(),
            pending: Vec::new(),
        }
    }
}

impl<K: fmt::Debug, T: fmt::Debug> fmt::Debug for Query<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<K: Clone + PartialEq, T> Query<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn state(&self) -> &FetchState<T> {
        &self.state
    }

    /// Point the query at a new key. Returns a ticket when a request should
    /// be issued.
    ///
    /// Clearing the key invalidates any outstanding request and resets the
    /// state.
    pub fn set_key(&mut self, key: Option<K>) -> Option<Ticket<K>> {
        if key == self.key {
            return None;
        }
        self.key = key;
        self.generation += 1;
        self.pending.clear();
        match self.key.clone() {
            Some(key) => {
                self.state.data = None;
                self.state.error = None;
                self.state.loading = true;
                Some(Ticket {
                    key,
                    generation: self.generation,
                })
            }
            None => {
                self.state = FetchState::default();
                None
            }
        }
    }

    /// Re-issue the request for the current key, keeping the current data
    /// visible while it runs.
    pub fn refresh(&mut self) -> Option<Ticket<K>> {
        let key = self.key.clone()?;
        self.generation += 1;
        self.state.loading = true;
        self.state.error = None;
        Some(Ticket {
            key,
            generation: self.generation,
        })
    }

    pub fn is_current(&self, ticket: &Ticket<K>) -> bool {
        ticket.generation == self.generation && self.key.as_ref() == Some(&ticket.key)
    }

    /// Store a response. Returns `false` if the ticket is stale and the
    /// response was dropped.
    pub fn resolve(&mut self, ticket: &Ticket<K>, result: Result<T, String>) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!("dropping stale fetch response");
            return false;
        }
        self.state.loading = false;
        match result {
            Ok(mut data) => {
                for edit in self.pending.drain(..) {
                    edit(&mut data);
                }
                self.state.data = Some(data);
                self.state.error = None;
            }
            Err(message) => {
                // Already folded into the data we keep showing.
                if self.state.data.is_some() {
                    self.pending.clear();
                }
                self.state.error = Some(message);
            }
        }
        true
    }

    /// Modify the data in place (e.g. to fold in a realtime event).
    ///
    /// While a request is out the edit is also kept and replayed on its
    /// response; with no data yet that replay is the only application. Edits
    /// must therefore be idempotent. Without a key the edit is dropped.
    pub fn update_data(&mut self, edit: impl Fn(&mut T) + 'static) {
        if self.key.is_none() {
            return;
        }
        if let Some(data) = self.state.data.as_mut() {
            edit(data);
        }
        if self.state.loading || self.state.data.is_none() {
            self.pending.push(Rc::new(edit));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::{BTreeSet, HashMap};

    use super::*;

    /// Drive a query the way a hook does, counting backend calls per key.
    struct Harness {
        query: Query<String, String>,
        calls: RefCell<HashMap<String, usize>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                query: Query::new(),
                calls: RefCell::new(HashMap::new()),
            }
        }

        async fn fetch(&self, key: &str) -> Result<String, String> {
            *self.calls.borrow_mut().entry(key.to_string()).or_default() += 1;
            Ok(format!("data for {key}"))
        }

        fn calls(&self) -> usize {
            self.calls.borrow().values().sum()
        }
    }

    #[tokio::test]
    async fn test_absent_key_never_fetches() {
        let mut h = Harness::new();
        assert!(h.query.set_key(None).is_none());
        assert!(h.query.refresh().is_none());
        assert_eq!(h.calls(), 0);
        assert!(!h.query.state().loading);
    }

    #[tokio::test]
    async fn test_one_request_per_key_value() {
        let mut h = Harness::new();
        let ticket = h.query.set_key(Some("u1".to_string())).unwrap();
        assert!(h.query.state().loading);
        assert!(h.query.set_key(Some("u1".to_string())).is_none());

        let result = h.fetch(&ticket.key).await;
        assert!(h.query.state().loading);
        assert!(h.query.resolve(&ticket, result));
        assert!(!h.query.state().loading);
        assert_eq!(h.query.state().data.as_deref(), Some("data for u1"));

        let ticket = h.query.set_key(Some("u2".to_string())).unwrap();
        let result = h.fetch(&ticket.key).await;
        h.query.resolve(&ticket, result);
        assert_eq!(h.calls.borrow().get("u1"), Some(&1));
        assert_eq!(h.calls.borrow().get("u2"), Some(&1));
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let mut query: Query<String, u32> = Query::new();
        let first = query.set_key(Some("a".into())).unwrap();
        let second = query.set_key(Some("b".into())).unwrap();

        assert!(query.resolve(&second, Ok(2)));
        assert!(!query.resolve(&first, Ok(1)));
        assert_eq!(query.state().data, Some(2));

        // Switching back to an earlier key does not revive its old ticket
        let third = query.set_key(Some("a".into())).unwrap();
        assert!(!query.resolve(&first, Ok(1)));
        assert!(query.resolve(&third, Ok(3)));
        assert_eq!(query.state().data, Some(3));
    }

    #[test]
    fn test_refresh_keeps_data_and_supersedes() {
        let mut query: Query<String, u32> = Query::new();
        let ticket = query.set_key(Some("a".into())).unwrap();
        query.resolve(&ticket, Ok(1));

        let older = query.refresh().unwrap();
        let newer = query.refresh().unwrap();
        assert_eq!(query.state().data, Some(1));
        assert!(query.state().loading);
        assert!(!query.resolve(&older, Ok(5)));
        assert!(query.resolve(&newer, Err("timeout".into())));
        assert_eq!(query.state().data, Some(1));
        assert_eq!(query.state().error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_edit_before_first_response_is_replayed() {
        let mut query: Query<String, BTreeSet<u32>> = Query::new();
        query.update_data(|rows| {
            rows.insert(9);
        });
        let ticket = query.set_key(Some("a".into())).unwrap();
        query.update_data(|rows| {
            rows.insert(7);
        });
        assert_eq!(query.state().data, None);

        query.resolve(&ticket, Ok(BTreeSet::from([1])));
        assert_eq!(query.state().data, Some(BTreeSet::from([1, 7])));
    }

    #[test]
    fn test_edit_during_refresh_survives_older_read() {
        let mut query: Query<String, BTreeSet<u32>> = Query::new();
        let ticket = query.set_key(Some("a".into())).unwrap();
        query.resolve(&ticket, Ok(BTreeSet::from([1])));

        let refresh = query.refresh().unwrap();
        query.update_data(|rows| {
            rows.insert(2);
        });
        assert_eq!(query.state().data, Some(BTreeSet::from([1, 2])));
        query.resolve(&refresh, Ok(BTreeSet::from([1])));
        assert_eq!(query.state().data, Some(BTreeSet::from([1, 2])));

        query.update_data(|rows| {
            rows.insert(3);
        });
        assert_eq!(query.state().data, Some(BTreeSet::from([1, 2, 3])));
    }

    #[test]
    fn test_key_change_discards_edits() {
        let mut query: Query<String, BTreeSet<u32>> = Query::new();
        query.set_key(Some("a".into())).unwrap();
        query.update_data(|rows| {
            rows.insert(7);
        });
        let ticket = query.set_key(Some("b".into())).unwrap();
        query.resolve(&ticket, Ok(BTreeSet::new()));
        assert_eq!(query.state().data, Some(BTreeSet::new()));
    }

    #[test]
    fn test_clearing_key_resets() {
        let mut query: Query<String, u32> = Query::new();
        let ticket = query.set_key(Some("a".into())).unwrap();
        assert!(query.set_key(None).is_none());
        assert!(!query.resolve(&ticket, Ok(1)));
        assert_eq!(query.state(), &FetchState::default());
    }
}
