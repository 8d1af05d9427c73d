//! # Realtime-synchronised row cache
//!
//! [`Collection`] keeps a local copy of a remote table as an ordered map from
//! primary key to row. A full fetch seeds it with [`Collection::replace_all`];
//! realtime notifications are folded in with [`Collection::apply`].
//!
//! `apply` is idempotent and tolerant of out-of-order delivery:
//!
//! - inserts and updates are upserts by key;
//! - a row whose stored commit timestamp is newer than the event's is left
//!   alone;
//! - deletes leave a tombstone, so a late insert or update for a deleted key
//!   cannot bring the row back.
//!
//! Iteration is in key order, which keeps the remaining rows in a stable
//! order when one is removed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::models::{Investment, InvestmentPlan, Transaction};

/// Rows with a string primary key.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for InvestmentPlan {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Transaction {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Investment {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change notification.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent<T> {
    pub kind: ChangeKind,
    /// Primary key of the affected row.
    pub key: String,
    /// New row for inserts and updates; `None` for deletes.
    pub record: Option<T>,
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl ChangeEvent<serde_json::Value> {
    /// Decode the raw record into a typed row.
    pub fn decode<T: DeserializeOwned>(self) -> Result<ChangeEvent<T>, serde_json::Error> {
        let record = match self.record {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };
        Ok(ChangeEvent {
            kind: self.kind,
            key: self.key,
            record,
            commit_timestamp: self.commit_timestamp,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Entry<T> {
    row: T,
    version: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Collection<T> {
    rows: BTreeMap<String, Entry<T>>,
    tombstones: BTreeMap<String, Option<DateTime<Utc>>>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            tombstones: BTreeMap::new(),
        }
    }
}

impl<T: Keyed + Clone> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a full fetch. The snapshot is authoritative, so earlier
    /// tombstones are forgotten.
    pub fn replace_all(&mut self, rows: impl IntoIterator<Item = T>) {
        self.tombstones.clear();
        self.rows = rows
            .into_iter()
            .map(|row| {
                (
                    row.key().to_string(),
                    Entry { row, version: None },
                )
            })
            .collect();
    }

    /// Fold one change event in. Returns whether the collection changed.
    pub fn apply(&mut self, event: ChangeEvent<T>) -> bool {
        match event.kind {
            ChangeKind::Delete => {
                let removed = self.rows.remove(&event.key).is_some();
                self.tombstones.insert(event.key, event.commit_timestamp);
                removed
            }
            ChangeKind::Insert | ChangeKind::Update => {
                let Some(row) = event.record else {
                    return false;
                };
                if let Some(deleted_at) = self.tombstones.get(&event.key) {
                    if !is_newer(event.commit_timestamp, *deleted_at) {
                        return false;
                    }
                    self.tombstones.remove(&event.key);
                }
                if let Some(existing) = self.rows.get(&event.key) {
                    if let (Some(stored), Some(incoming)) = (existing.version, event.commit_timestamp) {
                        if incoming < stored {
                            return false;
                        }
                    }
                }
                self.rows.insert(
                    event.key,
                    Entry {
                        row,
                        version: event.commit_timestamp,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.rows.get(key).map(|e| &e.row)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in key order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.values().map(|e| &e.row)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Rows ordered by `f`, ties kept in key order.
    pub fn sorted_by_key<K: Ord>(&self, mut f: impl FnMut(&T) -> K) -> Vec<T> {
        let mut rows = self.to_vec();
        rows.sort_by_key(|r| f(r));
        rows
    }
}

/// A change may revive a tombstoned key only if both carry timestamps and
/// the change is strictly later.
fn is_newer(incoming: Option<DateTime<Utc>>, deleted_at: Option<DateTime<Utc>>) -> bool {
    matches!((incoming, deleted_at), (Some(i), Some(d)) if i > d)
}
