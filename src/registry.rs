//! Callback registry shared between the session and the dispatcher

use crate::{
    dispatcher::{spawn_handler, spawn_lane},
    message::Message,
};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::warn;

/// Callback invoked with a dispatched packet.
///
/// Each invocation runs on its own tokio task, so a handler may block or
/// await without holding up packet ingestion.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync + 'static>;

struct Entry {
    handler: Handler,
    retain: bool,
    /// Ordered delivery queue for retained entries, started on first dispatch.
    lane: OnceLock<mpsc::UnboundedSender<Arc<Message>>>,
}

impl Entry {
    fn new(handler: Handler, retain: bool) -> Self {
        Self {
            handler,
            retain,
            lane: OnceLock::new(),
        }
    }
}

/// Key -> (handler, retain) map with reader/writer locking.
///
/// Keys are ActionIDs in the action registry and event names in the event
/// registry. Lookups take the read lock and do not block each other; `set`
/// and `del` take the write lock. At most one entry exists per key.
///
/// A retained entry receives its packets in wire order on a dedicated task;
/// dropping the entry ends that task once queued packets are handled.
#[derive(Default)]
pub struct CallbackRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl CallbackRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `key`.
    ///
    /// `retain == true` keeps the entry after it has been dispatched; the
    /// owner must [`del`](Self::del) it.
    pub fn set(&self, key: impl Into<String>, handler: Handler, retain: bool) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Entry::new(handler, retain));
    }

    /// Insert only if `key` is vacant. Returns `false` if an entry already exists.
    pub fn try_set(&self, key: impl Into<String>, handler: Handler, retain: bool) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match entries.entry(key.into()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(Entry::new(handler, retain));
                true
            }
        }
    }

    /// Handler and retain flag registered for `key`.
    pub fn get(&self, key: &str) -> Option<(Handler, bool)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|e| (e.handler.clone(), e.retain))
    }

    /// Remove the entry for `key`, returning whether one existed.
    pub fn del(&self, key: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Whether `key` has an entry.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand `message` to the handler registered under `key`.
    ///
    /// Non-retained entries are removed here and their handler runs on a fresh
    /// task; retained entries stay and queue the packet on their lane.
    /// Lookup and removal happen under one write lock, so the handler invoked
    /// is always the one removed. Returns `false` when nothing is registered.
    pub(crate) fn dispatch(&self, key: &str, message: &Arc<Message>) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get(key) else {
            return false;
        };
        if entry.retain {
            let lane = entry
                .lane
                .get_or_init(|| spawn_lane(entry.handler.clone()));
            if lane
                .send(message.clone())
                .is_err()
            {
                warn!("lane for {} closed, packet dropped", key);
            }
            return true;
        }
        if let Some(entry) = entries.remove(key) {
            drop(entries);
            spawn_handler(entry.handler, message.clone());
        }
        true
    }
}
