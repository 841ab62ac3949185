//! Ordered listener table and panic-isolated dispatch.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Caller-chosen name of a listener inside one table.
///
/// Registering the same id twice replaces the earlier callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(String);

impl ListenerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ListenerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ListenerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Slot<F: ?Sized> {
    generation: u64,
    callback: Arc<F>,
}

/// Listeners of one table, in registration order.
///
/// Each entry remembers the generation that installed it so a stale
/// `Subscription` cannot remove a newer registration under the same id.
pub(crate) struct ListenerTable<F: ?Sized> {
    entries: IndexMap<ListenerId, Slot<F>>,
}

impl<F: ?Sized> Default for ListenerTable<F> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<F: ?Sized> ListenerTable<F> {
    /// Insert or overwrite. An overwritten entry keeps its position.
    pub(crate) fn insert(&mut self, id: ListenerId, generation: u64, callback: Arc<F>) {
        self.entries.insert(id, Slot { generation, callback });
    }

    pub(crate) fn remove(&mut self, id: &ListenerId) -> bool {
        self.entries.shift_remove(id).is_some()
    }

    /// Remove `id` only if it is still the registration made at `generation`.
    pub(crate) fn remove_generation(&mut self, id: &ListenerId, generation: u64) -> bool {
        match self.entries.get(id) {
            Some(slot) if slot.generation == generation => self.remove(id),
            _ => false,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<(ListenerId, Arc<F>)> {
        self.entries
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(&slot.callback)))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Invoke every listener, isolating panics. Returns how many listeners panicked.
///
/// Called with no registry lock held, so listeners may read or mutate the store.
pub(crate) fn dispatch<F: ?Sized>(listeners: Vec<(ListenerId, Arc<F>)>, call: impl Fn(&F)) -> usize {
    let mut panicked = 0;
    for (id, callback) in listeners {
        if panic::catch_unwind(AssertUnwindSafe(|| call(callback.as_ref()))).is_err() {
            panicked += 1;
            tracing::error!(listener = %id, "listener panicked, continuing dispatch");
        }
    }
    panicked
}
