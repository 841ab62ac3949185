//! Save status machine: the tri-state shown by the UI indicator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::listeners::{ListenerId, ListenerTable, Subscription, dispatch};

/// Save state.
///
/// State transitions:
/// - Saved -> Save (something was scheduled)
/// - Save -> Saving (a batch started)
/// - Saving -> Saved (batch done, queue empty)
/// - Saving -> Save (batch done, but new work arrived meanwhile)
///
/// A session starts `Saved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SaveStatus {
    /// Dirty, nothing in flight.
    Save,
    /// A batch is executing.
    Saving,
    /// Nothing pending.
    #[default]
    Saved,
}

impl SaveStatus {
    /// Whether leaving the page now could lose edits.
    pub fn is_dirty(self) -> bool {
        !matches!(self, SaveStatus::Saved)
    }
}

type StatusListener = dyn Fn(SaveStatus) + Send + Sync;

/// Broadcasts `SaveStatus` changes to listeners and async waiters.
///
/// Listeners fire only on actual transitions, never for a repeated state.
#[derive(Clone)]
pub struct SaveStatusBoard {
    current: Arc<watch::Sender<SaveStatus>>,
    listeners: Arc<Mutex<ListenerTable<StatusListener>>>,
    generations: Arc<AtomicU64>,
}

impl Default for SaveStatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveStatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SaveStatus::Saved);
        Self {
            current: Arc::new(tx),
            listeners: Arc::new(Mutex::new(ListenerTable::default())),
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn get(&self) -> SaveStatus {
        *self.current.borrow()
    }

    /// Update the current value only. Safe to call under the scheduler lock;
    /// pair with `announce` once the lock is released.
    pub(crate) fn publish(&self, status: SaveStatus) -> bool {
        self.current.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }

    /// Run listeners for a transition made by `publish`.
    pub(crate) fn announce(&self, status: SaveStatus) {
        tracing::debug!(?status, "save status changed");
        let listeners = self.listeners.lock().snapshot();
        dispatch(listeners, |f| f(status));
    }

    /// Register `listener_id`; re-registering the same id replaces the callback.
    pub fn listen<F>(&self, listener_id: impl Into<ListenerId>, f: F) -> Subscription
    where
        F: Fn(SaveStatus) + Send + Sync + 'static,
    {
        let id = listener_id.into();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        self.listeners.lock().insert(id.clone(), generation, Arc::new(f));

        let table = Arc::downgrade(&self.listeners);
        let cancel_id = id.clone();
        Subscription::new(id, move || {
            table
                .upgrade()
                .is_some_and(|t| t.lock().remove_generation(&cancel_id, generation))
        })
    }

    pub fn remove_listener(&self, listener_id: &ListenerId) -> bool {
        self.listeners.lock().remove(listener_id)
    }

    /// Async view of the status, for waiters such as shutdown or tests.
    pub fn subscribe_watch(&self) -> watch::Receiver<SaveStatus> {
        self.current.subscribe()
    }
}
