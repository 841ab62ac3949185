//! Subscription handle returned by every listener registration.

use std::fmt;

use super::table::ListenerId;

type Cancel = Box<dyn FnOnce() -> bool + Send + Sync>;

/// Handle to one registration.
///
/// Dropping the handle does NOT unsubscribe: registrations live until
/// `unsubscribe`, an id-based `remove_*`, or entity deletion clears them.
pub struct Subscription {
    listener_id: ListenerId,
    cancel: Option<Cancel>,
}

impl Subscription {
    pub(crate) fn new(listener_id: ListenerId, cancel: impl FnOnce() -> bool + Send + Sync + 'static) -> Self {
        Self {
            listener_id,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn listener_id(&self) -> &ListenerId {
        &self.listener_id
    }

    /// Remove this registration. Returns `false` if it was already gone
    /// (replaced under the same id, removed by id, or purged by a delete).
    pub fn unsubscribe(mut self) -> bool {
        self.cancel.take().is_some_and(|cancel| cancel())
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("listener_id", &self.listener_id)
            .finish_non_exhaustive()
    }
}
