//! Listener registry: fine-grained change subscriptions.

mod registry;
mod subscription;
mod table;

pub use registry::{EntityListener, ListenerRegistry, PropertyListener, UserListener, UserPropertyListener};
pub use subscription::Subscription;
pub use table::ListenerId;

pub(crate) use table::{ListenerTable, dispatch};
