//! Domain model (ids, completables, user, errors).

pub mod completable;
pub mod errors;
pub mod ids;
pub mod user;

pub use completable::{Completable, CompletableField, CompletableUpdate, EntityKind, EntityRef};
pub use errors::{PersistenceError, SaveError, StoreError};
pub use ids::{CompletableId, Id, IdMarker, TagId, UserId};
pub use user::{Filters, TagInfo, User, UserField, UserUpdate};
