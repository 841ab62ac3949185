//! Save keys and coalescing policy.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::EntityRef;

/// Coalescing key of a scheduled save.
///
/// A key holds at most one pending callback; scheduling it again replaces the callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SaveKey {
    /// Create-on-server of an optimistically added entity.
    Create(EntityRef),
    /// Patch or delete of an entity. A delete supersedes a pending patch.
    Write(EntityRef),
    /// Patch of the session user.
    User,
    /// Free-form key for callers scheduling their own work.
    Named(String),
}

impl SaveKey {
    pub fn named(name: impl Into<String>) -> Self {
        SaveKey::Named(name.into())
    }
}

impl From<&str> for SaveKey {
    fn from(name: &str) -> Self {
        SaveKey::named(name)
    }
}

impl fmt::Display for SaveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveKey::Create(e) => write!(f, "create/{e}"),
            SaveKey::Write(e) => write!(f, "write/{e}"),
            SaveKey::User => f.write_str("user"),
            SaveKey::Named(name) => f.write_str(name),
        }
    }
}

/// What re-scheduling an already queued key does to its place in line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoalescePolicy {
    /// Most-recently-scheduled executes last.
    #[default]
    MoveToEnd,
    /// The key keeps the slot of its first scheduling.
    KeepPosition,
}
