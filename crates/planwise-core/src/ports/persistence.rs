//! Persistence port - REST backend の抽象化
//!
//! Store はこの trait にだけ依存します。transport（HTTP, fetch, ...）は範囲外。
//!
//! # 契約
//! - `patch_entity` / `patch_user`: 受理されたかどうかを bool で返す
//! - `create_subtask`: fire-and-forget（失敗はログのみ）
//! - `delete_entity`: 削除したドキュメント、失敗時は None

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Completable, CompletableId, EntityKind, EntityRef, PersistenceError, User};

/// Everything a session starts from. Loaded once, wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub user: User,
    #[serde(default)]
    pub projects: Vec<Completable>,
    #[serde(default)]
    pub tasks: Vec<Completable>,
}

impl Snapshot {
    pub fn new(user: User) -> Self {
        Self {
            user,
            projects: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

/// Where a newly created completable hangs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParentRef {
    /// A new Project: parent is the user's root list.
    User,
    /// A new Task under a project or another task.
    Completable(EntityRef),
}

/// Persistence は REST endpoint 群を包む adapter
///
/// # Thread Safety
/// - `Send + Sync` を要求（scheduler の spawn された timer から呼ばれる）
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Bulk load for session start.
    async fn load(&self) -> Result<Snapshot, PersistenceError>;

    /// Update one completable. `Ok(false)` means the server did not accept it.
    async fn patch_entity(&self, kind: EntityKind, entity: &Completable) -> Result<bool, PersistenceError>;

    async fn create_subtask(&self, parent: &ParentRef, entity: &Completable) -> Result<(), PersistenceError>;

    /// Returns the deleted document, or `None` if nothing was deleted.
    async fn delete_entity(
        &self,
        kind: EntityKind,
        id: &CompletableId,
    ) -> Result<Option<Completable>, PersistenceError>;

    async fn patch_user(&self, user: &User) -> Result<bool, PersistenceError>;
}
