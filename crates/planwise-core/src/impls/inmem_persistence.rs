//! InMemoryPersistence - 開発用・テスト用の persistence
//!
//! # 学習ポイント
//! - サーバ側の状態を別の map で持つ（store のコピーとは独立）
//! - 呼び出しログで「何がいつ送られたか」をテストから観測できる
//! - latency / offline の切り替えで遅いサーバ・落ちたサーバを再現

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::{Completable, CompletableId, EntityKind, EntityRef, PersistenceError, User};
use crate::ports::{ParentRef, Persistence, Snapshot};

/// 呼び出しログの 1 件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum PersistenceCall {
    Load,
    PatchEntity(EntityRef),
    CreateSubtask { parent: ParentRef, entity: EntityRef },
    DeleteEntity(EntityRef),
    PatchUser,
}

#[derive(Default)]
struct Server {
    user: Option<User>,
    projects: HashMap<CompletableId, Completable>,
    tasks: HashMap<CompletableId, Completable>,
    calls: Vec<PersistenceCall>,
    latency: Option<Duration>,
    offline: bool,
    reject_patches: bool,
}

impl Server {
    fn map_mut(&mut self, kind: EntityKind) -> &mut HashMap<CompletableId, Completable> {
        match kind {
            EntityKind::Project => &mut self.projects,
            EntityKind::Task => &mut self.tasks,
        }
    }
}

/// InMemoryPersistence は REST backend の代わり
///
/// # 使用例
/// ```ignore
/// let backend = Arc::new(InMemoryPersistence::new(snapshot));
/// let store = StoreBuilder::new().persistence(backend.clone()).build()?;
/// store.load().await?;
/// store.manual_save().await;
/// assert_eq!(backend.calls().len(), 2);
/// ```
#[derive(Default)]
pub struct InMemoryPersistence {
    server: Mutex<Server>,
}

impl InMemoryPersistence {
    /// `seed` の内容をサーバ側の正本とする
    pub fn new(seed: Snapshot) -> Self {
        let server = Server {
            user: Some(seed.user),
            projects: seed.projects.into_iter().map(|p| (p.id.clone(), p)).collect(),
            tasks: seed.tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
            ..Server::default()
        };
        Self {
            server: Mutex::new(server),
        }
    }

    /// 各呼び出しの前に待つ時間
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.server.lock().latency = latency;
    }

    /// true の間、全呼び出しが `PersistenceError::Unavailable` で失敗する
    pub fn set_offline(&self, offline: bool) {
        self.server.lock().offline = offline;
    }

    /// true の間、patch が `Ok(false)` を返す
    pub fn set_reject_patches(&self, reject: bool) {
        self.server.lock().reject_patches = reject;
    }

    pub fn calls(&self) -> Vec<PersistenceCall> {
        self.server.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.server.lock().calls.clear();
    }

    pub fn stored(&self, kind: EntityKind, id: &CompletableId) -> Option<Completable> {
        self.server.lock().map_mut(kind).get(id).cloned()
    }

    pub fn stored_user(&self) -> Option<User> {
        self.server.lock().user.clone()
    }

    /// ログに記録し、latency 分待ってから offline を判定する
    async fn enter(&self, call: PersistenceCall) -> Result<(), PersistenceError> {
        let latency = {
            let mut server = self.server.lock();
            server.calls.push(call);
            server.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.server.lock().offline {
            return Err(PersistenceError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn load(&self) -> Result<Snapshot, PersistenceError> {
        self.enter(PersistenceCall::Load).await?;
        let server = self.server.lock();
        let user = server
            .user
            .clone()
            .ok_or_else(|| PersistenceError::Rejected("no user on the server".to_string()))?;

        // ユーザから辿れる順に並べる（HashMap の順序に依存しない）
        let mut projects = Vec::new();
        let mut tasks = Vec::new();
        let mut pending: Vec<CompletableId> = Vec::new();
        for id in &user.projects {
            if let Some(project) = server.projects.get(id) {
                pending.extend(project.subtasks.iter().cloned());
                projects.push(project.clone());
            }
        }
        while !pending.is_empty() {
            let id = pending.remove(0);
            if tasks.iter().any(|t: &Completable| t.id == id) {
                continue;
            }
            if let Some(task) = server.tasks.get(&id) {
                pending.extend(task.subtasks.iter().cloned());
                tasks.push(task.clone());
            }
        }
        Ok(Snapshot { user, projects, tasks })
    }

    async fn patch_entity(&self, kind: EntityKind, entity: &Completable) -> Result<bool, PersistenceError> {
        let target = EntityRef::new(kind, entity.id.clone());
        self.enter(PersistenceCall::PatchEntity(target)).await?;
        let mut server = self.server.lock();
        if server.reject_patches {
            return Ok(false);
        }
        match server.map_mut(kind).get_mut(&entity.id) {
            Some(stored) => {
                *stored = entity.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_subtask(&self, parent: &ParentRef, entity: &Completable) -> Result<(), PersistenceError> {
        let kind = match parent {
            ParentRef::User => EntityKind::Project,
            ParentRef::Completable(_) => EntityKind::Task,
        };
        let call = PersistenceCall::CreateSubtask {
            parent: parent.clone(),
            entity: EntityRef::new(kind, entity.id.clone()),
        };
        self.enter(call).await?;

        let mut server = self.server.lock();
        match parent {
            ParentRef::User => {
                let user = server
                    .user
                    .as_mut()
                    .ok_or_else(|| PersistenceError::Rejected("no user on the server".to_string()))?;
                if !user.projects.contains(&entity.id) {
                    user.projects.push(entity.id.clone());
                }
            }
            ParentRef::Completable(owner) => {
                let owner_entity = server
                    .map_mut(owner.kind)
                    .get_mut(&owner.id)
                    .ok_or_else(|| PersistenceError::Rejected(format!("unknown parent {owner}")))?;
                if !owner_entity.subtasks.contains(&entity.id) {
                    owner_entity.subtasks.push(entity.id.clone());
                }
            }
        }
        server.map_mut(kind).insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn delete_entity(
        &self,
        kind: EntityKind,
        id: &CompletableId,
    ) -> Result<Option<Completable>, PersistenceError> {
        self.enter(PersistenceCall::DeleteEntity(EntityRef::new(kind, id.clone())))
            .await?;
        Ok(self.server.lock().map_mut(kind).remove(id))
    }

    async fn patch_user(&self, user: &User) -> Result<bool, PersistenceError> {
        self.enter(PersistenceCall::PatchUser).await?;
        let mut server = self.server.lock();
        if server.reject_patches {
            return Ok(false);
        }
        server.user = Some(user.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Snapshot {
        let mut user = User::new("u".into());
        user.projects = vec!["p".into()];
        let mut project = Completable::new("p".into(), "P");
        project.subtasks = vec!["a".into(), "b".into()];
        let mut a = Completable::new("a".into(), "A");
        a.subtasks = vec!["a1".into()];
        Snapshot {
            user,
            projects: vec![project],
            tasks: vec![
                Completable::new("b".into(), "B"),
                Completable::new("a1".into(), "A1"),
                a,
                Completable::new("stray".into(), "unreachable"),
            ],
        }
    }

    #[tokio::test]
    async fn test_load_walks_from_the_user() {
        let backend = InMemoryPersistence::new(seed());
        let snapshot = backend.load().await.unwrap();
        let ids: Vec<&str> = snapshot.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "a1"]);
        assert_eq!(backend.calls(), vec![PersistenceCall::Load]);
    }

    #[tokio::test]
    async fn test_create_appends_to_parent() {
        let backend = InMemoryPersistence::new(seed());
        let child = Completable::new("c".into(), "C");
        backend
            .create_subtask(&ParentRef::Completable(EntityRef::project("p")), &child)
            .await
            .unwrap();

        let project = backend.stored(EntityKind::Project, &"p".into()).unwrap();
        assert_eq!(project.subtasks.last().map(|id| id.as_str()), Some("c"));
        assert!(backend.stored(EntityKind::Task, &"c".into()).is_some());
    }

    #[tokio::test]
    async fn test_create_does_not_append_a_child_already_listed() {
        let backend = InMemoryPersistence::new(seed());
        let mut project = backend.stored(EntityKind::Project, &"p".into()).unwrap();
        project.subtasks.push("c".into());
        backend.patch_entity(EntityKind::Project, &project).await.unwrap();

        let child = Completable::new("c".into(), "C");
        backend
            .create_subtask(&ParentRef::Completable(EntityRef::project("p")), &child)
            .await
            .unwrap();

        let subtasks = backend.stored(EntityKind::Project, &"p".into()).unwrap().subtasks;
        assert_eq!(subtasks.iter().filter(|id| id.as_str() == "c").count(), 1);
    }

    #[tokio::test]
    async fn test_patch_unknown_entity_is_not_accepted() {
        let backend = InMemoryPersistence::new(seed());
        let ghost = Completable::new("ghost".into(), "?");
        assert!(!backend.patch_entity(EntityKind::Task, &ghost).await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let backend = InMemoryPersistence::new(seed());
        backend.set_offline(true);
        let err = backend.patch_user(&User::new("u".into())).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Unavailable));
        // the attempt is still logged
        assert_eq!(backend.calls(), vec![PersistenceCall::PatchUser]);
    }

    #[tokio::test]
    async fn test_delete_returns_the_document() {
        let backend = InMemoryPersistence::new(seed());
        let deleted = backend.delete_entity(EntityKind::Task, &"b".into()).await.unwrap();
        assert_eq!(deleted.map(|d| d.title), Some("B".to_string()));
        assert!(backend.delete_entity(EntityKind::Task, &"b".into()).await.unwrap().is_none());
    }
}
