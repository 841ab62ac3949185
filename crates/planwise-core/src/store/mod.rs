//! Entity store: the client-side copies of the user, projects and tasks.
//!
//! Reads are synchronous. Every mutator updates memory, notifies the matching
//! listener table, then schedules the persistence call under a coalescing key.
//! No lock is held while listeners run, so listeners may call back into the store.

mod completables;
mod persist;
mod user;

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::domain::{Completable, CompletableId, EntityKind, EntityRef, StoreError, User};
use crate::listeners::ListenerRegistry;
use crate::ports::{Clock, IdGenerator, Persistence, Snapshot};
use crate::save::{BatchReport, SaveKey, SaveScheduler, SaveStatus, SaveStatusBoard};

pub type CompletableMap = IndexMap<CompletableId, Completable>;

#[derive(Default)]
struct StoreData {
    user: Option<User>,
    projects: CompletableMap,
    tasks: CompletableMap,
}

impl StoreData {
    fn map(&self, kind: EntityKind) -> &CompletableMap {
        match kind {
            EntityKind::Project => &self.projects,
            EntityKind::Task => &self.tasks,
        }
    }

    fn map_mut(&mut self, kind: EntityKind) -> &mut CompletableMap {
        match kind {
            EntityKind::Project => &mut self.projects,
            EntityKind::Task => &mut self.tasks,
        }
    }
}

pub(crate) struct StoreInner {
    data: Mutex<StoreData>,
    listeners: ListenerRegistry,
    scheduler: SaveScheduler,
    persistence: Arc<dyn Persistence>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl StoreInner {
    fn lookup(&self, entity: &EntityRef) -> Option<Completable> {
        self.data.lock().map(entity.kind).get(&entity.id).cloned()
    }

    fn current_user(&self) -> Option<User> {
        self.data.lock().user.clone()
    }
}

/// Handle to one store instance. Cloning shares the instance.
///
/// Construct with [`crate::app::StoreBuilder`]; independent stores share nothing.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub(crate) fn from_parts(
        persistence: Arc<dyn Persistence>,
        scheduler: SaveScheduler,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                data: Mutex::new(StoreData::default()),
                listeners: ListenerRegistry::new(),
                scheduler,
                persistence,
                ids,
                clock,
            }),
        }
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    pub fn scheduler(&self) -> &SaveScheduler {
        &self.inner.scheduler
    }

    pub fn status_board(&self) -> &SaveStatusBoard {
        self.inner.scheduler.status()
    }

    pub fn status(&self) -> SaveStatus {
        self.status_board().get()
    }

    // ---------------------------------------------------------------------
    // lifecycle
    // ---------------------------------------------------------------------

    /// Bulk load from the persistence service, replacing everything held.
    pub async fn load(&self) -> Result<(), StoreError> {
        let snapshot = self.inner.persistence.load().await?;
        tracing::info!(
            projects = snapshot.projects.len(),
            tasks = snapshot.tasks.len(),
            "store loaded"
        );
        self.hydrate(snapshot);
        Ok(())
    }

    /// Replace the store contents with `snapshot` without touching the network.
    pub fn hydrate(&self, snapshot: Snapshot) {
        let Snapshot { user, projects, tasks } = snapshot;
        let loaded: Vec<(EntityRef, Completable)> = projects
            .iter()
            .map(|p| (EntityRef::new(EntityKind::Project, p.id.clone()), p.clone()))
            .chain(tasks.iter().map(|t| (EntityRef::new(EntityKind::Task, t.id.clone()), t.clone())))
            .collect();
        {
            let mut data = self.inner.data.lock();
            data.user = Some(user.clone());
            data.projects = projects.into_iter().map(|p| (p.id.clone(), p)).collect();
            data.tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        }
        self.inner.listeners.notify_user(&user);
        for (entity, value) in &loaded {
            self.inner.listeners.notify_entity(entity, Some(value));
        }
    }

    /// Drop every entity and every listener. Pending saves are left alone.
    pub fn clear(&self) {
        *self.inner.data.lock() = StoreData::default();
        self.inner.listeners.clear();
    }

    /// Flush pending saves and stop the idle timer.
    pub async fn shutdown(&self) -> BatchReport {
        let report = self.inner.scheduler.shutdown().await;
        tracing::info!(flushed = report.executed.len(), failed = report.failed.len(), "store shut down");
        report
    }

    // ---------------------------------------------------------------------
    // reads
    // ---------------------------------------------------------------------

    /// Copy of every project. Mutating the copy does not touch the store.
    pub fn projects(&self) -> CompletableMap {
        self.inner.data.lock().projects.clone()
    }

    /// Copy of every task.
    pub fn tasks(&self) -> CompletableMap {
        self.inner.data.lock().tasks.clone()
    }

    pub fn contains(&self, kind: EntityKind, id: &CompletableId) -> bool {
        self.inner.data.lock().map(kind).contains_key(id)
    }

    /// Current value of one entity.
    pub fn get(&self, kind: EntityKind, id: &CompletableId) -> Result<Completable, StoreError> {
        self.with(kind, id, Completable::clone)
    }

    /// Borrow the live entity for the duration of `f`.
    ///
    /// `f` runs under the store lock: it must not call back into the store.
    pub fn with<R>(&self, kind: EntityKind, id: &CompletableId, f: impl FnOnce(&Completable) -> R) -> Result<R, StoreError> {
        let data = self.inner.data.lock();
        match data.map(kind).get(id) {
            Some(entity) => Ok(f(entity)),
            None => Err(not_found(EntityRef::new(kind, id.clone()))),
        }
    }

    pub fn user(&self) -> Result<User, StoreError> {
        self.inner.current_user().ok_or(StoreError::UserNotLoaded)
    }

    /// Children of `id` that pass the user's filters, in `subtasks` order.
    pub fn visible_subtasks(&self, kind: EntityKind, id: &CompletableId) -> Result<Vec<Completable>, StoreError> {
        let now = self.inner.clock.now();
        let data = self.inner.data.lock();
        let Some(parent) = data.map(kind).get(id) else {
            return Err(not_found(EntityRef::new(kind, id.clone())));
        };
        let filters = data.user.as_ref().map(|u| u.filters.clone()).unwrap_or_default();
        Ok(parent
            .subtasks
            .iter()
            .filter_map(|child| data.tasks.get(child))
            .filter(|child| filters.admits(child, now))
            .cloned()
            .collect())
    }

    // ---------------------------------------------------------------------
    // saving
    // ---------------------------------------------------------------------

    /// Keep the idle window open (call on every keystroke in a bound field).
    pub fn reset_timer(&self) {
        self.inner.scheduler.reset_timer();
    }

    pub async fn manual_save(&self) -> BatchReport {
        self.inner.scheduler.manual_save().await
    }

    pub fn pending_saves(&self) -> Vec<SaveKey> {
        self.inner.scheduler.pending_keys()
    }

    /// Whether unsaved or in-flight changes exist (window-unload guard).
    pub fn is_dirty(&self) -> bool {
        self.status().is_dirty()
    }
}

fn not_found(entity: EntityRef) -> StoreError {
    tracing::error!(%entity, "operation on an entity that is not in the store");
    StoreError::NotFound(entity)
}
