//! Project / Task mutators.

use super::{not_found, Store};
use crate::domain::{Completable, CompletableId, CompletableUpdate, EntityKind, EntityRef, StoreError, UserUpdate};
use crate::ports::ParentRef;
use crate::save::SaveKey;

impl Store {
    /// Insert or replace `entity`, fire its whole-entity table, queue a write.
    pub fn set(&self, kind: EntityKind, mut entity: Completable) {
        entity.dedup_tags();
        let target = EntityRef::new(kind, entity.id.clone());
        self.inner
            .data
            .lock()
            .map_mut(kind)
            .insert(entity.id.clone(), entity.clone());

        self.inner.listeners.notify_entity(&target, Some(&entity));
        self.schedule_write(target);
    }

    /// Change one field and fire only that field's property table.
    ///
    /// Completing an entity also stamps `completed_date`; the `CompletedDate`
    /// table fires too when the stamp changes.
    pub fn set_property(&self, kind: EntityKind, id: &CompletableId, update: CompletableUpdate) -> Result<(), StoreError> {
        let now = self.inner.clock.now();
        let target = EntityRef::new(kind, id.clone());
        let (changed, stamp) = {
            let mut data = self.inner.data.lock();
            let Some(entity) = data.map_mut(kind).get_mut(id) else {
                return Err(not_found(target));
            };
            let field = update.field();
            let stamp = entity.apply(update, now);
            (entity.value_of(field), stamp)
        };

        tracing::trace!(entity = %target, field = ?changed.field(), "property set");
        self.inner.listeners.notify_property(&target, &changed);
        if let Some(stamp) = stamp {
            self.inner.listeners.notify_property(&target, &stamp);
        }
        self.schedule_write(target);
        Ok(())
    }

    /// Flip `completed`. Returns the new value.
    pub fn toggle_completed(&self, kind: EntityKind, id: &CompletableId) -> Result<bool, StoreError> {
        let completed = !self.with(kind, id, |c| c.completed)?;
        self.set_property(kind, id, CompletableUpdate::Completed(completed))?;
        Ok(completed)
    }

    /// Remove an entity.
    ///
    /// The id is detached from every parent's `subtasks` first (each parent's
    /// `Subtasks` table fires and a patch is queued). A project is also dropped
    /// from the user's root list. The entity's whole table then fires with
    /// `None` and every listener for it is purged.
    ///
    /// Children of the removed entity are left in place.
    pub fn delete(&self, kind: EntityKind, id: &CompletableId) -> Result<Completable, StoreError> {
        let target = EntityRef::new(kind, id.clone());
        let (removed, parents, roots) = {
            let mut guard = self.inner.data.lock();
            let data = &mut *guard;
            let Some(removed) = data.map_mut(kind).shift_remove(id) else {
                return Err(not_found(target));
            };

            let mut parents = Vec::new();
            for (parent_kind, map) in [(EntityKind::Project, &mut data.projects), (EntityKind::Task, &mut data.tasks)] {
                for (parent_id, parent) in map.iter_mut() {
                    if parent.detach_subtask(id) {
                        parents.push((EntityRef::new(parent_kind, parent_id.clone()), parent.subtasks.clone()));
                    }
                }
            }

            let roots = match (kind, data.user.as_mut()) {
                (EntityKind::Project, Some(user)) if user.projects.contains(id) => {
                    user.projects.retain(|p| p != id);
                    Some(user.projects.clone())
                }
                _ => None,
            };
            (removed, parents, roots)
        };

        for (parent, subtasks) in parents {
            self.inner
                .listeners
                .notify_property(&parent, &CompletableUpdate::Subtasks(subtasks));
            self.schedule_write(parent);
        }
        if let Some(projects) = roots {
            self.inner.listeners.notify_user_property(&UserUpdate::Projects(projects));
            self.schedule_user_write();
        }

        self.inner.listeners.notify_entity(&target, None);
        self.inner.listeners.purge(&target);

        let scheduler = &self.inner.scheduler;
        if scheduler.cancel(&SaveKey::Create(target.clone())) {
            scheduler.cancel(&SaveKey::Write(target.clone()));
            tracing::debug!(entity = %target, "deleted before its create was sent, nothing to persist");
        } else {
            self.schedule_delete(kind, id.clone());
        }
        tracing::debug!(entity = %target, "entity deleted");
        Ok(removed)
    }

    /// Optimistically create a Task under `parent_id`.
    ///
    /// The task is in the store, and listed in the parent's `subtasks`, before
    /// this returns; the server create runs with the next batch.
    pub fn add_task(
        &self,
        parent_kind: EntityKind,
        parent_id: &CompletableId,
        title: impl Into<String>,
    ) -> Result<Completable, StoreError> {
        let parent = EntityRef::new(parent_kind, parent_id.clone());
        let id = self.inner.ids.generate_completable_id();
        let task = Completable::new(id.clone(), title);

        let subtasks = {
            let mut data = self.inner.data.lock();
            let Some(owner) = data.map_mut(parent_kind).get_mut(parent_id) else {
                return Err(not_found(parent));
            };
            owner.subtasks.push(id.clone());
            let subtasks = owner.subtasks.clone();
            data.tasks.insert(id.clone(), task.clone());
            subtasks
        };

        self.inner
            .listeners
            .notify_property(&parent, &CompletableUpdate::Subtasks(subtasks));
        self.schedule_create(EntityRef::task(id), ParentRef::Completable(parent.clone()));
        // The server appends the child itself; an earlier queued parent patch
        // must run after the create or the child is appended twice.
        self.inner.scheduler.move_to_end(&SaveKey::Write(parent));
        Ok(task)
    }

    /// Optimistically create a Project at the end of the user's root list.
    pub fn add_project(&self, title: impl Into<String>) -> Result<Completable, StoreError> {
        let id = self.inner.ids.generate_completable_id();
        let project = Completable::new(id.clone(), title);

        let projects = {
            let mut data = self.inner.data.lock();
            let Some(user) = data.user.as_mut() else {
                return Err(StoreError::UserNotLoaded);
            };
            user.projects.push(id.clone());
            let projects = user.projects.clone();
            data.projects.insert(id.clone(), project.clone());
            projects
        };

        self.inner.listeners.notify_user_property(&UserUpdate::Projects(projects));
        self.schedule_create(EntityRef::project(id), ParentRef::User);
        self.inner.scheduler.move_to_end(&SaveKey::User);
        Ok(project)
    }
}
