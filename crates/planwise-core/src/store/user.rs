//! User mutators: settings, tags, filters.

use super::Store;
use crate::domain::{CompletableUpdate, EntityKind, EntityRef, StoreError, TagId, TagInfo, User, UserField, UserUpdate};

impl Store {
    /// Replace the user and fire the user's whole table.
    pub fn set_user(&self, user: User) {
        self.inner.data.lock().user = Some(user.clone());
        self.inner.listeners.notify_user(&user);
        self.schedule_user_write();
    }

    pub fn set_user_property(&self, update: UserUpdate) -> Result<(), StoreError> {
        let changed = self.update_user(|user| {
            let field = update.field();
            user.apply(update);
            field
        })?;
        self.inner.listeners.notify_user_property(&changed);
        self.schedule_user_write();
        Ok(())
    }

    /// Set one named flag in the user settings.
    pub fn set_setting(&self, name: impl Into<String>, value: bool) -> Result<(), StoreError> {
        let name = name.into();
        let changed = self.update_user(|user| {
            user.settings.insert(name, value);
            UserField::Settings
        })?;
        self.inner.listeners.notify_user_property(&changed);
        self.schedule_user_write();
        Ok(())
    }

    /// Add a tag, or recolor the existing tag with the same name.
    pub fn upsert_tag(&self, name: impl Into<String>, color: impl Into<String>) -> Result<TagId, StoreError> {
        let (name, color) = (name.into(), color.into());
        let mut tag_id = self.inner.ids.generate_tag_id();
        let changed = self.update_user(|user| {
            if let Some((existing, _)) = user.current_tags.iter().find(|(_, info)| info.name == name) {
                tag_id = existing.clone();
            }
            user.current_tags.insert(tag_id.clone(), TagInfo { name, color });
            UserField::CurrentTags
        })?;
        self.inner.listeners.notify_user_property(&changed);
        self.schedule_user_write();
        Ok(tag_id)
    }

    /// Forget a tag everywhere it is referenced.
    ///
    /// Returns `false` when the user had no such tag; completables are still
    /// scrubbed in that case.
    pub fn remove_tag(&self, tag: &TagId) -> Result<bool, StoreError> {
        let (known, filters) = {
            let mut data = self.inner.data.lock();
            let user = data.user.as_mut().ok_or(StoreError::UserNotLoaded)?;
            let known = user.current_tags.remove(tag).is_some();
            let shown = user.filters.tag_ids_to_show.len();
            user.filters.tag_ids_to_show.retain(|t| t != tag);
            let filters = (user.filters.tag_ids_to_show.len() != shown).then(|| user.filters.clone());
            (known, filters)
        };

        let tagged: Vec<(EntityRef, Vec<TagId>)> = {
            let mut guard = self.inner.data.lock();
            let data = &mut *guard;
            let mut tagged = Vec::new();
            for (kind, map) in [(EntityKind::Project, &mut data.projects), (EntityKind::Task, &mut data.tasks)] {
                for (id, entity) in map.iter_mut().filter(|(_, e)| e.has_tag(tag)) {
                    entity.tags.retain(|t| t != tag);
                    tagged.push((EntityRef::new(kind, id.clone()), entity.tags.clone()));
                }
            }
            tagged
        };

        if known {
            let current = self.user()?.current_tags;
            self.inner
                .listeners
                .notify_user_property(&UserUpdate::CurrentTags(current));
        }
        if let Some(filters) = &filters {
            self.inner
                .listeners
                .notify_user_property(&UserUpdate::Filters(filters.clone()));
        }
        if known || filters.is_some() || !tagged.is_empty() {
            self.schedule_user_write();
        }
        for (entity, tags) in tagged {
            self.inner.listeners.notify_property(&entity, &CompletableUpdate::Tags(tags));
            self.schedule_write(entity);
        }
        tracing::debug!(tag = %tag, known, "tag removed");
        Ok(known)
    }

    /// Mutate the user under the lock; returns the new value of the touched field.
    fn update_user(&self, f: impl FnOnce(&mut User) -> UserField) -> Result<UserUpdate, StoreError> {
        let mut data = self.inner.data.lock();
        let user = data.user.as_mut().ok_or(StoreError::UserNotLoaded)?;
        let field = f(user);
        Ok(user.value_of(field))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::super::testing::store;
    use super::*;
    use crate::domain::{CompletableField, CompletableId};
    use crate::save::SaveKey;

    #[tokio::test(start_paused = true)]
    async fn user_property_fires_only_its_field() {
        let (store, _) = store().await;
        let whole = Arc::new(Mutex::new(0));
        let settings = Arc::new(Mutex::new(Vec::new()));
        let (w, s) = (whole.clone(), settings.clone());
        store.listeners().subscribe_user(move |_| *w.lock() += 1);
        store
            .listeners()
            .subscribe_user_property(UserField::Settings, move |u| s.lock().push(u.clone()));

        store.set_setting("darkMode", true).unwrap();

        assert_eq!(*whole.lock(), 0);
        assert_eq!(settings.lock().len(), 1);
        assert!(store.user().unwrap().setting("darkMode"));
        assert_eq!(store.pending_saves(), vec![SaveKey::User]);
    }

    #[tokio::test(start_paused = true)]
    async fn set_user_fires_whole_table() {
        let (store, backend) = store().await;
        let ids = Arc::new(Mutex::new(Vec::new()));
        let i = ids.clone();
        store.listeners().subscribe_user(move |u| i.lock().push(u.projects.len()));

        let mut user = store.user().unwrap();
        user.projects.clear();
        store.set_user(user);
        store.manual_save().await;

        assert_eq!(*ids.lock(), vec![0]);
        assert!(backend.stored_user().unwrap().projects.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn upsert_tag_reuses_ids_by_name() {
        let (store, _) = store().await;
        let work = store.upsert_tag("work", "#f00").unwrap();
        let again = store.upsert_tag("work", "#0f0").unwrap();
        let home = store.upsert_tag("home", "#00f").unwrap();

        assert_eq!(work, again);
        assert_ne!(work, home);
        let tags = store.user().unwrap().current_tags;
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[&work].color, "#0f0");
    }

    #[tokio::test(start_paused = true)]
    async fn remove_tag_scrubs_filters_and_completables() {
        let (store, _) = store().await;
        let work = store.upsert_tag("work", "#f00").unwrap();
        let t1 = CompletableId::new("t1");
        store
            .set_property(EntityKind::Task, &t1, CompletableUpdate::Tags(vec![work.clone()]))
            .unwrap();
        let mut filters = store.user().unwrap().filters;
        filters.tag_ids_to_show = vec![work.clone()];
        store.set_user_property(UserUpdate::Filters(filters)).unwrap();

        let tags_seen = Arc::new(Mutex::new(Vec::new()));
        let s = tags_seen.clone();
        store
            .listeners()
            .subscribe_property(EntityRef::task("t1"), CompletableField::Tags, move |u| s.lock().push(u.clone()));

        assert!(store.remove_tag(&work).unwrap());

        let user = store.user().unwrap();
        assert!(user.current_tags.is_empty());
        assert!(user.filters.tag_ids_to_show.is_empty());
        assert!(store.get(EntityKind::Task, &t1).unwrap().tags.is_empty());
        assert_eq!(*tags_seen.lock(), vec![CompletableUpdate::Tags(vec![])]);
        assert!(!store.remove_tag(&work).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_unknown_tag_still_saves_scrubbed_filters() {
        let (store, backend) = store().await;
        let ghost = TagId::new("ghost");
        let mut filters = store.user().unwrap().filters;
        filters.tag_ids_to_show = vec![ghost.clone()];
        store.set_user_property(UserUpdate::Filters(filters)).unwrap();
        store.manual_save().await;
        assert_eq!(backend.stored_user().unwrap().filters.tag_ids_to_show, vec![ghost.clone()]);

        assert!(!store.remove_tag(&ghost).unwrap());
        assert_eq!(store.pending_saves(), vec![SaveKey::User]);

        store.manual_save().await;
        assert!(backend.stored_user().unwrap().filters.tag_ids_to_show.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn user_mutators_need_a_loaded_user() {
        let (store, _) = store().await;
        store.clear();
        assert!(matches!(store.set_setting("x", true), Err(StoreError::UserNotLoaded)));
        assert!(matches!(store.upsert_tag("x", "#000"), Err(StoreError::UserNotLoaded)));
    }
}
