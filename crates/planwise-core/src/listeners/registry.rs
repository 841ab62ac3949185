//! Listener registry: whole-entity and per-property tables for completables and the user.
//!
//! Dispatch happens synchronously after each mutation, with the registry lock
//! released, in registration order within each table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::subscription::Subscription;
use super::table::{ListenerId, ListenerTable, dispatch};
use crate::domain::{Completable, CompletableField, CompletableUpdate, EntityRef, User, UserField, UserUpdate};

/// Whole-entity listener. `None` means the entity was deleted.
pub type EntityListener = dyn Fn(Option<&Completable>) + Send + Sync;
/// Per-property listener. Receives only the new value.
pub type PropertyListener = dyn Fn(&CompletableUpdate) + Send + Sync;
pub type UserListener = dyn Fn(&User) + Send + Sync;
pub type UserPropertyListener = dyn Fn(&UserUpdate) + Send + Sync;

#[derive(Default)]
struct EntityTables {
    whole: ListenerTable<EntityListener>,
    properties: HashMap<CompletableField, ListenerTable<PropertyListener>>,
}

impl EntityTables {
    fn is_empty(&self) -> bool {
        self.whole.is_empty() && self.properties.values().all(ListenerTable::is_empty)
    }
}

#[derive(Default)]
struct UserTables {
    whole: ListenerTable<UserListener>,
    properties: HashMap<UserField, ListenerTable<UserPropertyListener>>,
}

#[derive(Default)]
struct Tables {
    entities: HashMap<EntityRef, EntityTables>,
    user: UserTables,
}

/// Which table a registration lives in.
#[derive(Debug, Clone)]
enum Target {
    Entity(EntityRef),
    EntityProperty(EntityRef, CompletableField),
    User,
    UserProperty(UserField),
}

impl Tables {
    fn remove(&mut self, target: &Target, id: &ListenerId, generation: Option<u64>) -> bool {
        fn take<F: ?Sized>(table: &mut ListenerTable<F>, id: &ListenerId, generation: Option<u64>) -> bool {
            match generation {
                Some(g) => table.remove_generation(id, g),
                None => table.remove(id),
            }
        }

        let removed = match target {
            Target::Entity(entity) => self
                .entities
                .get_mut(entity)
                .is_some_and(|t| take(&mut t.whole, id, generation)),
            Target::EntityProperty(entity, field) => self
                .entities
                .get_mut(entity)
                .and_then(|t| t.properties.get_mut(field))
                .is_some_and(|t| take(t, id, generation)),
            Target::User => take(&mut self.user.whole, id, generation),
            Target::UserProperty(field) => self
                .user
                .properties
                .get_mut(field)
                .is_some_and(|t| take(t, id, generation)),
        };

        if let Target::Entity(entity) | Target::EntityProperty(entity, _) = target
            && self.entities.get(entity).is_some_and(EntityTables::is_empty)
        {
            self.entities.remove(entity);
        }
        removed
    }
}

/// Subscription tables for every entity in one store.
///
/// Cloning shares the tables.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    tables: Arc<Mutex<Tables>>,
    generations: Arc<AtomicU64>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn anonymous_id(generation: u64) -> ListenerId {
        ListenerId::new(format!("~sub-{generation}"))
    }

    fn handle(&self, target: Target, id: ListenerId, generation: u64) -> Subscription {
        let tables: Weak<Mutex<Tables>> = Arc::downgrade(&self.tables);
        let cancel_id = id.clone();
        Subscription::new(id, move || {
            tables
                .upgrade()
                .is_some_and(|t| t.lock().remove(&target, &cancel_id, Some(generation)))
        })
    }

    // ---------------------------------------------------------------------
    // completables: whole entity
    // ---------------------------------------------------------------------

    /// Register `listener_id` for whole-entity changes of `entity`. Last writer wins.
    pub fn listen<F>(&self, entity: EntityRef, listener_id: impl Into<ListenerId>, f: F) -> Subscription
    where
        F: Fn(Option<&Completable>) + Send + Sync + 'static,
    {
        let id = listener_id.into();
        let generation = self.next_generation();
        self.tables
            .lock()
            .entities
            .entry(entity.clone())
            .or_default()
            .whole
            .insert(id.clone(), generation, Arc::new(f));
        self.handle(Target::Entity(entity), id, generation)
    }

    /// Register with a fresh, collision-free listener id.
    pub fn subscribe<F>(&self, entity: EntityRef, f: F) -> Subscription
    where
        F: Fn(Option<&Completable>) + Send + Sync + 'static,
    {
        let id = Self::anonymous_id(self.next_generation());
        self.listen(entity, id, f)
    }

    pub fn remove_listener(&self, entity: &EntityRef, listener_id: &ListenerId) -> bool {
        self.tables
            .lock()
            .remove(&Target::Entity(entity.clone()), listener_id, None)
    }

    // ---------------------------------------------------------------------
    // completables: single property
    // ---------------------------------------------------------------------

    pub fn listen_property<F>(
        &self,
        entity: EntityRef,
        field: CompletableField,
        listener_id: impl Into<ListenerId>,
        f: F,
    ) -> Subscription
    where
        F: Fn(&CompletableUpdate) + Send + Sync + 'static,
    {
        let id = listener_id.into();
        let generation = self.next_generation();
        self.tables
            .lock()
            .entities
            .entry(entity.clone())
            .or_default()
            .properties
            .entry(field)
            .or_default()
            .insert(id.clone(), generation, Arc::new(f));
        self.handle(Target::EntityProperty(entity, field), id, generation)
    }

    pub fn subscribe_property<F>(&self, entity: EntityRef, field: CompletableField, f: F) -> Subscription
    where
        F: Fn(&CompletableUpdate) + Send + Sync + 'static,
    {
        let id = Self::anonymous_id(self.next_generation());
        self.listen_property(entity, field, id, f)
    }

    pub fn remove_property_listener(
        &self,
        entity: &EntityRef,
        field: CompletableField,
        listener_id: &ListenerId,
    ) -> bool {
        self.tables
            .lock()
            .remove(&Target::EntityProperty(entity.clone(), field), listener_id, None)
    }

    // ---------------------------------------------------------------------
    // user
    // ---------------------------------------------------------------------

    pub fn listen_user<F>(&self, listener_id: impl Into<ListenerId>, f: F) -> Subscription
    where
        F: Fn(&User) + Send + Sync + 'static,
    {
        let id = listener_id.into();
        let generation = self.next_generation();
        self.tables
            .lock()
            .user
            .whole
            .insert(id.clone(), generation, Arc::new(f));
        self.handle(Target::User, id, generation)
    }

    pub fn subscribe_user<F>(&self, f: F) -> Subscription
    where
        F: Fn(&User) + Send + Sync + 'static,
    {
        let id = Self::anonymous_id(self.next_generation());
        self.listen_user(id, f)
    }

    pub fn remove_user_listener(&self, listener_id: &ListenerId) -> bool {
        self.tables.lock().remove(&Target::User, listener_id, None)
    }

    pub fn listen_user_property<F>(&self, field: UserField, listener_id: impl Into<ListenerId>, f: F) -> Subscription
    where
        F: Fn(&UserUpdate) + Send + Sync + 'static,
    {
        let id = listener_id.into();
        let generation = self.next_generation();
        self.tables
            .lock()
            .user
            .properties
            .entry(field)
            .or_default()
            .insert(id.clone(), generation, Arc::new(f));
        self.handle(Target::UserProperty(field), id, generation)
    }

    pub fn subscribe_user_property<F>(&self, field: UserField, f: F) -> Subscription
    where
        F: Fn(&UserUpdate) + Send + Sync + 'static,
    {
        let id = Self::anonymous_id(self.next_generation());
        self.listen_user_property(field, id, f)
    }

    pub fn remove_user_property_listener(&self, field: UserField, listener_id: &ListenerId) -> bool {
        self.tables
            .lock()
            .remove(&Target::UserProperty(field), listener_id, None)
    }

    // ---------------------------------------------------------------------
    // dispatch
    // ---------------------------------------------------------------------

    pub(crate) fn notify_entity(&self, entity: &EntityRef, value: Option<&Completable>) {
        let listeners = match self.tables.lock().entities.get(entity) {
            Some(t) => t.whole.snapshot(),
            None => return,
        };
        dispatch(listeners, |f| f(value));
    }

    pub(crate) fn notify_property(&self, entity: &EntityRef, update: &CompletableUpdate) {
        let listeners = match self
            .tables
            .lock()
            .entities
            .get(entity)
            .and_then(|t| t.properties.get(&update.field()))
        {
            Some(t) => t.snapshot(),
            None => return,
        };
        dispatch(listeners, |f| f(update));
    }

    pub(crate) fn notify_user(&self, user: &User) {
        let listeners = self.tables.lock().user.whole.snapshot();
        dispatch(listeners, |f| f(user));
    }

    pub(crate) fn notify_user_property(&self, update: &UserUpdate) {
        let listeners = match self.tables.lock().user.properties.get(&update.field()) {
            Some(t) => t.snapshot(),
            None => return,
        };
        dispatch(listeners, |f| f(update));
    }

    /// Drop every table of `entity`. Returns whether anything was registered.
    pub(crate) fn purge(&self, entity: &EntityRef) -> bool {
        self.tables.lock().entities.remove(entity).is_some()
    }

    pub(crate) fn clear(&self) {
        *self.tables.lock() = Tables::default();
    }

    /// Number of registrations for `entity` across its whole and property tables.
    pub fn listener_count(&self, entity: &EntityRef) -> usize {
        self.tables.lock().entities.get(entity).map_or(0, |t| {
            t.whole.len() + t.properties.values().map(ListenerTable::len).sum::<usize>()
        })
    }
}
