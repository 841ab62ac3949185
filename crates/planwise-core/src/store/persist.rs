//! Persistence callbacks queued by the store.
//!
//! Callbacks hold a weak store handle and read the entity when they run, so a
//! coalesced write always sends the latest value.

use std::sync::{Arc, Weak};

use super::{Store, StoreInner};
use crate::domain::{CompletableId, EntityKind, EntityRef, SaveError};
use crate::ports::ParentRef;
use crate::save::SaveKey;

impl Store {
    fn weak(&self) -> Weak<StoreInner> {
        Arc::downgrade(&self.inner)
    }

    /// Queue a PATCH of `entity` with whatever it holds at execution time.
    pub(super) fn schedule_write(&self, entity: EntityRef) {
        let store = self.weak();
        let key = SaveKey::Write(entity.clone());
        self.inner.scheduler.schedule(key, move || async move {
            let Some(inner) = store.upgrade() else {
                return Ok(());
            };
            let Some(current) = inner.lookup(&entity) else {
                tracing::debug!(%entity, "entity gone before its write ran, skipping");
                return Ok(());
            };
            let accepted = inner.persistence.patch_entity(entity.kind, &current).await?;
            if accepted {
                Ok(())
            } else {
                Err(SaveError::Rejected { target: entity.to_string() })
            }
        });
    }

    pub(super) fn schedule_user_write(&self) {
        let store = self.weak();
        self.inner.scheduler.schedule(SaveKey::User, move || async move {
            let Some(inner) = store.upgrade() else {
                return Ok(());
            };
            let Some(user) = inner.current_user() else {
                return Ok(());
            };
            if inner.persistence.patch_user(&user).await? {
                Ok(())
            } else {
                Err(SaveError::Rejected { target: format!("user:{}", user.id) })
            }
        });
    }

    /// Queue the POST for an entity created locally under `parent`.
    pub(super) fn schedule_create(&self, entity: EntityRef, parent: ParentRef) {
        let store = self.weak();
        let key = SaveKey::Create(entity.clone());
        self.inner.scheduler.schedule(key, move || async move {
            let Some(inner) = store.upgrade() else {
                return Ok(());
            };
            let Some(current) = inner.lookup(&entity) else {
                return Ok(());
            };
            inner.persistence.create_subtask(&parent, &current).await?;
            Ok(())
        });
    }

    /// Queue the DELETE. Shares the write key so a pending PATCH is superseded.
    pub(super) fn schedule_delete(&self, kind: EntityKind, id: CompletableId) {
        let store = self.weak();
        let key = SaveKey::Write(EntityRef::new(kind, id.clone()));
        self.inner.scheduler.schedule(key, move || async move {
            let Some(inner) = store.upgrade() else {
                return Ok(());
            };
            match inner.persistence.delete_entity(kind, &id).await? {
                Some(_) => Ok(()),
                None => {
                    tracing::warn!(kind = %kind, id = %id, "server had nothing to delete");
                    Ok(())
                }
            }
        });
    }
}

