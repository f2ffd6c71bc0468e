use chrono::Utc;
use uuid::Uuid;

use super::{find_named, owned_by_actor};
use crate::auth::{authorize, Operation, Subject, User};
use crate::error::{DmsError, DmsResult};
use crate::events::Event;
use crate::hub::{DmsHub, Effects};
use crate::storage::DmsStore;
use crate::types::Collection;

/// Soft-delete `id` and every descendant the actor owns, detaching their
/// documents. Descendants owned by someone else keep their state.
fn trash_subtree(
    store: &mut DmsStore,
    actor: &User,
    id: Uuid,
    effects: &mut Effects,
) -> DmsResult<()> {
    let now = Utc::now();
    let detached = store.memberships_mut().detach_all(id);
    effects.reindex(detached);

    for descendant in store.tree().descendants(id) {
        let node = store.tree().require(descendant)?;
        if !owned_by_actor(node, actor) || node.is_trashed() {
            continue;
        }
        let detached = store.memberships_mut().detach_all(descendant);
        effects.reindex(detached);
        store.tree_mut().soft_delete(descendant, now)?;
    }
    store.tree_mut().soft_delete(id, now)?;
    Ok(())
}

impl DmsHub {
    /// Move a collection and the actor's part of its subtree to the trash.
    pub fn delete_collection(&self, actor: &User, id: Uuid) -> DmsResult<bool> {
        let mut store = self.store().write();
        let collection = store.tree().require(id)?.clone();
        authorize(actor, Operation::DeleteCollection, Subject::from(&collection))?;
        if collection.is_trashed() {
            return Err(DmsError::NotFound(format!(
                "collection {id} is already in the trash"
            )));
        }

        let mut effects = Effects::default();
        store.transaction(|s| trash_subtree(s, actor, id, &mut effects))?;
        effects.forget_both(actor);
        effects.forget_listing_of(&collection);
        effects.emit(Event::Trashed { id });
        tracing::info!(collection = %id, user = actor.id, "collection trashed");
        self.finish(&mut store, effects);
        Ok(true)
    }

    /// Remove a single collection for good, trashing it first when needed.
    ///
    /// Trashed descendants are not purged and keep pointing at the removed
    /// parent.
    pub fn permanently_delete_collection(&self, id: Uuid, actor: &User) -> DmsResult<()> {
        let mut store = self.store().write();
        let collection = store.tree().require(id)?.clone();
        authorize(actor, Operation::DeleteCollection, Subject::from(&collection))?;

        let mut effects = Effects::default();
        if !collection.is_trashed() {
            store.transaction(|s| trash_subtree(s, actor, id, &mut effects))?;
            effects.emit(Event::Trashed { id });
        }
        store.transaction(|s| {
            let leftover = s.memberships_mut().detach_all(id);
            effects.reindex(leftover);
            s.tree_mut().force_delete(id)?;
            Ok(())
        })?;
        effects.forget_both(actor);
        effects.forget_listing_of(&collection);
        effects.emit(Event::Purged { id });
        tracing::info!(collection = %id, user = actor.id, "collection purged");
        self.finish(&mut store, effects);
        Ok(())
    }

    /// Bring a trashed collection back, together with the descendants the
    /// actor trashed along with it. Detached documents are not re-attached.
    pub fn restore_collection(&self, actor: &User, id: Uuid) -> DmsResult<Collection> {
        let mut store = self.store().write();
        let collection = store.tree().require(id)?.clone();
        authorize(actor, Operation::DeleteCollection, Subject::from(&collection))?;
        let Some(trashed_at) = collection.deleted_at else {
            return Ok(collection);
        };

        let parent_alive = collection
            .parent_id
            .and_then(|pid| store.tree().get(pid))
            .map_or(false, |p| !p.is_trashed());
        let target_parent = if parent_alive {
            collection.parent_id
        } else {
            None
        };
        if find_named(store.tree(), target_parent, actor.id, &collection.name, Some(id)).is_some() {
            return Err(DmsError::AlreadyExists {
                name: collection.name.clone(),
                parent: target_parent,
            });
        }

        let mut effects = Effects::default();
        let restored = store.transaction(|s| {
            if !parent_alive && collection.parent_id.is_some() {
                s.tree_mut().promote_to_root(id, 0)?;
            }
            for descendant in s.tree().descendants(id) {
                let node = s.tree().require(descendant)?;
                if owned_by_actor(node, actor) && node.deleted_at == Some(trashed_at) {
                    s.tree_mut().restore(descendant)?;
                }
            }
            s.tree_mut().restore(id)?;
            Ok(s.tree().require(id)?.clone())
        })?;
        effects.forget_both(actor);
        effects.forget_listing_of(&restored);
        effects.emit(Event::Restored { id });
        tracing::info!(collection = %id, user = actor.id, "collection restored");
        self.finish(&mut store, effects);
        Ok(restored)
    }
}
