//! Moving and copying collections, with optional merge into a same-named
//! collection already present at the destination.

use std::collections::HashSet;
use uuid::Uuid;

use super::{find_named, require_live};
use crate::auth::{authorize, create_operation, Operation, Subject, User};
use crate::error::{DmsError, DmsResult, COLLISION_ON_MOVE};
use crate::events::Event;
use crate::hub::{accessible, DmsHub, Effects};
use crate::storage::DmsStore;
use crate::types::Collection;

fn collision_error() -> DmsError {
    DmsError::collision(
        "A collection with the same name already exists at the destination",
        COLLISION_ON_MOVE,
    )
}

/// Attach to `target` the documents of `documents` it does not hold yet.
fn absorb_documents(store: &mut DmsStore, target: Uuid, documents: &[Uuid]) -> Vec<Uuid> {
    let mut present: HashSet<Uuid> = store
        .memberships()
        .list_documents(target)
        .into_iter()
        .collect();
    let missing: Vec<Uuid> = documents
        .iter()
        .copied()
        .filter(|d| present.insert(*d))
        .collect();
    store.memberships_mut().attach(target, &missing);
    missing
}

/// Set `is_private` on each of `ids`, returning the documents whose
/// collection tags changed.
fn force_visibility(
    store: &mut DmsStore,
    ids: impl IntoIterator<Item = Uuid>,
    is_private: bool,
) -> DmsResult<Vec<Uuid>> {
    let mut touched = Vec::new();
    for id in ids {
        let node = store.tree_mut().require_mut(id)?;
        if node.is_private != is_private {
            node.is_private = is_private;
            node.updated_at = chrono::Utc::now();
            touched.extend(store.memberships().distinct_documents(id));
        }
    }
    Ok(touched)
}

/// Descendants of `id` take the visibility of `id`.
fn align_visibility(store: &mut DmsStore, id: Uuid) -> DmsResult<Vec<Uuid>> {
    let is_private = store.tree().require(id)?.is_private;
    let descendants = store.tree().descendants(id);
    force_visibility(store, descendants, is_private)
}

/// Merge `source` into `target`: documents are moved over, children are
/// re-parented or merged into same-named children, then `source` is removed.
fn merge_into(
    store: &mut DmsStore,
    actor: &User,
    source: Uuid,
    target: Uuid,
    effects: &mut Effects,
) -> DmsResult<()> {
    let mut work = vec![(source, target)];
    while let Some((src, dst)) = work.pop() {
        let documents = store.memberships_mut().detach_all(src);
        absorb_documents(store, dst, &documents);
        effects.reindex(documents);

        let children: Vec<Collection> = store
            .tree()
            .children_with_trashed(Some(src))
            .into_iter()
            .cloned()
            .collect();
        for child in children {
            let existing = if child.is_trashed() {
                None
            } else {
                find_named(store.tree(), Some(dst), actor.id, &child.name, Some(src))
            };
            match existing {
                Some(existing) => work.push((child.id, existing)),
                None => {
                    store.tree_mut().move_to(child.id, dst)?;
                    if !child.is_trashed() {
                        let is_private = store.tree().require(dst)?.is_private;
                        let subtree = std::iter::once(child.id).chain(store.tree().descendants(child.id));
                        let subtree: Vec<Uuid> = subtree.collect();
                        effects.reindex(force_visibility(store, subtree, is_private)?);
                    }
                }
            }
        }
        store.tree_mut().force_delete(src)?;
    }
    Ok(())
}

/// Live subtree of `root` in pre-order, each entry with the index of its
/// parent entry.
struct Materialized {
    nodes: Vec<(Collection, Vec<Uuid>, Option<usize>)>,
}

fn materialize(store: &DmsStore, root: Uuid) -> DmsResult<Materialized> {
    let mut nodes = Vec::new();
    let mut stack = vec![(root, None)];
    while let Some((id, parent)) = stack.pop() {
        let collection = store.tree().require(id)?.clone();
        let documents = store.memberships().distinct_documents(id);
        let index = nodes.len();
        for child in store.tree().children(Some(id)).iter().rev() {
            stack.push((child.id, Some(index)));
        }
        nodes.push((collection, documents, parent));
    }
    Ok(Materialized { nodes })
}

fn copy_into(
    store: &mut DmsStore,
    actor: &User,
    subtree: Materialized,
    destination: Option<Uuid>,
    merge: bool,
    effects: &mut Effects,
) -> DmsResult<Uuid> {
    for (source, _, _) in &subtree.nodes {
        authorize(actor, create_operation(source.is_private), Subject::none())?;
    }

    let mut placed: Vec<Uuid> = Vec::with_capacity(subtree.nodes.len());
    for (source, documents, parent) in subtree.nodes {
        let dest_parent = match parent {
            Some(idx) => Some(placed[idx]),
            None => destination,
        };
        // the top-level lookup only hits when merging was requested
        let existing = if parent.is_some() || merge {
            find_named(store.tree(), dest_parent, actor.id, &source.name, None)
        } else {
            None
        };
        let node = match existing {
            Some(existing) => existing,
            None => {
                let mut copy = Collection::new(source.name.clone(), actor.id, source.is_private);
                copy.color = source.color.clone();
                copy.kind = source.kind;
                match dest_parent {
                    Some(pid) => store.tree_mut().add_child(pid, copy)?,
                    None => store.tree_mut().make_root(copy, 0),
                }
            }
        };
        let added = absorb_documents(store, node, &documents);
        effects.reindex(added);
        placed.push(node);
    }
    placed
        .first()
        .copied()
        .ok_or_else(|| DmsError::invalid("nothing to copy"))
}

impl DmsHub {
    /// Re-parent a collection below `below`, or make it a root for `None`.
    pub fn move_collection(
        &self,
        actor: &User,
        id: Uuid,
        below: Option<Uuid>,
        merge: bool,
    ) -> DmsResult<Collection> {
        let mut store = self.store().write();
        let collection = require_live(store.tree(), id)?.clone();
        authorize(actor, Operation::EditCollection, Subject::from(&collection))?;
        if let Some(target) = below {
            require_live(store.tree(), target)?;
            if target == id || store.tree().is_descendant_of(target, id) {
                return Err(DmsError::invalid(
                    "a collection cannot be moved below itself or one of its descendants",
                ));
            }
        }

        let collision = find_named(store.tree(), below, actor.id, &collection.name, Some(id));
        if collision.is_some() && !merge {
            return Err(collision_error());
        }

        let mut effects = Effects::default();
        let result = store.transaction(|s| match collision {
            Some(existing) => {
                merge_into(s, actor, id, existing, &mut effects)?;
                Ok(s.tree().require(existing)?.clone())
            }
            None => {
                match below {
                    Some(target) => s.tree_mut().move_to(id, target)?,
                    None => s.tree_mut().promote_to_root(id, 0)?,
                }
                effects.reindex(align_visibility(s, id)?);
                Ok(s.tree().require(id)?.clone())
            }
        })?;

        effects.forget_both(actor);
        effects.forget_listing_of(&collection);
        match collision {
            Some(existing) => {
                tracing::info!(source = %id, into = %existing, "collection merged");
                effects.emit(Event::Merged {
                    source: id,
                    into: existing,
                });
            }
            None => {
                tracing::info!(collection = %id, parent = ?below, "collection moved");
                effects.emit(Event::Moved {
                    id,
                    new_parent: below,
                });
            }
        }
        self.finish(&mut store, effects);
        Ok(result)
    }

    /// Copy a collection, its live subtree and its memberships under
    /// `under`, or as a new root for `None`. The source is left untouched.
    pub fn copy_collection(
        &self,
        actor: &User,
        id: Uuid,
        under: Option<Uuid>,
        merge: bool,
    ) -> DmsResult<Collection> {
        let mut store = self.store().write();
        let source = require_live(store.tree(), id)?.clone();
        if !accessible(actor, &source) {
            return Err(DmsError::forbidden("You cannot access this collection"));
        }
        authorize(actor, create_operation(source.is_private), Subject::none())?;
        if let Some(target) = under {
            require_live(store.tree(), target)?;
        }

        let collision = find_named(store.tree(), under, actor.id, &source.name, None);
        if collision.is_some() && !merge {
            return Err(collision_error());
        }

        let subtree = materialize(&store, id)?;
        let mut effects = Effects::default();
        let top = store.transaction(|s| {
            let top = copy_into(s, actor, subtree, under, merge, &mut effects)?;
            Ok(s.tree().require(top)?.clone())
        })?;

        effects.forget_both(actor);
        effects.emit(Event::Copied {
            source: id,
            copy: top.id,
        });
        tracing::info!(source = %id, copy = %top.id, "collection copied");
        self.finish(&mut store, effects);
        Ok(top)
    }
}
