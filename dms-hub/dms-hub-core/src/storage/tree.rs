//! Adjacency representation of the collection forest.
//!
//! Every node stores its parent id, its depth and a sibling position. Child
//! lists are derived by scanning, ordered by `(position, seq)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{DmsError, DmsResult};
use crate::types::Collection;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CollectionTree {
    nodes: BTreeMap<Uuid, Collection>,
    #[serde(default)]
    next_seq: u64,
}

impl CollectionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Collection> {
        self.nodes.values()
    }

    pub fn get(&self, id: Uuid) -> Option<&Collection> {
        self.nodes.get(&id)
    }

    pub fn require(&self, id: Uuid) -> DmsResult<&Collection> {
        self.nodes
            .get(&id)
            .ok_or_else(|| DmsError::NotFound(format!("collection {id}")))
    }

    pub fn require_mut(&mut self, id: Uuid) -> DmsResult<&mut Collection> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| DmsError::NotFound(format!("collection {id}")))
    }

    pub fn parent(&self, id: Uuid) -> Option<&Collection> {
        self.get(id)
            .and_then(|c| c.parent_id)
            .and_then(|pid| self.get(pid))
    }

    fn ordered<'a>(mut items: Vec<&'a Collection>) -> Vec<&'a Collection> {
        items.sort_by_key(|c| (c.position, c.seq));
        items
    }

    /// Direct children of `parent` (roots when `None`), trashed included.
    pub fn children_with_trashed(&self, parent: Option<Uuid>) -> Vec<&Collection> {
        Self::ordered(
            self.nodes
                .values()
                .filter(|c| c.parent_id == parent)
                .collect(),
        )
    }

    /// Live direct children of `parent`, or the live roots when `None`.
    pub fn children(&self, parent: Option<Uuid>) -> Vec<&Collection> {
        Self::ordered(
            self.nodes
                .values()
                .filter(|c| c.parent_id == parent && !c.is_trashed())
                .collect(),
        )
    }

    pub fn roots(&self) -> Vec<&Collection> {
        self.children(None)
    }

    /// Every node below `id`, depth-first pre-order, trashed nodes included.
    pub fn descendants(&self, id: Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        let mut stack: Vec<Uuid> = self
            .children_with_trashed(Some(id))
            .iter()
            .rev()
            .map(|c| c.id)
            .collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            for child in self.children_with_trashed(Some(next)).iter().rev() {
                stack.push(child.id);
            }
        }
        out
    }

    /// Ancestor chain of `id`, root first.
    pub fn ancestors(&self, id: Uuid) -> Vec<&Collection> {
        let mut chain = Vec::new();
        let mut current = self.get(id).and_then(|c| c.parent_id);
        while let Some(pid) = current {
            match self.get(pid) {
                Some(parent) => {
                    // guards against a corrupted snapshot with a cycle
                    if chain.iter().any(|c: &&Collection| c.id == parent.id) {
                        break;
                    }
                    chain.push(parent);
                    current = parent.parent_id;
                }
                None => break,
            }
        }
        chain.reverse();
        chain
    }

    /// Live nodes sharing the parent of `id`, excluding `id` itself.
    pub fn siblings(&self, id: Uuid) -> Vec<&Collection> {
        match self.get(id) {
            Some(node) => self
                .children(node.parent_id)
                .into_iter()
                .filter(|c| c.id != id)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn is_descendant_of(&self, id: Uuid, ancestor: Uuid) -> bool {
        self.ancestors(id).iter().any(|c| c.id == ancestor)
    }

    fn next_position(&self, parent: Option<Uuid>) -> i64 {
        self.children_with_trashed(parent)
            .last()
            .map(|c| c.position + 1)
            .unwrap_or(0)
    }

    fn take_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Insert a new node as a root at the given sort position.
    pub fn make_root(&mut self, mut collection: Collection, position: i64) -> Uuid {
        collection.parent_id = None;
        collection.depth = 0;
        collection.position = position;
        collection.seq = self.take_seq();
        let id = collection.id;
        self.nodes.insert(id, collection);
        id
    }

    /// Insert a new node after the last child of `parent`.
    pub fn add_child(&mut self, parent: Uuid, mut collection: Collection) -> DmsResult<Uuid> {
        let depth = self.require(parent)?.depth + 1;
        collection.parent_id = Some(parent);
        collection.depth = depth;
        collection.position = self.next_position(Some(parent));
        collection.seq = self.take_seq();
        let id = collection.id;
        self.nodes.insert(id, collection);
        Ok(id)
    }

    /// Re-parent `id` under `parent`, appended after the last sibling.
    pub fn move_to(&mut self, id: Uuid, parent: Uuid) -> DmsResult<()> {
        self.require(id)?;
        let parent_depth = self.require(parent)?.depth;
        if parent == id || self.is_descendant_of(parent, id) {
            return Err(DmsError::invalid(
                "a collection cannot be moved below itself or one of its descendants",
            ));
        }
        let position = self.next_position(Some(parent));
        let seq = self.take_seq();
        let node = self.require_mut(id)?;
        node.parent_id = Some(parent);
        node.position = position;
        node.seq = seq;
        node.updated_at = Utc::now();
        self.shift_depth(id, parent_depth + 1);
        Ok(())
    }

    /// Turn an existing node into a root at the given sort position.
    pub fn promote_to_root(&mut self, id: Uuid, position: i64) -> DmsResult<()> {
        let seq = self.take_seq();
        let node = self.require_mut(id)?;
        node.parent_id = None;
        node.position = position;
        node.seq = seq;
        node.updated_at = Utc::now();
        self.shift_depth(id, 0);
        Ok(())
    }

    fn shift_depth(&mut self, id: Uuid, new_depth: u32) {
        let old_depth = match self.nodes.get(&id) {
            Some(node) => node.depth,
            None => return,
        };
        let ids = std::iter::once(id).chain(self.descendants(id));
        let ids: Vec<Uuid> = ids.collect();
        for nid in ids {
            if let Some(node) = self.nodes.get_mut(&nid) {
                node.depth = node.depth - old_depth + new_depth;
            }
        }
    }

    pub fn soft_delete(&mut self, id: Uuid, at: DateTime<Utc>) -> DmsResult<()> {
        let node = self.require_mut(id)?;
        node.deleted_at = Some(at);
        Ok(())
    }

    pub fn restore(&mut self, id: Uuid) -> DmsResult<()> {
        let node = self.require_mut(id)?;
        node.deleted_at = None;
        node.updated_at = Utc::now();
        Ok(())
    }

    /// Remove a single node. Its children keep their dangling parent id.
    pub fn force_delete(&mut self, id: Uuid) -> DmsResult<Collection> {
        self.nodes
            .remove(&id)
            .ok_or_else(|| DmsError::NotFound(format!("collection {id}")))
    }
}
