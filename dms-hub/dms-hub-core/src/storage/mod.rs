//! Persistent state of the hub: the collection tree, the membership rows and
//! the document registry.
//!
//! File-backed stores keep one JSON snapshot per component inside the data
//! directory and rewrite it on every committed transaction.

pub mod documents;
pub mod membership;
pub mod tree;

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

use crate::error::DmsResult;
pub use documents::DocumentRegistry;
pub use membership::MembershipStore;
pub use tree::CollectionTree;

const COLLECTIONS_FILE: &str = "collections.json";
const MEMBERSHIPS_FILE: &str = "memberships.json";
const DOCUMENTS_FILE: &str = "documents.json";

pub struct DmsStore {
    dir: Option<PathBuf>,
    tree: CollectionTree,
    memberships: MembershipStore,
    documents: DocumentRegistry,
    depth: usize,
}

impl DmsStore {
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            tree: CollectionTree::new(),
            memberships: MembershipStore::new(),
            documents: DocumentRegistry::new(),
            depth: 0,
        }
    }

    /// Open (or create) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> DmsResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let tree = load_or_default(&dir.join(COLLECTIONS_FILE))?;
        let memberships = load_or_default(&dir.join(MEMBERSHIPS_FILE))?;
        let documents = load_or_default(&dir.join(DOCUMENTS_FILE))?;
        tracing::info!(path = %dir.display(), "opened dms store");
        Ok(Self {
            dir: Some(dir),
            tree,
            memberships,
            documents,
            depth: 0,
        })
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn tree(&self) -> &CollectionTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut CollectionTree {
        &mut self.tree
    }

    pub fn memberships(&self) -> &MembershipStore {
        &self.memberships
    }

    pub fn memberships_mut(&mut self) -> &mut MembershipStore {
        &mut self.memberships
    }

    pub fn documents(&self) -> &DocumentRegistry {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut DocumentRegistry {
        &mut self.documents
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Run `f` atomically over the tree and the memberships.
    ///
    /// Any error restores both to their state before the call. Nested calls
    /// join the outer transaction; the snapshot files are written once the
    /// outermost transaction commits. The document registry is not part of
    /// the snapshot, so status transitions survive a rollback.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> DmsResult<T>) -> DmsResult<T> {
        let tree = self.tree.clone();
        let memberships = self.memberships.clone();
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        let result = match result {
            Ok(value) if self.depth == 0 => self.persist().map(|_| value),
            other => other,
        };
        if result.is_err() {
            self.tree = tree;
            self.memberships = memberships;
            tracing::debug!("transaction rolled back");
        }
        result
    }

    /// Write every snapshot file. All temporary files are written before
    /// any of them replaces its target.
    pub fn persist(&self) -> DmsResult<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let staged = [
            stage(&dir.join(COLLECTIONS_FILE), &self.tree)?,
            stage(&dir.join(MEMBERSHIPS_FILE), &self.memberships)?,
            stage(&dir.join(DOCUMENTS_FILE), &self.documents)?,
        ];
        for (tmp, path) in &staged {
            std::fs::rename(tmp, path)?;
        }
        Ok(())
    }

    /// Write only the document registry.
    pub fn persist_documents(&self) -> DmsResult<()> {
        if let Some(dir) = &self.dir {
            save(&dir.join(DOCUMENTS_FILE), &self.documents)?;
        }
        Ok(())
    }
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> DmsResult<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Write `value` next to `path`, returning the temporary and final paths.
fn stage<T: Serialize>(path: &Path, value: &T) -> DmsResult<(PathBuf, PathBuf)> {
    let data = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data)?;
    Ok((tmp, path.to_path_buf()))
}

fn save<T: Serialize>(path: &Path, value: &T) -> DmsResult<()> {
    let (tmp, path) = stage(path, value)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DmsError;
    use crate::types::{Collection, DocumentDescriptor, DocumentStatus, Visibility};
    use tempfile::tempdir;
    use uuid::Uuid;

    #[test]
    fn failed_transaction_restores_tree_and_memberships() {
        let mut store = DmsStore::in_memory();
        let root = store.tree_mut().make_root(Collection::new("root".into(), 1, true), 0);
        let doc = Uuid::new_v4();

        let result: DmsResult<()> = store.transaction(|s| {
            s.tree_mut()
                .add_child(root, Collection::new("child".into(), 1, true))?;
            s.memberships_mut().attach(root, &[doc]);
            Err(DmsError::invalid("boom"))
        });

        assert!(result.is_err());
        assert!(store.tree().children(Some(root)).is_empty());
        assert_eq!(store.memberships().count_documents(root), 0);
    }

    #[test]
    fn nested_failure_rolls_back_only_when_propagated() {
        let mut store = DmsStore::in_memory();
        let root = store.tree_mut().make_root(Collection::new("root".into(), 1, true), 0);

        store
            .transaction(|s| {
                s.tree_mut()
                    .add_child(root, Collection::new("kept".into(), 1, true))?;
                let inner: DmsResult<()> = s.transaction(|s| {
                    s.tree_mut()
                        .add_child(root, Collection::new("dropped".into(), 1, true))?;
                    Err(DmsError::invalid("inner"))
                });
                assert!(inner.is_err());
                Ok(())
            })
            .unwrap();

        let names: Vec<_> = store
            .tree()
            .children(Some(root))
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, vec!["kept"]);
    }

    #[test]
    fn document_status_survives_rollback() {
        let mut store = DmsStore::in_memory();
        let doc = DocumentDescriptor::new("Budget", 1, "DMS", Visibility::Private);
        let id = doc.id;
        store.documents_mut().insert(doc);

        let _ = store.transaction(|s| -> DmsResult<()> {
            s.documents_mut().set_status(id, DocumentStatus::Error)?;
            Err(DmsError::index(500, "down"))
        });

        assert_eq!(store.documents().status(id), Some(DocumentStatus::Error));
    }

    #[test]
    fn committed_state_is_reloaded_from_disk() {
        let dir = tempdir().unwrap();
        let doc = Uuid::new_v4();
        let root = {
            let mut store = DmsStore::open(dir.path()).unwrap();
            store
                .transaction(|s| {
                    let root = s
                        .tree_mut()
                        .make_root(Collection::new("root".into(), 1, true), 0);
                    s.memberships_mut().attach(root, &[doc, doc]);
                    Ok(root)
                })
                .unwrap()
        };

        let store = DmsStore::open(dir.path()).unwrap();
        assert_eq!(store.tree().get(root).unwrap().name, "root");
        assert_eq!(store.memberships().list_documents(root), vec![doc, doc]);
    }

    #[test]
    fn failed_persist_replaces_no_snapshot() {
        let dir = tempdir().unwrap();
        let mut store = DmsStore::open(dir.path()).unwrap();
        store
            .transaction(|s| {
                s.tree_mut()
                    .make_root(Collection::new("first".into(), 1, true), 0);
                Ok(())
            })
            .unwrap();

        // a directory in the way makes staging the membership file fail
        std::fs::create_dir(dir.path().join("memberships.json.tmp")).unwrap();
        let result = store.transaction(|s| {
            s.tree_mut()
                .make_root(Collection::new("second".into(), 1, true), 0);
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(store.tree().len(), 1);

        let reloaded = DmsStore::open(dir.path()).unwrap();
        let names: Vec<_> = reloaded.tree().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["first"]);
    }
}
