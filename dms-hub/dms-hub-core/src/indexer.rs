use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{DmsError, DmsResult, ReindexFailure};
use crate::storage::DmsStore;
use crate::types::{DocumentDescriptor, DocumentStatus, UserId, Visibility};

/// What the index receives for one document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub id: Uuid,
    pub title: String,
    pub owner: UserId,
    pub institution: String,
    pub visibility: Visibility,
    /// Facet tags of the live collections holding the document.
    pub collections: Vec<String>,
}

/// Remote search and indexing service.
///
/// Errors are reported as [`DmsError::IndexService`] carrying the upstream
/// status; a 404 from `remove_document` means the document is already gone.
pub trait IndexService: Send + Sync {
    fn add_document(&self, descriptor: &IndexDescriptor, content: &str) -> DmsResult<()>;
    fn update_document(&self, descriptor: &IndexDescriptor, content: &str) -> DmsResult<()>;
    fn remove_document(&self, descriptor: &IndexDescriptor) -> DmsResult<()>;
}

/// Pushes documents to the index and tracks their status.
#[derive(Clone)]
pub struct ReindexCoordinator {
    index: Arc<dyn IndexService>,
    institution: String,
}

impl ReindexCoordinator {
    pub fn new(index: Arc<dyn IndexService>, institution: impl Into<String>) -> Self {
        Self {
            index,
            institution: institution.into(),
        }
    }

    pub fn institution(&self) -> &str {
        &self.institution
    }

    pub fn index(&self) -> &Arc<dyn IndexService> {
        &self.index
    }

    /// Documents of other institutions are never pushed from here.
    pub fn is_mine(&self, doc: &DocumentDescriptor) -> bool {
        doc.institution == self.institution
    }

    pub fn describe(
        &self,
        store: &DmsStore,
        doc: &DocumentDescriptor,
        visibility: Option<Visibility>,
    ) -> IndexDescriptor {
        let mut seen = HashSet::new();
        let collections = store
            .memberships()
            .collections_of(doc.id)
            .into_iter()
            .filter(|cid| seen.insert(*cid))
            .filter_map(|cid| store.tree().get(cid))
            .filter(|c| !c.is_trashed())
            .map(|c| c.tag())
            .collect();
        IndexDescriptor {
            id: doc.id,
            title: doc.title.clone(),
            owner: doc.owner,
            institution: doc.institution.clone(),
            visibility: visibility.unwrap_or(doc.visibility),
            collections,
        }
    }

    pub(crate) fn set_status(
        &self,
        store: &mut DmsStore,
        id: Uuid,
        status: DocumentStatus,
    ) -> DmsResult<()> {
        store.documents_mut().set_status(id, status)?;
        store.persist_documents()
    }

    /// Push the current state of one document to the index.
    ///
    /// `visibility` overrides the document's own visibility in the payload.
    pub fn reindex_document(
        &self,
        store: &mut DmsStore,
        id: Uuid,
        visibility: Option<Visibility>,
    ) -> DmsResult<()> {
        let doc = store.documents().require(id)?.clone();
        if !self.is_mine(&doc) {
            tracing::debug!(document = %id, institution = %doc.institution, "skipping foreign document");
            return Ok(());
        }
        if doc.is_trashed() {
            tracing::debug!(document = %id, "skipping trashed document");
            return Ok(());
        }
        self.set_status(store, id, DocumentStatus::Pending)?;
        let descriptor = self.describe(store, &doc, visibility);
        tracing::debug!(document = %id, collections = descriptor.collections.len(), "updating document in index");
        match self.index.update_document(&descriptor, doc.index_content()) {
            Ok(()) => self.set_status(store, id, DocumentStatus::Indexed),
            Err(err) => {
                tracing::error!(document = %id, error = %err, "document reindex failed");
                self.set_status(store, id, DocumentStatus::Error)?;
                Err(err)
            }
        }
    }

    /// Reindex every document, collecting failures into one error.
    pub fn reindex_documents(&self, store: &mut DmsStore, ids: &[Uuid]) -> DmsResult<()> {
        let mut seen = HashSet::new();
        let mut failures = Vec::new();
        for id in ids.iter().filter(|id| seen.insert(**id)) {
            if let Err(err) = self.reindex_document(store, *id, None) {
                failures.push(ReindexFailure::new(*id, &err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DmsError::ReindexFailed { failures })
        }
    }
}
