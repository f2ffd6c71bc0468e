use uuid::Uuid;

use super::require_live;
use crate::auth::{authorize, Operation, Subject, User};
use crate::error::DmsResult;
use crate::events::Event;
use crate::hub::{DmsHub, Effects};
use crate::storage::DmsStore;
use crate::types::Visibility;

fn require_documents(store: &DmsStore, documents: &[Uuid]) -> DmsResult<()> {
    for id in documents {
        store.documents().require(*id)?;
    }
    Ok(())
}

fn authorize_membership(store: &DmsStore, actor: &User, collection: Uuid) -> DmsResult<()> {
    let collection = require_live(store.tree(), collection)?;
    authorize(actor, Operation::ManageMembership, Subject::from(collection))
}

impl DmsHub {
    /// Attach documents to a collection. Attaching twice creates two rows.
    ///
    /// With `reindex`, every document is pushed with its own visibility and
    /// failures are reported after the rows are committed.
    pub fn add_documents_to_collection(
        &self,
        actor: &User,
        collection: Uuid,
        documents: &[Uuid],
        reindex: bool,
    ) -> DmsResult<()> {
        let mut store = self.store().write();
        authorize_membership(&store, actor, collection)?;
        require_documents(&store, documents)?;

        store.transaction(|s| {
            s.memberships_mut().attach(collection, documents);
            Ok(())
        })?;
        let mut effects = Effects::default();
        effects.emit(Event::MembershipChanged {
            id: collection,
            documents: documents.len(),
        });
        self.finish(&mut store, effects);
        if reindex {
            self.reindexer().reindex_documents(&mut store, documents)?;
        }
        Ok(())
    }

    /// Attach one document; the reindex pushes the private view of it.
    pub fn add_document_to_collection(
        &self,
        actor: &User,
        collection: Uuid,
        document: Uuid,
        reindex: bool,
    ) -> DmsResult<()> {
        self.add_documents_to_collection(actor, collection, &[document], false)?;
        if reindex {
            let mut store = self.store().write();
            self.reindexer()
                .reindex_document(&mut store, document, Some(Visibility::Private))?;
        }
        Ok(())
    }

    /// Detach documents from a collection, returning the number of rows removed.
    pub fn remove_documents_from_collection(
        &self,
        actor: &User,
        collection: Uuid,
        documents: &[Uuid],
        reindex: bool,
    ) -> DmsResult<usize> {
        let mut store = self.store().write();
        authorize_membership(&store, actor, collection)?;

        let removed = store.transaction(|s| Ok(s.memberships_mut().detach(collection, documents)))?;
        let mut effects = Effects::default();
        effects.emit(Event::MembershipChanged {
            id: collection,
            documents: removed,
        });
        self.finish(&mut store, effects);
        if reindex {
            let known: Vec<Uuid> = documents
                .iter()
                .copied()
                .filter(|d| store.documents().get(*d).is_some())
                .collect();
            self.reindexer().reindex_documents(&mut store, &known)?;
        }
        Ok(removed)
    }

    pub fn remove_document_from_collection(
        &self,
        actor: &User,
        collection: Uuid,
        document: Uuid,
        reindex: bool,
    ) -> DmsResult<bool> {
        let removed = self.remove_documents_from_collection(actor, collection, &[document], false)?;
        if reindex {
            let mut store = self.store().write();
            if store.documents().get(document).is_some() {
                self.reindexer()
                    .reindex_document(&mut store, document, Some(Visibility::Private))?;
            }
        }
        Ok(removed > 0)
    }

    /// Add to `destination` without reindexing, then remove from `origin`
    /// and reindex.
    pub fn move_documents_to_collection(
        &self,
        actor: &User,
        documents: &[Uuid],
        origin: Uuid,
        destination: Uuid,
    ) -> DmsResult<()> {
        {
            let store = self.store().read();
            authorize_membership(&store, actor, origin)?;
            authorize_membership(&store, actor, destination)?;
        }
        self.add_documents_to_collection(actor, destination, documents, false)?;
        self.remove_documents_from_collection(actor, origin, documents, true)?;
        Ok(())
    }

    /// Drop duplicated membership rows of a collection.
    pub fn clean_duplicate_memberships(&self, actor: &User, collection: Uuid) -> DmsResult<usize> {
        let mut store = self.store().write();
        authorize_membership(&store, actor, collection)?;
        let removed = store.transaction(|s| Ok(s.memberships_mut().deduplicate(collection)))?;
        if removed > 0 {
            tracing::info!(collection = %collection, removed, "duplicate memberships removed");
        }
        Ok(removed)
    }

    /// Push every document of a collection to the index again.
    pub fn reindex_collection(&self, actor: &User, collection: Uuid) -> DmsResult<usize> {
        let mut store = self.store().write();
        authorize_membership(&store, actor, collection)?;
        let documents = store.memberships().distinct_documents(collection);
        self.reindexer().reindex_documents(&mut store, &documents)?;
        Ok(documents.len())
    }
}
