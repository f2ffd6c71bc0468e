//! Document lifecycle against the index: first indexing, trash, restore and
//! permanent removal.

use uuid::Uuid;

use crate::auth::{authorize, Operation, Subject, User};
use crate::error::DmsResult;
use crate::hub::DmsHub;
use crate::types::{DocumentDescriptor, DocumentStatus};

impl DmsHub {
    /// Register a new document, optionally file it in a collection, and add
    /// it to the index.
    pub fn index_document(
        &self,
        actor: &User,
        mut descriptor: DocumentDescriptor,
        collection: Option<Uuid>,
    ) -> DmsResult<DocumentDescriptor> {
        authorize(actor, Operation::UploadDocument, Subject::none())?;
        let mut store = self.store().write();
        if let Some(cid) = collection {
            let target = store.tree().require(cid)?;
            authorize(actor, Operation::ManageMembership, Subject::from(target))?;
        }

        let id = descriptor.id;
        let mine = self.reindexer().is_mine(&descriptor);
        if mine {
            descriptor.status = DocumentStatus::Pending;
        }
        store.documents_mut().insert(descriptor.clone());
        store.persist_documents()?;
        if let Some(cid) = collection {
            store.transaction(|s| {
                s.memberships_mut().attach(cid, &[id]);
                Ok(())
            })?;
        }
        if !mine {
            tracing::debug!(document = %id, "foreign document registered without indexing");
            return Ok(descriptor);
        }

        let reindexer = self.reindexer();
        let payload = reindexer.describe(&store, &descriptor, None);
        let outcome = reindexer
            .index()
            .add_document(&payload, descriptor.index_content());
        let status = match &outcome {
            Ok(()) => DocumentStatus::Indexed,
            Err(err) => {
                tracing::error!(document = %id, error = %err, "document indexing failed");
                DocumentStatus::Error
            }
        };
        reindexer.set_status(&mut store, id, status)?;
        outcome?;
        tracing::info!(document = %id, "document indexed");
        Ok(store.documents().require(id)?.clone())
    }

    /// Take a document out of the index and move it to the trash.
    ///
    /// Documents of other institutions are left alone. An index that does
    /// not know the document counts as a successful removal.
    pub fn delete_document(&self, actor: &User, id: Uuid) -> DmsResult<bool> {
        let mut store = self.store().write();
        let doc = store.documents().require(id)?.clone();
        authorize(actor, Operation::TrashDocument, Subject::from(&doc))?;
        let reindexer = self.reindexer();
        if !reindexer.is_mine(&doc) || doc.is_trashed() {
            return Ok(true);
        }

        reindexer.set_status(&mut store, id, DocumentStatus::Removing)?;
        let payload = reindexer.describe(&store, &doc, None);
        match reindexer.index().remove_document(&payload) {
            Ok(()) => {}
            Err(err) if err.is_index_not_found() => {
                tracing::debug!(document = %id, "document already absent from index");
            }
            Err(err) => {
                tracing::error!(document = %id, error = %err, "document removal failed");
                reindexer.set_status(&mut store, id, DocumentStatus::Error)?;
                return Err(err);
            }
        }
        store.documents_mut().trash(id)?;
        reindexer.set_status(&mut store, id, DocumentStatus::NotIndexed)?;
        tracing::info!(document = %id, "document trashed");
        Ok(true)
    }

    pub fn restore_document(&self, actor: &User, id: Uuid) -> DmsResult<DocumentDescriptor> {
        let mut store = self.store().write();
        let doc = store.documents().require(id)?.clone();
        authorize(actor, Operation::TrashDocument, Subject::from(&doc))?;
        if !doc.is_trashed() {
            return Ok(doc);
        }

        store.documents_mut().restore(id)?;
        let reindexer = self.reindexer();
        match reindexer.reindex_document(&mut store, id, None) {
            Ok(()) => {}
            Err(err) if err.is_index_not_found() => {
                tracing::warn!(document = %id, "index does not know the restored document");
                reindexer.set_status(&mut store, id, DocumentStatus::NotIndexed)?;
            }
            Err(err) => {
                store.documents_mut().trash(id)?;
                store.persist_documents()?;
                return Err(err);
            }
        }
        tracing::info!(document = %id, "document restored");
        Ok(store.documents().require(id)?.clone())
    }

    /// Remove a document and all of its membership rows for good.
    pub fn permanently_delete_document(&self, actor: &User, id: Uuid) -> DmsResult<()> {
        let doc = self.document(id)?;
        authorize(actor, Operation::PurgeDocument, Subject::from(&doc))?;
        if !doc.is_trashed() {
            self.delete_document(actor, id)?;
        }

        let mut store = self.store().write();
        store.transaction(|s| {
            s.memberships_mut().forget_document(id);
            Ok(())
        })?;
        store.documents_mut().remove(id);
        store.persist_documents()?;
        tracing::info!(document = %id, "document purged");
        Ok(())
    }

    /// Trashed documents owned by the actor.
    pub fn trashed_documents(&self, actor: &User) -> Vec<DocumentDescriptor> {
        self.store()
            .read()
            .documents()
            .iter()
            .filter(|d| d.is_trashed() && d.owner == actor.id)
            .cloned()
            .collect()
    }
}
