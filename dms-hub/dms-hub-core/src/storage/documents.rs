use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{DmsError, DmsResult};
use crate::types::{DocumentDescriptor, DocumentStatus};

/// Descriptors of every document known to the DMS.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DocumentRegistry {
    docs: BTreeMap<Uuid, DocumentDescriptor>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: DocumentDescriptor) {
        self.docs.insert(descriptor.id, descriptor);
    }

    pub fn get(&self, id: Uuid) -> Option<&DocumentDescriptor> {
        self.docs.get(&id)
    }

    pub fn require(&self, id: Uuid) -> DmsResult<&DocumentDescriptor> {
        self.docs
            .get(&id)
            .ok_or_else(|| DmsError::NotFound(format!("document {id}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentDescriptor> {
        self.docs.values()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn set_status(&mut self, id: Uuid, status: DocumentStatus) -> DmsResult<()> {
        let doc = self
            .docs
            .get_mut(&id)
            .ok_or_else(|| DmsError::NotFound(format!("document {id}")))?;
        doc.status = status;
        Ok(())
    }

    pub fn status(&self, id: Uuid) -> Option<DocumentStatus> {
        self.docs.get(&id).map(|d| d.status)
    }

    pub fn trash(&mut self, id: Uuid) -> DmsResult<()> {
        let doc = self
            .docs
            .get_mut(&id)
            .ok_or_else(|| DmsError::NotFound(format!("document {id}")))?;
        doc.deleted_at = Some(Utc::now());
        Ok(())
    }

    pub fn restore(&mut self, id: Uuid) -> DmsResult<()> {
        let doc = self
            .docs
            .get_mut(&id)
            .ok_or_else(|| DmsError::NotFound(format!("document {id}")))?;
        doc.deleted_at = None;
        Ok(())
    }

    pub fn remove(&mut self, id: Uuid) -> Option<DocumentDescriptor> {
        self.docs.remove(&id)
    }
}
