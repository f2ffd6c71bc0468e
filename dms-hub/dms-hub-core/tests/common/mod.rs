#![allow(dead_code)]

use dms_hub_core::auth::{Role, User};
use dms_hub_core::cache::{CacheKey, CollectionCache, MemoryCache};
use dms_hub_core::indexer::{IndexDescriptor, IndexService};
use dms_hub_core::storage::DmsStore;
use dms_hub_core::types::{Collection, DocumentDescriptor, UserId, Visibility};
use dms_hub_core::{DmsError, DmsHub, DmsResult, NewCollection};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

pub const INSTITUTION: &str = "DMS";

// Mock implementations for testing

#[derive(Default)]
pub struct MockIndex {
    adds: Mutex<Vec<IndexDescriptor>>,
    updates: Mutex<Vec<IndexDescriptor>>,
    removals: Mutex<Vec<Uuid>>,
    indexed: Mutex<HashSet<Uuid>>,
    failing: Mutex<HashMap<Uuid, u16>>,
    fail_all: Mutex<Option<u16>>,
}

impl MockIndex {
    pub fn fail(&self, document: Uuid, status: u16) {
        self.failing.lock().insert(document, status);
    }

    pub fn fail_everything(&self, status: u16) {
        *self.fail_all.lock() = Some(status);
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
        *self.fail_all.lock() = None;
    }

    /// Forget a document without going through `remove_document`.
    pub fn drop_silently(&self, document: Uuid) {
        self.indexed.lock().remove(&document);
    }

    fn check(&self, document: Uuid) -> DmsResult<()> {
        if let Some(status) = *self.fail_all.lock() {
            return Err(DmsError::index(status, "index unavailable"));
        }
        if let Some(status) = self.failing.lock().get(&document) {
            return Err(DmsError::index(*status, "rejected"));
        }
        Ok(())
    }

    pub fn updates(&self) -> Vec<IndexDescriptor> {
        self.updates.lock().clone()
    }

    pub fn update_count(&self, document: Uuid) -> usize {
        self.updates.lock().iter().filter(|d| d.id == document).count()
    }

    pub fn last_update(&self, document: Uuid) -> Option<IndexDescriptor> {
        self.updates
            .lock()
            .iter()
            .rev()
            .find(|d| d.id == document)
            .cloned()
    }

    pub fn adds(&self) -> Vec<IndexDescriptor> {
        self.adds.lock().clone()
    }

    pub fn removals(&self) -> Vec<Uuid> {
        self.removals.lock().clone()
    }

    pub fn is_indexed(&self, document: Uuid) -> bool {
        self.indexed.lock().contains(&document)
    }

    pub fn clear_log(&self) {
        self.adds.lock().clear();
        self.updates.lock().clear();
        self.removals.lock().clear();
    }
}

impl IndexService for MockIndex {
    fn add_document(&self, descriptor: &IndexDescriptor, _content: &str) -> DmsResult<()> {
        self.check(descriptor.id)?;
        self.adds.lock().push(descriptor.clone());
        self.indexed.lock().insert(descriptor.id);
        Ok(())
    }

    fn update_document(&self, descriptor: &IndexDescriptor, _content: &str) -> DmsResult<()> {
        self.check(descriptor.id)?;
        self.updates.lock().push(descriptor.clone());
        self.indexed.lock().insert(descriptor.id);
        Ok(())
    }

    fn remove_document(&self, descriptor: &IndexDescriptor) -> DmsResult<()> {
        self.check(descriptor.id)?;
        if !self.indexed.lock().remove(&descriptor.id) {
            return Err(DmsError::index(404, "not found"));
        }
        self.removals.lock().push(descriptor.id);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingCache {
    inner: MemoryCache,
    forgotten: Mutex<Vec<CacheKey>>,
}

impl RecordingCache {
    pub fn forgotten(&self) -> Vec<CacheKey> {
        self.forgotten.lock().clone()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.contains(key)
    }

    pub fn reset(&self) {
        self.forgotten.lock().clear();
    }
}

impl CollectionCache for RecordingCache {
    fn get(&self, key: &CacheKey) -> DmsResult<Option<Vec<Collection>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &CacheKey, value: &[Collection]) -> DmsResult<()> {
        self.inner.put(key, value)
    }

    fn forget(&self, key: &CacheKey) -> DmsResult<()> {
        self.forgotten.lock().push(key.clone());
        self.inner.forget(key)
    }
}

pub struct Fixture {
    pub hub: DmsHub,
    pub index: Arc<MockIndex>,
    pub cache: Arc<RecordingCache>,
}

pub fn fixture() -> Fixture {
    fixture_with_store(DmsStore::in_memory())
}

pub fn fixture_with_store(store: DmsStore) -> Fixture {
    let index = Arc::new(MockIndex::default());
    let cache = Arc::new(RecordingCache::default());
    let hub = DmsHub::new(store, index.clone(), cache.clone(), INSTITUTION);
    Fixture { hub, index, cache }
}

pub fn admin(id: UserId) -> User {
    User::with_role(id, Role::Admin)
}

pub fn partner(id: UserId) -> User {
    User::with_role(id, Role::Partner)
}

impl Fixture {
    pub fn private(&self, actor: &User, name: &str, parent: Option<Uuid>) -> Collection {
        let mut request = NewCollection::private(name);
        request.parent = parent;
        self.hub.create_collection(actor, request).unwrap()
    }

    pub fn public(&self, actor: &User, name: &str, parent: Option<Uuid>) -> Collection {
        let mut request = NewCollection::public(name);
        request.parent = parent;
        self.hub.create_collection(actor, request).unwrap()
    }

    /// Register and index a document of the local institution.
    pub fn document(&self, actor: &User, title: &str) -> Uuid {
        let descriptor = DocumentDescriptor::new(title, actor.id, INSTITUTION, Visibility::Private);
        self.hub.index_document(actor, descriptor, None).unwrap().id
    }

    pub fn child_names(&self, parent: Option<Uuid>) -> Vec<String> {
        self.hub
            .children(parent)
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    pub fn sorted_documents(&self, collection: Uuid) -> Vec<Uuid> {
        let mut docs = self.hub.documents_in(collection);
        docs.sort();
        docs
    }
}
