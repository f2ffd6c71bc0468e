//! The collection manager shared by every caller.
//!
//! Mutating operations take the store's write lock for their whole duration
//! and run their writes in one transaction. Work that must only happen once
//! the transaction committed (best-effort reindex, cache invalidation, event
//! emission) is collected in [`Effects`] and applied by [`DmsHub::finish`].

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::auth::{Capability, User};
use crate::cache::{CacheKey, CollectionCache, MemoryCache, RedisCache};
use crate::config::DmsConfig;
use crate::error::DmsResult;
use crate::events::{Event, EventBus};
use crate::indexer::{IndexService, ReindexCoordinator};
use crate::search::SearchIndex;
use crate::storage::DmsStore;
use crate::types::{Collection, CollectionNode, DocumentDescriptor};

#[derive(Default)]
pub(crate) struct Effects {
    reindex: Vec<Uuid>,
    cache_keys: Vec<CacheKey>,
    events: Vec<Event>,
}

impl Effects {
    pub(crate) fn reindex(&mut self, documents: impl IntoIterator<Item = Uuid>) {
        self.reindex.extend(documents);
    }

    pub(crate) fn forget(&mut self, key: CacheKey) {
        if !self.cache_keys.contains(&key) {
            self.cache_keys.push(key);
        }
    }

    /// Forget the listing a collection of this visibility appears in.
    pub(crate) fn forget_listing_of(&mut self, collection: &Collection) {
        if collection.is_private {
            self.forget(CacheKey::PersonalCollections(collection.owner));
        } else {
            self.forget(CacheKey::InstitutionCollections);
        }
    }

    pub(crate) fn forget_both(&mut self, user: &User) {
        self.forget(CacheKey::PersonalCollections(user.id));
        self.forget(CacheKey::InstitutionCollections);
    }

    pub(crate) fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

pub struct DmsHub {
    store: Arc<RwLock<DmsStore>>,
    cache: Arc<dyn CollectionCache>,
    events: EventBus,
    reindexer: ReindexCoordinator,
}

impl DmsHub {
    pub fn new(
        store: DmsStore,
        index: Arc<dyn IndexService>,
        cache: Arc<dyn CollectionCache>,
        institution: impl Into<String>,
    ) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            cache,
            events: EventBus::new(),
            reindexer: ReindexCoordinator::new(index, institution),
        }
    }

    /// Open the file-backed store, the on-disk index and the configured cache.
    pub fn open(config: &DmsConfig) -> DmsResult<Self> {
        let store = DmsStore::open(&config.data_dir)?;
        let index: Arc<dyn IndexService> = Arc::new(SearchIndex::new(&config.index_dir)?);
        let cache: Arc<dyn CollectionCache> = match &config.redis_url {
            Some(url) => {
                tracing::info!(url = %url, "using redis collection cache");
                Arc::new(RedisCache::new(url)?)
            }
            None => Arc::new(MemoryCache::new()),
        };
        Ok(Self::new(store, index, cache, config.institution.clone()))
    }

    pub(crate) fn store(&self) -> &RwLock<DmsStore> {
        &self.store
    }

    pub(crate) fn reindexer(&self) -> &ReindexCoordinator {
        &self.reindexer
    }

    pub fn institution(&self) -> &str {
        self.reindexer.institution()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Apply the post-commit work collected by an operation.
    pub(crate) fn finish(&self, store: &mut DmsStore, effects: Effects) {
        if !effects.reindex.is_empty() {
            if let Err(err) = self.reindexer.reindex_documents(store, &effects.reindex) {
                tracing::warn!(error = %err, "reindex after commit incomplete");
            }
        }
        for key in &effects.cache_keys {
            if let Err(err) = self.cache.forget(key) {
                tracing::warn!(key = %key, error = %err, "cache invalidation failed");
            }
        }
        for event in effects.events {
            self.events.send(event);
        }
    }

    fn cached(&self, key: CacheKey, compute: impl FnOnce() -> Vec<Collection>) -> Vec<Collection> {
        match self.cache.get(&key) {
            Ok(Some(hit)) => return hit,
            Ok(None) => {}
            Err(err) => tracing::warn!(key = %key, error = %err, "cache read failed"),
        }
        let fresh = compute();
        if let Err(err) = self.cache.put(&key, &fresh) {
            tracing::warn!(key = %key, error = %err, "cache write failed");
        }
        fresh
    }

    pub fn collection(&self, id: Uuid) -> DmsResult<Collection> {
        Ok(self.store.read().tree().require(id)?.clone())
    }

    pub fn document(&self, id: Uuid) -> DmsResult<DocumentDescriptor> {
        Ok(self.store.read().documents().require(id)?.clone())
    }

    /// Membership rows of a collection, duplicates included.
    pub fn documents_in(&self, collection: Uuid) -> Vec<Uuid> {
        self.store.read().memberships().list_documents(collection)
    }

    /// Live children of a collection, or the live roots for `None`.
    pub fn children(&self, parent: Option<Uuid>) -> Vec<Collection> {
        self.store
            .read()
            .tree()
            .children(parent)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The actor's live private root collections.
    pub fn personal_collections(&self, actor: &User) -> Vec<Collection> {
        self.cached(CacheKey::PersonalCollections(actor.id), || {
            self.store
                .read()
                .tree()
                .roots()
                .into_iter()
                .filter(|c| c.is_private && c.owned_by(actor.id))
                .cloned()
                .collect()
        })
    }

    /// Live public root collections.
    pub fn institution_collections(&self) -> Vec<Collection> {
        self.cached(CacheKey::InstitutionCollections, || {
            self.store
                .read()
                .tree()
                .roots()
                .into_iter()
                .filter(|c| !c.is_private)
                .cloned()
                .collect()
        })
    }

    /// Nested view of the actor's personal collections.
    pub fn collection_tree(&self, actor: &User) -> Vec<CollectionNode> {
        let roots = self.personal_collections(actor);
        let store = self.store.read();
        roots
            .into_iter()
            .filter(|c| store.tree().get(c.id).is_some())
            .map(|root| build_node(&store, root))
            .collect()
    }

    pub fn is_collection_accessible(&self, actor: &User, collection: Uuid) -> bool {
        self.store
            .read()
            .tree()
            .get(collection)
            .map_or(false, |c| accessible(actor, c))
    }

    /// Live collections holding `document` that the actor can see.
    pub fn document_collections(&self, document: Uuid, actor: &User) -> Vec<Collection> {
        let store = self.store.read();
        let mut seen = HashSet::new();
        store
            .memberships()
            .collections_of(document)
            .into_iter()
            .filter(|cid| seen.insert(*cid))
            .filter_map(|cid| store.tree().get(cid))
            .filter(|c| !c.is_trashed() && accessible(actor, c))
            .cloned()
            .collect()
    }

    /// Trashed collections the actor may restore or purge, newest first.
    pub fn user_trash(&self, actor: &User) -> Vec<Collection> {
        let own = actor.can(Capability::ManageOwnCollections);
        let institution = actor.can(Capability::ManageInstitutionCollections);
        let store = self.store.read();
        let mut trashed: Vec<Collection> = store
            .tree()
            .iter()
            .filter(|c| c.is_trashed())
            .filter(|c| {
                (own && c.is_private && c.owned_by(actor.id)) || (institution && !c.is_private)
            })
            .cloned()
            .collect();
        trashed.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        trashed
    }

    /// Collections holding duplicated membership rows, with the surplus count.
    pub fn duplicate_memberships(&self) -> Vec<(Uuid, usize)> {
        let store = self.store.read();
        let memberships = store.memberships();
        memberships
            .collections()
            .filter_map(|cid| {
                let surplus =
                    memberships.count_documents(cid) - memberships.distinct_documents(cid).len();
                (surplus > 0).then_some((cid, surplus))
            })
            .collect()
    }
}

pub(crate) fn accessible(actor: &User, collection: &Collection) -> bool {
    collection.owned_by(actor.id) || !collection.is_private
}

fn build_node(store: &DmsStore, collection: Collection) -> CollectionNode {
    let children = store
        .tree()
        .children(Some(collection.id))
        .into_iter()
        .cloned()
        .map(|child| build_node(store, child))
        .collect();
    CollectionNode {
        collection,
        children,
    }
}
