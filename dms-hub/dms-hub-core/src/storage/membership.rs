use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Collection to document rows. Attaching never deduplicates.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MembershipStore {
    rows: BTreeMap<Uuid, Vec<Uuid>>,
}

impl MembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, collection: Uuid, documents: &[Uuid]) {
        if documents.is_empty() {
            return;
        }
        self.rows
            .entry(collection)
            .or_default()
            .extend_from_slice(documents);
    }

    /// Remove every row of `collection` pointing at one of `documents`.
    pub fn detach(&mut self, collection: Uuid, documents: &[Uuid]) -> usize {
        let Some(rows) = self.rows.get_mut(&collection) else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|d| !documents.contains(d));
        let removed = before - rows.len();
        if rows.is_empty() {
            self.rows.remove(&collection);
        }
        removed
    }

    /// Documents of `collection` in insertion order, duplicates included.
    pub fn list_documents(&self, collection: Uuid) -> Vec<Uuid> {
        self.rows.get(&collection).cloned().unwrap_or_default()
    }

    /// Distinct documents of `collection`, first occurrence order.
    pub fn distinct_documents(&self, collection: Uuid) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        self.list_documents(collection)
            .into_iter()
            .filter(|d| seen.insert(*d))
            .collect()
    }

    pub fn count_documents(&self, collection: Uuid) -> usize {
        self.rows.get(&collection).map_or(0, |rows| rows.len())
    }

    pub fn collections_of(&self, document: Uuid) -> Vec<Uuid> {
        self.rows
            .iter()
            .filter(|(_, docs)| docs.contains(&document))
            .map(|(cid, _)| *cid)
            .collect()
    }

    /// Drop every row of `collection`, returning the detached documents.
    pub fn detach_all(&mut self, collection: Uuid) -> Vec<Uuid> {
        self.rows.remove(&collection).unwrap_or_default()
    }

    /// Drop every row pointing at `document`, returning the collections touched.
    pub fn forget_document(&mut self, document: Uuid) -> Vec<Uuid> {
        let touched = self.collections_of(document);
        for cid in &touched {
            self.detach(*cid, &[document]);
        }
        touched
    }

    /// Keep the first row for each document of `collection`.
    pub fn deduplicate(&mut self, collection: Uuid) -> usize {
        let Some(rows) = self.rows.get_mut(&collection) else {
            return 0;
        };
        let before = rows.len();
        let mut seen = HashSet::new();
        rows.retain(|d| seen.insert(*d));
        before - rows.len()
    }

    pub fn collections(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.rows.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_keeps_duplicates() {
        let mut store = MembershipStore::new();
        let c = Uuid::new_v4();
        let d = Uuid::new_v4();
        store.attach(c, &[d]);
        store.attach(c, &[d]);
        assert_eq!(store.count_documents(c), 2);
        assert_eq!(store.list_documents(c), vec![d, d]);
        assert_eq!(store.distinct_documents(c), vec![d]);
    }

    #[test]
    fn detach_removes_every_matching_row() {
        let mut store = MembershipStore::new();
        let c = Uuid::new_v4();
        let (d1, d2) = (Uuid::new_v4(), Uuid::new_v4());
        store.attach(c, &[d1, d2, d1]);
        assert_eq!(store.detach(c, &[d1]), 2);
        assert_eq!(store.list_documents(c), vec![d2]);
        assert_eq!(store.detach(Uuid::new_v4(), &[d2]), 0);
    }

    #[test]
    fn deduplicate_keeps_first_occurrence() {
        let mut store = MembershipStore::new();
        let c = Uuid::new_v4();
        let (d1, d2) = (Uuid::new_v4(), Uuid::new_v4());
        store.attach(c, &[d1, d2, d1, d2, d1]);
        assert_eq!(store.deduplicate(c), 3);
        assert_eq!(store.list_documents(c), vec![d1, d2]);
        assert_eq!(store.deduplicate(c), 0);
    }

    #[test]
    fn forget_document_touches_every_collection() {
        let mut store = MembershipStore::new();
        let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
        let (d1, d2) = (Uuid::new_v4(), Uuid::new_v4());
        store.attach(c1, &[d1, d2]);
        store.attach(c2, &[d1]);
        let mut touched = store.forget_document(d1);
        touched.sort();
        let mut expected = vec![c1, c2];
        expected.sort();
        assert_eq!(touched, expected);
        assert_eq!(store.list_documents(c1), vec![d2]);
        assert_eq!(store.count_documents(c2), 0);
        assert!(store.collections_of(d1).is_empty());
    }
}
