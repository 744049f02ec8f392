//! Reference `Catalog`/`PendingStore` implementations backed by in-process
//! `HashMap`s, grounded on the `RwLock<HashMap<..>>` storage idiom in the
//! teacher's `popgetter::search` result cache.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{Catalog, PendingStore, SearchHit};
use crate::error::{CoreError, CoreResult};
use crate::model::{DatasetId, PendingRecord, Profile};
use crate::query::CompiledQuery;

#[derive(Default)]
pub struct InMemoryCatalog {
    documents: RwLock<HashMap<DatasetId, Profile>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Catalog for InMemoryCatalog {
    fn put(&self, profile: Profile) -> CoreResult<()> {
        let mut documents = self.documents.write().expect("catalog lock poisoned");
        documents.insert(profile.id.clone(), profile);
        Ok(())
    }

    fn get(&self, id: &str) -> CoreResult<Profile> {
        let documents = self.documents.read().expect("catalog lock poisoned");
        documents
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> CoreResult<()> {
        let mut documents = self.documents.write().expect("catalog lock poisoned");
        documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    fn scan(&self, source_identifier: &str) -> CoreResult<Vec<Profile>> {
        let documents = self.documents.read().expect("catalog lock poisoned");
        Ok(documents
            .values()
            .filter(|p| p.source_identifier() == Some(source_identifier))
            .cloned()
            .collect())
    }

    fn search(&self, query: &CompiledQuery) -> CoreResult<Vec<SearchHit>> {
        let documents = self.documents.read().expect("catalog lock poisoned");
        let mut hits: Vec<SearchHit> = documents
            .values()
            .filter(|p| query.filter.matches(p))
            .map(|p| SearchHit {
                id: p.id.clone(),
                score: query.score(p),
                source: p.source_identifier().unwrap_or_default().to_string(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        Ok(hits)
    }

    fn all(&self) -> CoreResult<Vec<Profile>> {
        let documents = self.documents.read().expect("catalog lock poisoned");
        Ok(documents.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryPendingStore {
    records: RwLock<HashMap<String, PendingRecord>>,
}

impl InMemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingStore for InMemoryPendingStore {
    fn get(&self, identifier: &str) -> Option<PendingRecord> {
        let records = self.records.read().expect("pending store lock poisoned");
        records.get(identifier).cloned()
    }

    fn put(&self, identifier: &str, record: PendingRecord) {
        let mut records = self.records.write().expect("pending store lock poisoned");
        records.insert(identifier.to_string(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnProfile;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn profile(id: &str, source: &str) -> Profile {
        let mut materialize = BTreeMap::new();
        materialize.insert("identifier".to_string(), source.to_string());
        Profile {
            id: id.to_string(),
            name: format!("dataset {id}"),
            description: None,
            nb_rows: 1,
            size_bytes: 1,
            columns: vec![ColumnProfile::new("a")],
            spatial_coverage: vec![],
            materialize,
            indexed_at: Utc::now(),
            lazo: vec![],
        }
    }

    #[test]
    fn put_then_get_roundtrips() {
        let catalog = InMemoryCatalog::new();
        catalog.put(profile("s.1", "s")).unwrap();
        let got = catalog.get("s.1").unwrap();
        assert_eq!(got.id, "s.1");
    }

    #[test]
    fn get_missing_is_not_found() {
        let catalog = InMemoryCatalog::new();
        assert!(matches!(catalog.get("nope"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn scan_filters_by_source_identifier() {
        let catalog = InMemoryCatalog::new();
        catalog.put(profile("a.1", "a")).unwrap();
        catalog.put(profile("b.1", "b")).unwrap();
        let scanned = catalog.scan("a").unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].id, "a.1");
    }

    #[test]
    fn delete_removes_document() {
        let catalog = InMemoryCatalog::new();
        catalog.put(profile("s.1", "s")).unwrap();
        catalog.delete("s.1").unwrap();
        assert!(catalog.get("s.1").is_err());
    }

    #[test]
    fn pending_store_roundtrips() {
        let store = InMemoryPendingStore::new();
        assert!(store.get("s").is_none());
        store.put(
            "s",
            PendingRecord {
                sha1: "abc".to_string(),
            },
        );
        assert_eq!(store.get("s").unwrap().sha1, "abc");
    }
}
