//! Catalog (C4, §4.4): the persistent document store of `Profile`s.
//!
//! The Catalog is modeled as an external collaborator behind a narrow trait
//! (§9 Design Notes); this crate ships one reference implementation,
//! [`memory::InMemoryCatalog`], suitable for tests and for small
//! deployments that don't need a real document store.

pub mod memory;

use crate::error::CoreResult;
use crate::model::{DatasetId, PendingRecord, Profile};
use crate::query::CompiledQuery;

/// One search hit: the document id, a relevance score, and the source
/// identifier it was discovered under.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: DatasetId,
    pub score: f64,
    pub source: String,
}

pub trait Catalog: Send + Sync {
    /// Upsert by id, fully replacing the document.
    fn put(&self, profile: Profile) -> CoreResult<()>;
    fn get(&self, id: &str) -> CoreResult<Profile>;
    fn delete(&self, id: &str) -> CoreResult<()>;
    /// All documents whose `materialize.identifier` equals `source_identifier`.
    fn scan(&self, source_identifier: &str) -> CoreResult<Vec<Profile>>;
    fn search(&self, query: &CompiledQuery) -> CoreResult<Vec<SearchHit>>;
    /// All documents currently indexed, for the Augment Matcher to scan.
    fn all(&self) -> CoreResult<Vec<Profile>>;
}

/// The per-source SHA-1 change-detection record (§3, §4.8).
pub trait PendingStore: Send + Sync {
    fn get(&self, identifier: &str) -> Option<PendingRecord>;
    fn put(&self, identifier: &str, record: PendingRecord);
}
