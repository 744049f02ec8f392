//! The `Source` abstraction (§4.8): one instance per upstream catalog,
//! dispatched over its two shapes with `enum_dispatch`, mirroring the
//! `RunCommand`/`Commands` pattern in the teacher's `popgetter_cli::cli`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use corpora_core::catalog::{Catalog, PendingStore};
use enum_dispatch::enum_dispatch;
use tempfile::TempDir;

use crate::bulk::BulkDumpSource;
use crate::dispatcher::DispatchHandle;
use crate::error::DiscoveryResult;
use crate::incremental::IncrementalSource;

/// One of the Work Dispatcher's three priority levels (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Everything the dispatcher needs to materialize and profile one dataset.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub dataset_id: String,
    pub name: String,
    pub description: Option<String>,
    pub materialize: std::collections::BTreeMap<String, String>,
    pub csv_path: PathBuf,
    pub priority: Priority,
    /// Keeps a bulk-dump extraction directory alive until every `WorkItem`
    /// from that pass has been profiled (§5 "Temp directories... released
    /// on all exits"); `None` for incremental sources, which fetch directly.
    pub extraction_dir: Option<Arc<TempDir>>,
}

#[enum_dispatch]
pub trait Source {
    fn identifier(&self) -> &str;
    fn check_interval(&self) -> Duration;

    /// Run one discovery pass: enqueue work for anything new or changed,
    /// reconcile the Catalog against what was seen. Per §4.8, exceptions for
    /// a single dataset are logged and swallowed by the implementation;
    /// only pass-level failures propagate to the caller.
    async fn discover(
        &self,
        catalog: &dyn Catalog,
        pending: &dyn PendingStore,
        dispatch: &DispatchHandle,
    ) -> DiscoveryResult<()>;
}

#[enum_dispatch(Source)]
pub enum AnySource {
    Bulk(BulkDumpSource),
    Incremental(IncrementalSource),
}
