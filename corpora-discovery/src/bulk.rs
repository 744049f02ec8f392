//! Bulk-dump `Source` (§4.8 "Bulk-dump source"), grounded directly on
//! `discovery/isi/isi_discovery.py`'s `get_datasets`: stream a tarball while
//! hashing it, skip if unchanged, extract, fetch a metadata listing, submit
//! each dataset, then delete anything no longer present.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use corpora_core::catalog::{Catalog, PendingStore};
use corpora_core::model::{dataset_id, PendingRecord};
use futures::StreamExt;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tempfile::{NamedTempFile, TempDir};

use crate::dispatcher::DispatchHandle;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::source::{Priority, Source, WorkItem};

#[derive(Debug, Clone, Deserialize)]
struct BulkDatasetMeta {
    source_local_id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    /// Path to this dataset's CSV, relative to the extracted dump root.
    csv_path: String,
}

pub struct BulkDumpSource {
    pub identifier: String,
    pub dump_url: String,
    pub metadata_url: String,
    pub check_interval: Duration,
    pub client: reqwest::Client,
}

impl BulkDumpSource {
    pub fn new(identifier: impl Into<String>, dump_url: impl Into<String>, metadata_url: impl Into<String>) -> Self {
        BulkDumpSource {
            identifier: identifier.into(),
            dump_url: dump_url.into(),
            metadata_url: metadata_url.into(),
            check_interval: Duration::from_secs(24 * 60 * 60),
            client: reqwest::Client::new(),
        }
    }

    async fn download_and_hash(&self) -> DiscoveryResult<(NamedTempFile, String)> {
        let response = self.client.get(&self.dump_url).send().await?;
        let mut tarball = NamedTempFile::new().map_err(DiscoveryError::Io)?;
        let mut hasher = Sha1::new();

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            tarball
                .write_all(&chunk)
                .map_err(DiscoveryError::Io)?;
        }
        tarball.flush().map_err(DiscoveryError::Io)?;

        let digest = hex_encode(&hasher.finalize());
        Ok((tarball, digest))
    }

    fn extract(&self, tarball: &NamedTempFile) -> DiscoveryResult<TempDir> {
        let dir = TempDir::new().map_err(DiscoveryError::Io)?;
        let file = std::fs::File::open(tarball.path()).map_err(DiscoveryError::Io)?;
        let gz = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(gz);
        archive
            .unpack(dir.path())
            .map_err(|e| DiscoveryError::Extraction {
                source: self.identifier.clone(),
                reason: e.to_string(),
            })?;
        Ok(dir)
    }

    async fn fetch_metadata(&self) -> DiscoveryResult<Vec<BulkDatasetMeta>> {
        let response = self.client.get(&self.metadata_url).send().await?;
        let listing = response.json::<Vec<BulkDatasetMeta>>().await?;
        Ok(listing)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl Source for BulkDumpSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn check_interval(&self) -> Duration {
        self.check_interval
    }

    async fn discover(
        &self,
        catalog: &dyn Catalog,
        pending: &dyn PendingStore,
        dispatch: &DispatchHandle,
    ) -> DiscoveryResult<()> {
        let previous_sha1 = pending.get(&self.identifier).map(|r| r.sha1);

        let (tarball, current_sha1) = self.download_and_hash().await?;

        if previous_sha1.as_deref() == Some(current_sha1.as_str()) {
            log::info!("{}: dump hasn't changed", self.identifier);
            return Ok(());
        }

        let extracted = std::sync::Arc::new(self.extract(&tarball)?);
        let listing = self.fetch_metadata().await?;

        let mut seen = std::collections::HashSet::new();
        for meta in &listing {
            seen.insert(meta.source_local_id.clone());

            let mut materialize = BTreeMap::new();
            materialize.insert("identifier".to_string(), self.identifier.clone());
            materialize.insert("source_local_id".to_string(), meta.source_local_id.clone());

            let item = WorkItem {
                dataset_id: dataset_id(&self.identifier, &meta.source_local_id),
                name: meta.name.clone(),
                description: meta.description.clone(),
                materialize,
                csv_path: extracted.path().join(&meta.csv_path),
                priority: Priority::Normal,
                extraction_dir: Some(extracted.clone()),
            };
            dispatch.submit(item).await;
        }

        let existing = catalog.scan(&self.identifier)?;
        let mut deleted = 0usize;
        for profile in existing {
            let local_id = profile.materialize.get("source_local_id").cloned();
            if local_id.map(|id| !seen.contains(&id)).unwrap_or(true) {
                if let Err(e) = catalog.delete(&profile.id) {
                    log::warn!("{}: failed to delete stale dataset {}: {}", self.identifier, profile.id, e);
                } else {
                    deleted += 1;
                }
            }
        }
        if deleted > 0 {
            log::info!("{}: deleted {} missing datasets", self.identifier, deleted);
        }

        pending.put(&self.identifier, PendingRecord { sha1: current_sha1 });
        Ok(())
    }
}
