//! Incremental `Source` (§4.8 "Incremental source"), grounded on
//! `discovery/socrata/socrata_discovery.py`'s `process_dataset`: per-dataset
//! listing gated on `updatedAt`, downloaded directly rather than via a dump.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use corpora_core::catalog::{Catalog, PendingStore};
use corpora_core::model::dataset_id;
use serde::Deserialize;

use crate::dispatcher::DispatchHandle;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::source::{Priority, Source, WorkItem};

#[derive(Debug, Clone, Deserialize)]
struct IncrementalDatasetMeta {
    source_local_id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    updated_at: DateTime<Utc>,
    csv_url: String,
}

pub struct IncrementalSource {
    pub identifier: String,
    pub listing_url: String,
    pub check_interval: Duration,
    pub client: reqwest::Client,
}

impl IncrementalSource {
    pub fn new(identifier: impl Into<String>, listing_url: impl Into<String>) -> Self {
        IncrementalSource {
            identifier: identifier.into(),
            listing_url: listing_url.into(),
            check_interval: Duration::from_secs(24 * 60 * 60),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_listing(&self) -> DiscoveryResult<Vec<IncrementalDatasetMeta>> {
        let response = self.client.get(&self.listing_url).send().await?;
        Ok(response.json::<Vec<IncrementalDatasetMeta>>().await?)
    }

    async fn download_csv(&self, url: &str) -> DiscoveryResult<std::path::PathBuf> {
        let response = self.client.get(url).send().await?;
        let bytes = response.bytes().await?;
        let mut file = tempfile::NamedTempFile::new().map_err(DiscoveryError::Io)?;
        std::io::Write::write_all(&mut file, &bytes).map_err(DiscoveryError::Io)?;
        let (_, path) = file.keep().map_err(|e| DiscoveryError::DumpFetch {
            source: self.identifier.clone(),
            reason: e.to_string(),
        })?;
        Ok(path)
    }
}

impl Source for IncrementalSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn check_interval(&self) -> Duration {
        self.check_interval
    }

    async fn discover(
        &self,
        catalog: &dyn Catalog,
        _pending: &dyn PendingStore,
        dispatch: &DispatchHandle,
    ) -> DiscoveryResult<()> {
        let listing = self.fetch_listing().await?;
        log::info!("{}: found {} datasets", self.identifier, listing.len());

        for meta in &listing {
            let id = dataset_id(&self.identifier, &meta.source_local_id);

            if let Ok(existing) = catalog.get(&id) {
                let existing_updated = existing
                    .materialize
                    .get("updated")
                    .and_then(|s| s.parse::<DateTime<Utc>>().ok());
                if let Some(existing_updated) = existing_updated {
                    if meta.updated_at <= existing_updated {
                        log::debug!("{}: dataset {} has not changed", self.identifier, id);
                        continue;
                    }
                }
            }

            let csv_path = match self.download_csv(&meta.csv_url).await {
                Ok(path) => path,
                Err(e) => {
                    log::warn!("{}: failed to download {}: {}", self.identifier, meta.source_local_id, e);
                    continue;
                }
            };

            let mut materialize = BTreeMap::new();
            materialize.insert("identifier".to_string(), self.identifier.clone());
            materialize.insert("source_local_id".to_string(), meta.source_local_id.clone());
            materialize.insert("updated".to_string(), meta.updated_at.to_rfc3339());

            let item = WorkItem {
                dataset_id: id,
                name: meta.name.clone(),
                description: meta.description.clone(),
                materialize,
                csv_path,
                priority: Priority::Normal,
                extraction_dir: None,
            };
            dispatch.submit(item).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use corpora_core::catalog::memory::{InMemoryCatalog, InMemoryPendingStore};
    use httpmock::prelude::*;

    fn listing_body() -> serde_json::Value {
        serde_json::json!([
            {
                "source_local_id": "abcd-1234",
                "name": "Pothole complaints",
                "updated_at": "2024-01-01T00:00:00Z",
                "csv_url": "/datasets/abcd-1234.csv",
            }
        ])
    }

    #[tokio::test]
    async fn new_dataset_is_submitted_to_dispatcher() {
        let server = MockServer::start();
        let listing_mock = server.mock(|when, then| {
            when.method(GET).path("/listing");
            then.status(200).json_body(listing_body());
        });
        server.mock(|when, then| {
            when.method(GET).path("/datasets/abcd-1234.csv");
            then.status(200).body("id,value\n1,2\n");
        });

        let source = IncrementalSource::new("acme", server.url("/listing"));
        let catalog = InMemoryCatalog::new();
        let pending = InMemoryPendingStore::new();
        let dispatcher = Dispatcher::new(std::sync::Arc::new(catalog));
        let handle = dispatcher.handle();

        source.discover(&InMemoryCatalog::new(), &pending, &handle).await.unwrap();
        listing_mock.assert();
    }
}
