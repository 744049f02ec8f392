//! Work Dispatcher (C9, §4.9): a broker-mediated queue reimplemented over
//! `tokio::sync` primitives, since no AMQP crate (`lapin` et al.) appears
//! anywhere in the retrieved pack. `DispatchHandle::submit` stands in for
//! the *profile* fanout exchange, the `broadcast::Sender<String>` returned
//! by [`Dispatcher::subscribe_datasets`] for the *datasets* topic exchange,
//! and the `mpsc::UnboundedReceiver<WorkItem>` returned by
//! [`Dispatcher::failed_profile`] for the *failed_profile* queue.
//! [`Dispatcher::profile_one`] pushes the actual profiling pass onto
//! `tokio::task::spawn_blocking` since it's CPU-bound (regex matching,
//! k-means clustering, CSV parsing).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use chrono::Utc;
use corpora_core::catalog::Catalog;
use corpora_core::classify::GeoResolver;
use corpora_core::model::ColumnHint;
use corpora_core::profiler::{ProfileRequest, Profiler, SketchMode};
use corpora_core::sketch::SketchIndex;
use tokio::sync::{broadcast, mpsc, Mutex, Notify, Semaphore};

use crate::source::{Priority, WorkItem};

/// Per §4.9: bounded in-flight profiling work per worker process.
pub const MAX_CONCURRENT: usize = 2;
const DATASETS_TOPIC_CAPACITY: usize = 256;

struct PrioritizedItem {
    item: WorkItem,
    seq: u64,
}

impl PrioritizedItem {
    fn priority(&self) -> Priority {
        self.item.priority
    }
}

impl PartialEq for PrioritizedItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority() == other.priority() && self.seq == other.seq
    }
}
impl Eq for PrioritizedItem {}

impl PartialOrd for PrioritizedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedItem {
    /// Higher priority first; ties broken FIFO (earlier `seq` wins) so the
    /// heap behaves like a priority queue with stable ordering per level.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority()
            .cmp(&other.priority())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Queue {
    heap: Mutex<BinaryHeap<PrioritizedItem>>,
    notify: Notify,
    next_seq: AtomicU64,
}

impl Queue {
    fn new() -> Self {
        Queue {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    async fn push(&self, item: WorkItem) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        self.heap.lock().await.push(PrioritizedItem { item, seq });
        self.notify.notify_one();
    }

    async fn pop(&self) -> WorkItem {
        loop {
            {
                let mut heap = self.heap.lock().await;
                if let Some(top) = heap.pop() {
                    return top.item;
                }
            }
            self.notify.notified().await;
        }
    }
}

/// The handle discoverers submit work through — the *profile* fanout
/// exchange's publishing side.
#[derive(Clone)]
pub struct DispatchHandle {
    queue: Arc<Queue>,
}

impl DispatchHandle {
    pub async fn submit(&self, item: WorkItem) {
        self.queue.push(item).await;
    }
}

pub struct Dispatcher {
    queue: Arc<Queue>,
    catalog: Arc<dyn Catalog>,
    geo: Option<Arc<dyn GeoResolver + Send + Sync>>,
    sketch: Option<Arc<dyn SketchIndex>>,
    semaphore: Arc<Semaphore>,
    datasets_tx: broadcast::Sender<String>,
    failed_tx: mpsc::UnboundedSender<WorkItem>,
    failed_rx: Option<mpsc::UnboundedReceiver<WorkItem>>,
}

impl Dispatcher {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        let (datasets_tx, _) = broadcast::channel(DATASETS_TOPIC_CAPACITY);
        let (failed_tx, failed_rx) = mpsc::unbounded_channel();
        Dispatcher {
            queue: Arc::new(Queue::new()),
            catalog,
            geo: None,
            sketch: None,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT)),
            datasets_tx,
            failed_tx,
            failed_rx: Some(failed_rx),
        }
    }

    pub fn with_sketch(mut self, sketch: Arc<dyn SketchIndex>) -> Self {
        self.sketch = Some(sketch);
        self
    }

    pub fn with_geo(mut self, geo: Arc<dyn GeoResolver + Send + Sync>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            queue: self.queue.clone(),
        }
    }

    pub fn subscribe_datasets(&self) -> broadcast::Receiver<String> {
        self.datasets_tx.subscribe()
    }

    /// Takes ownership of the failed-profile receiver; only one caller may
    /// drain it (it is an `mpsc`, not a broadcast, per the single
    /// `failed_profile` queue in §4.9).
    pub fn failed_profile(&mut self) -> mpsc::UnboundedReceiver<WorkItem> {
        self.failed_rx
            .take()
            .expect("failed_profile receiver already taken")
    }

    /// Runs forever, pulling from the priority queue, bounding concurrency
    /// at `MAX_CONCURRENT`, and applying the success/failure rule in §4.9.
    /// Never returns under normal operation; the caller drives cancellation
    /// by dropping the task.
    pub async fn run(self: Arc<Self>) {
        loop {
            let item = self.queue.pop().await;
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore never closed");
            let this = self.clone();
            tokio::spawn(async move {
                this.process_one(item).await;
                drop(permit);
            });
        }
    }

    async fn process_one(&self, item: WorkItem) {
        match self.profile_one(&item).await {
            Ok(profile) => {
                let dataset_id = profile.id.clone();
                if let Err(e) = self.catalog.put(profile) {
                    log::error!("catalog upsert failed for {}: {}", dataset_id, e);
                    let _ = self.failed_tx.send(item);
                    return;
                }
                let _ = self.datasets_tx.send(dataset_id);
            }
            Err(reason) => {
                log::warn!("profiling failed for {}: {}", item.dataset_id, reason);
                // Ack-on-failure: profiling failures are assumed
                // deterministic, so retrying would loop forever.
                let _ = self.failed_tx.send(item);
            }
        }
    }

    /// Reads the CSV asynchronously, then runs the CPU-bound regex/k-means
    /// profiling pass on the blocking thread pool so it doesn't stall the
    /// executor, the same split the teacher uses around
    /// `get_metrics_from_file` in `parquet.rs`.
    async fn profile_one(&self, item: &WorkItem) -> Result<corpora_core::model::Profile, String> {
        let bytes = tokio::fs::read(&item.csv_path)
            .await
            .map_err(|e| e.to_string())?;

        let dataset_id = item.dataset_id.clone();
        let name = item.name.clone();
        let description = item.description.clone();
        let materialize = item.materialize.clone();
        let geo = self.geo.clone();
        let sketch = self.sketch.clone();

        let mut profile = tokio::task::spawn_blocking(move || {
            let hints: Vec<Option<ColumnHint>> = Vec::new();
            let request = ProfileRequest {
                dataset_id,
                name,
                description,
                materialize,
                column_hints: &hints,
            };

            let mut profiler = Profiler::new();
            if let Some(geo) = &geo {
                profiler = profiler.with_geo(geo.as_ref());
            }
            if let Some(sketch) = &sketch {
                profiler = profiler.with_sketch(sketch.as_ref(), SketchMode::Index);
            }

            profiler.profile(&bytes, request).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())??;

        profile.indexed_at = Utc::now();
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpora_core::catalog::memory::InMemoryCatalog;
    use std::collections::BTreeMap;
    use std::io::Write as _;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn csv_item(id: &str, priority: Priority) -> (WorkItem, NamedTempFile) {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id,value").unwrap();
        writeln!(file, "1,10").unwrap();
        writeln!(file, "2,20").unwrap();
        let item = WorkItem {
            dataset_id: id.to_string(),
            name: format!("dataset {id}"),
            description: None,
            materialize: BTreeMap::new(),
            csv_path: file.path().to_path_buf(),
            priority,
            extraction_dir: None,
        };
        (item, file)
    }

    #[tokio::test]
    async fn successful_profile_lands_in_catalog_and_broadcasts() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let mut dispatcher = Dispatcher::new(catalog.clone());
        let mut datasets = dispatcher.subscribe_datasets();
        let handle = dispatcher.handle();
        let dispatcher = Arc::new(dispatcher);

        tokio::spawn(dispatcher.clone().run());

        let (item, _file) = csv_item("ds.1", Priority::Normal);
        handle.submit(item).await;

        let published = tokio::time::timeout(std::time::Duration::from_secs(2), datasets.recv())
            .await
            .expect("dispatcher should publish within timeout")
            .unwrap();
        assert_eq!(published, "ds.1");
        assert!(catalog.get("ds.1").is_ok());
    }

    #[tokio::test]
    async fn missing_csv_lands_in_failed_profile_queue() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let mut dispatcher = Dispatcher::new(catalog.clone());
        let mut failed = dispatcher.failed_profile();
        let handle = dispatcher.handle();
        let dispatcher = Arc::new(dispatcher);

        tokio::spawn(dispatcher.clone().run());

        let item = WorkItem {
            dataset_id: "ds.missing".to_string(),
            name: "missing".to_string(),
            description: None,
            materialize: BTreeMap::new(),
            csv_path: PathBuf::from("/nonexistent/path.csv"),
            priority: Priority::Normal,
            extraction_dir: None,
        };
        handle.submit(item).await;

        let failed_item = tokio::time::timeout(std::time::Duration::from_secs(2), failed.recv())
            .await
            .expect("failed_profile should receive within timeout")
            .unwrap();
        assert_eq!(failed_item.dataset_id, "ds.missing");
    }
}
