//! Discovery Loop (C8, §4.8): drives one `Source` forever on its check
//! interval, grounded on `isi_discovery.py`'s `main_loop` (sleep-until-next,
//! catch-and-log at the pass level) generalized to a cancelable Tokio sleep
//! per §5 "the discovery loop's sleep is cancelable".

use std::sync::Arc;

use corpora_core::catalog::{Catalog, PendingStore};
use tokio::sync::watch;

use crate::dispatcher::DispatchHandle;
use crate::source::{AnySource, Source};

/// Runs `source` forever until `shutdown` is set to `true`. A single pass
/// throwing is logged and does not stop the loop (§4.8 "exceptions wrapping
/// the entire pass are captured to an error sink and the loop retries").
pub async fn run(
    source: AnySource,
    catalog: Arc<dyn Catalog>,
    pending: Arc<dyn PendingStore>,
    dispatch: DispatchHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        match source.discover(catalog.as_ref(), pending.as_ref(), &dispatch).await {
            Ok(()) => {}
            Err(e) => log::error!("{}: discovery pass failed: {}", source.identifier(), e),
        }

        tokio::select! {
            _ = tokio::time::sleep(source.check_interval()) => {}
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
