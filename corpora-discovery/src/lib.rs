//! Discovery loop and work dispatcher connecting external catalogs to the
//! profiler.

pub mod bulk;
pub mod dispatcher;
pub mod error;
pub mod incremental;
pub mod loop_runner;
pub mod source;

pub use bulk::BulkDumpSource;
pub use dispatcher::{DispatchHandle, Dispatcher, MAX_CONCURRENT};
pub use error::{DiscoveryError, DiscoveryResult};
pub use incremental::IncrementalSource;
pub use source::{AnySource, Priority, Source, WorkItem};
