//! Error types for the discovery loop and work dispatcher.

#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("fetching dump from {source}: {reason}")]
    DumpFetch { source: String, reason: String },
    #[error("extracting dump for {source}: {reason}")]
    Extraction { source: String, reason: String },
    #[error("listing metadata for {source}: {reason}")]
    MetadataListing { source: String, reason: String },
    #[error(transparent)]
    Core(#[from] corpora_core::CoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
