//! Error types for the catalog, classifier, profiler and query engine.

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("dataset not found: {0}")]
    NotFound(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("profiling failed for {dataset}: {reason}")]
    ProfilingFailed { dataset: String, reason: String },
    #[error("column count mismatch: header has {header} columns, hint had {hint}")]
    ColumnMismatch { header: usize, hint: usize },
    #[error("sketch index error (non-fatal): {0}")]
    SketchIndex(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_displays_id() {
        let err = CoreError::NotFound("acme.123".into());
        assert_eq!(err.to_string(), "dataset not found: acme.123");
    }
}
