use corpora_core::CoreError;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("Anyhow error")]
    Anyhow(#[from] anyhow::Error),
    #[error("corpora-core error")]
    Core(#[from] CoreError),
    #[error("serde JSON error")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("std IO error")]
    IOError(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;
