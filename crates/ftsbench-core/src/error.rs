use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Index initialization failed: {0}")]
    Initialization(String),

    #[error("Failed to parse line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Ingest failed: {0}")]
    Ingest(String),

    #[error("Backend did not acknowledge completion within {0:?}")]
    FlushTimeout(Duration),

    #[error("Query failed: {0}")]
    Query(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Per-line parse failures are recovered by the pipelines; everything else aborts the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Parse { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
