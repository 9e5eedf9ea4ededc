use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("i/o on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serde: {0}")] Serde(#[from] serde_json::Error),
    #[error("no tokio runtime: {0}")] NoRuntime(String),
}
