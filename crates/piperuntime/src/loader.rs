use pipecore::WorkflowBundle;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Accepts either a single bundle object or an array of bundles
pub fn parse_bundles(raw: &str) -> Result<Vec<WorkflowBundle>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if value.is_array() {
        serde_json::from_value(value)
    } else {
        serde_json::from_value(value).map(|bundle| vec![bundle])
    }
}

/// Read every bundle from a file holding one bundle or an array of them
pub async fn read_bundles(path: impl AsRef<Path>) -> Result<Vec<WorkflowBundle>, BundleError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| BundleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_bundles(&raw).map_err(|source| BundleError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
