use std::path::{Path, PathBuf};

/// Filesystem layout shared by the file based connectors
#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    pub data_dir: PathBuf,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("pipeline_data"),
        }
    }
}

impl ConnectorSettings {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Reads `PIPELINE_DATA_DIR`, falling back to `./pipeline_data`
    pub fn from_env() -> Self {
        match std::env::var("PIPELINE_DATA_DIR") {
            Ok(dir) if !dir.trim().is_empty() => Self::new(dir),
            _ => Self::default(),
        }
    }

    /// Directory destination connectors write into
    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("storage").join("workflow_results")
    }

    /// `uploads/...` lives under the data dir; anything else is used as given.
    pub fn resolve_source(&self, path: &str) -> PathBuf {
        if is_upload(path) {
            self.data_dir.join(path)
        } else {
            PathBuf::from(path)
        }
    }

    /// `uploads/...` lives under the data dir, absolute paths are kept and
    /// relative paths land in [`ConnectorSettings::results_dir`].
    pub fn resolve_destination(&self, path: &str) -> PathBuf {
        if is_upload(path) {
            self.data_dir.join(path)
        } else if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.results_dir().join(path)
        }
    }
}

fn is_upload(path: &str) -> bool {
    path.starts_with("uploads/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_uploads_and_results() {
        let settings = ConnectorSettings::new("/srv/data");

        assert_eq!(
            settings.resolve_source("uploads/a.csv"),
            PathBuf::from("/srv/data/uploads/a.csv")
        );
        assert_eq!(settings.resolve_source("local/a.csv"), PathBuf::from("local/a.csv"));
        assert_eq!(
            settings.resolve_destination("out.csv"),
            PathBuf::from("/srv/data/storage/workflow_results/out.csv")
        );
        assert_eq!(
            settings.resolve_destination("/tmp/out.csv"),
            PathBuf::from("/tmp/out.csv")
        );
    }
}
