use crate::ConnectorSettings;
use async_trait::async_trait;
use pipecore::{
    ConfigField, ConfigSchema, Connector, ConnectorContext, ConnectorError, NodeCategory,
    Payload, PayloadExt,
};
use serde_json::json;
use std::sync::Arc;

/// Reads a whole text file
pub struct FileSource {
    settings: Arc<ConnectorSettings>,
    path: String,
}

impl FileSource {
    pub const KIND: &'static str = "file_source";

    pub fn new(settings: Arc<ConnectorSettings>) -> Self {
        Self {
            settings,
            path: String::new(),
        }
    }
}

#[async_trait]
impl Connector for FileSource {
    fn id(&self) -> &str {
        Self::KIND
    }

    fn name(&self) -> &str {
        "File Source"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Source
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().field(
            "file_path",
            ConfigField::string("File Path")
                .describe("Path to the file (uploads/{filename} for uploaded files)")
                .required(),
        )
    }

    async fn configure(&mut self, config: Payload) -> Result<(), ConnectorError> {
        // older editors saved the camelCase key
        let path = match config.opt_str("filePath") {
            Some(path) if config.opt_str("file_path").is_none() => path,
            _ => config.require_str("file_path")?,
        };
        self.path = path.to_string();
        Ok(())
    }

    async fn execute(
        &self,
        _ctx: &ConnectorContext,
        _input: Payload,
    ) -> Result<Payload, ConnectorError> {
        let path = self.settings.resolve_source(&self.path);
        let data = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ConnectorError::ExecutionFailed(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut output = Payload::new();
        output.insert("size".into(), json!(data.len()));
        output.insert("data".into(), json!(data));
        output.insert("path".into(), json!(path.display().to_string()));
        Ok(output)
    }
}
