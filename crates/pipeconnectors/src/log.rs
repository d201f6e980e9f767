use async_trait::async_trait;
use pipecore::{
    ConfigField, ConfigSchema, Connector, ConnectorContext, ConnectorError, NodeCategory,
    Payload, PayloadExt,
};
use serde_json::{json, Value};

const LEVELS: &[&str] = &["debug", "info", "warn", "error"];

/// Destination that logs whatever reaches it
pub struct LogDestination {
    level: String,
}

impl LogDestination {
    pub const KIND: &'static str = "log_destination";

    pub fn new() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for LogDestination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for LogDestination {
    fn id(&self) -> &str {
        Self::KIND
    }

    fn name(&self) -> &str {
        "Log Destination"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Destination
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().field(
            "log_level",
            ConfigField::string("Log Level")
                .default_value("info")
                .choices(LEVELS),
        )
    }

    async fn configure(&mut self, config: Payload) -> Result<(), ConnectorError> {
        let level = config.str_or("log_level", "info");
        if !LEVELS.contains(&level) {
            return Err(ConnectorError::InvalidConfig {
                field: "log_level".into(),
                expected: LEVELS.join("|"),
            });
        }
        self.level = level.to_string();
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ConnectorContext,
        input: Payload,
    ) -> Result<Payload, ConnectorError> {
        let message = format!("Log: {}", Value::Object(input));

        match self.level.as_str() {
            "debug" => tracing::debug!(node_id = %ctx.node_id, "{}", message),
            "warn" => tracing::warn!(node_id = %ctx.node_id, "{}", message),
            "error" => tracing::error!(node_id = %ctx.node_id, "{}", message),
            _ => tracing::info!(node_id = %ctx.node_id, "{}", message),
        }
        ctx.events.info(message.clone());

        let mut output = Payload::new();
        output.insert("status".into(), json!("success"));
        output.insert("message".into(), json!(message));
        Ok(output)
    }
}
