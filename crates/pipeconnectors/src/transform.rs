use async_trait::async_trait;
use pipecore::{
    ConfigField, ConfigSchema, Connector, ConnectorContext, ConnectorError, NodeCategory,
    Payload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One field-level edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Transformation {
    /// Move `field` to the key named by `value`
    Rename { field: String, value: String },
    Delete { field: String },
    /// Set `field` to `value`
    Modify { field: String, value: Value },
}

impl Transformation {
    pub fn apply(&self, record: &mut Payload) {
        match self {
            Transformation::Rename { field, value } => {
                if let Some(v) = record.remove(field) {
                    record.insert(value.clone(), v);
                }
            }
            Transformation::Delete { field } => {
                record.remove(field);
            }
            Transformation::Modify { field, value } => {
                record.insert(field.clone(), value.clone());
            }
        }
    }
}

/// Applies rename/delete/modify edits to each row of `data`, or to the
/// input map itself when it carries no row array.
pub struct TransformProcessor {
    transformations: Vec<Transformation>,
}

impl TransformProcessor {
    pub const KIND: &'static str = "transform_processor";

    pub fn new() -> Self {
        Self {
            transformations: Vec::new(),
        }
    }

    fn apply_all(&self, record: &mut Payload) {
        for t in &self.transformations {
            t.apply(record);
        }
    }
}

impl Default for TransformProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TransformProcessor {
    fn id(&self) -> &str {
        Self::KIND
    }

    fn name(&self) -> &str {
        "Transform Processor"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Processor
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().field(
            "transformations",
            ConfigField::array("Transformations")
                .describe("List of {field, action: rename|delete|modify, value}"),
        )
    }

    async fn configure(&mut self, config: Payload) -> Result<(), ConnectorError> {
        self.transformations = match config.get("transformations") {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                ConnectorError::Configuration(format!("invalid transformations: {}", e))
            })?,
        };
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ConnectorContext,
        mut input: Payload,
    ) -> Result<Payload, ConnectorError> {
        match input.get_mut("data") {
            Some(Value::Array(rows)) => {
                for row in rows.iter_mut().filter_map(Value::as_object_mut) {
                    self.apply_all(row);
                }
                ctx.events.info(format!(
                    "Applied {} transformations to {} rows",
                    self.transformations.len(),
                    rows.len()
                ));
            }
            _ => self.apply_all(&mut input),
        }
        Ok(input)
    }
}
