use crate::csv_file::{write_file, Table};
use crate::ConnectorSettings;
use async_trait::async_trait;
use pipecore::{
    ConfigField, ConfigSchema, Connector, ConnectorContext, ConnectorError, NodeCategory,
    Payload, PayloadExt,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Converts record lists produced by upstream sources into a CSV file
pub struct RecordsToCsvConverter {
    settings: Arc<ConnectorSettings>,
    config: Payload,
}

impl RecordsToCsvConverter {
    pub const KIND: &'static str = "records_to_csv_converter";

    pub fn new(settings: Arc<ConnectorSettings>) -> Self {
        Self {
            settings,
            config: Payload::new(),
        }
    }
}

#[async_trait]
impl Connector for RecordsToCsvConverter {
    fn id(&self) -> &str {
        Self::KIND
    }

    fn name(&self) -> &str {
        "Records to CSV Converter"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Processor
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "input_format",
                ConfigField::string("Input Format")
                    .describe("Format of the input data (json)")
                    .default_value("json")
                    .choices(&["json"]),
            )
            .field(
                "output_path",
                ConfigField::string("Output Path")
                    .describe("Path where the CSV file will be saved (relative to storage folder)")
                    .required(),
            )
            .field(
                "include_header",
                ConfigField::boolean("Include Header")
                    .describe("Whether to include a header row in the CSV file")
                    .default_value(true),
            )
    }

    async fn configure(&mut self, config: Payload) -> Result<(), ConnectorError> {
        config.require_str("output_path")?;
        self.config = config;
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ConnectorContext,
        input: Payload,
    ) -> Result<Payload, ConnectorError> {
        if input.is_empty() {
            return Err(ConnectorError::MissingInput(
                "no data provided for CSV conversion".into(),
            ));
        }

        let records = find_records(&input)
            .filter(|records| !records.is_empty())
            .ok_or_else(|| {
                ConnectorError::ExecutionFailed("no valid records found in input data".into())
            })?;

        let table = Table::from_objects(records.iter().filter_map(Value::as_object));
        let path = self
            .settings
            .resolve_destination(self.config.require_str("output_path")?);
        let encoded = table.encode(b',', self.config.bool_or("include_header", true))?;
        write_file(&path, &encoded, false).await?;

        tracing::info!(
            "Successfully converted {} records to CSV at {}",
            table.rows.len(),
            path.display()
        );
        ctx.events
            .info(format!("Converted {} records to CSV", table.rows.len()));

        let mut output = Payload::new();
        output.insert("status".into(), json!("success"));
        output.insert("file_path".into(), json!(path.display().to_string()));
        output.insert("record_count".into(), json!(table.rows.len()));
        Ok(output)
    }
}

/// Looks in `data` (an array, or the first array inside an object), then
/// `records`, then a JSON document under `json`.
fn find_records(input: &Payload) -> Option<Vec<Value>> {
    let from_data = input.get("data").and_then(|data| match data {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => first_array(map),
        _ => None,
    });

    from_data
        .or_else(|| input.get("records").and_then(Value::as_array).cloned())
        .or_else(|| {
            input
                .get("json")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str::<Payload>(raw).ok())
                .and_then(|doc| first_array(&doc))
        })
}

fn first_array(map: &Payload) -> Option<Vec<Value>> {
    map.values().find_map(|v| v.as_array().cloned())
}
