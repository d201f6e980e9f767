use crate::{plain_text, ConnectorSettings};
use async_trait::async_trait;
use pipecore::{
    ConfigField, ConfigSchema, Connector, ConnectorContext, ConnectorError, NodeCategory,
    Payload, PayloadExt,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

const FILE_PATH_HELP: &str = "Path to the CSV file (uploads/{filename}.csv for uploaded files)";

/// Reads a CSV file into an array of row objects
pub struct CsvSource {
    settings: Arc<ConnectorSettings>,
    config: Payload,
}

impl CsvSource {
    pub const KIND: &'static str = "csv_source";

    pub fn new(settings: Arc<ConnectorSettings>) -> Self {
        Self {
            settings,
            config: Payload::new(),
        }
    }
}

#[async_trait]
impl Connector for CsvSource {
    fn id(&self) -> &str {
        Self::KIND
    }

    fn name(&self) -> &str {
        "CSV Source"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Source
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "file_path",
                ConfigField::string("File Path").describe(FILE_PATH_HELP).required(),
            )
            .field(
                "has_header",
                ConfigField::boolean("Has Header")
                    .describe("Whether the CSV file has a header row")
                    .default_value(true),
            )
            .field(
                "delimiter",
                ConfigField::string("Delimiter")
                    .describe("Field delimiter (comma, semicolon, tab, etc.)")
                    .default_value(","),
            )
            .field(
                "comment",
                ConfigField::string("Comment Character")
                    .describe("Character that marks the start of a comment line"),
            )
    }

    async fn configure(&mut self, config: Payload) -> Result<(), ConnectorError> {
        config.require_str("file_path")?;
        self.config = config;
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ConnectorContext,
        _input: Payload,
    ) -> Result<Payload, ConnectorError> {
        let path = self
            .settings
            .resolve_source(self.config.require_str("file_path")?);
        ctx.events.info(format!("Reading CSV file {}", path.display()));

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            ConnectorError::ExecutionFailed(format!("failed to open CSV file: {}", e))
        })?;

        let mut reader = ::csv::ReaderBuilder::new();
        reader
            .has_headers(false)
            .flexible(true)
            .delimiter(first_byte(&self.config, "delimiter").unwrap_or(b','))
            .comment(first_byte(&self.config, "comment"));

        let mut records = Vec::new();
        for record in reader.from_reader(bytes.as_slice()).records() {
            let record = record.map_err(|e| {
                ConnectorError::ExecutionFailed(format!("failed to read CSV data: {}", e))
            })?;
            records.push(record);
        }

        let rows = rows_from_records(&records, self.config.bool_or("has_header", true));
        tracing::debug!(path = %path.display(), rows = rows.len(), "CSV file read");

        let mut output = Payload::new();
        output.insert("record_count".into(), json!(rows.len()));
        output.insert("data".into(), Value::Array(rows));
        output.insert("file_path".into(), json!(path.display().to_string()));
        Ok(output)
    }
}

/// Header cells become keys; cells without a header, and every cell of a
/// headerless file, are keyed `column_N` (1-based).
fn rows_from_records(records: &[::csv::StringRecord], has_header: bool) -> Vec<Value> {
    let (headers, body) = match records.split_first() {
        Some((first, rest)) if has_header => (Some(first), rest),
        _ => (None, records),
    };

    body.iter()
        .map(|record| {
            let row: Payload = record
                .iter()
                .enumerate()
                .map(|(j, cell)| {
                    let key = headers
                        .and_then(|h| h.get(j))
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("column_{}", j + 1));
                    (key, Value::String(cell.to_string()))
                })
                .collect();
            Value::Object(row)
        })
        .collect()
}

/// Writes row objects from `data` to a CSV file
pub struct CsvDestination {
    settings: Arc<ConnectorSettings>,
    config: Payload,
}

impl CsvDestination {
    pub const KIND: &'static str = "csv_destination";

    pub fn new(settings: Arc<ConnectorSettings>) -> Self {
        Self {
            settings,
            config: Payload::new(),
        }
    }
}

#[async_trait]
impl Connector for CsvDestination {
    fn id(&self) -> &str {
        Self::KIND
    }

    fn name(&self) -> &str {
        "CSV Destination"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Destination
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "file_path",
                ConfigField::string("File Path").describe(FILE_PATH_HELP).required(),
            )
            .field(
                "delimiter",
                ConfigField::string("Delimiter")
                    .describe("Field delimiter (comma, semicolon, tab, etc.)")
                    .default_value(","),
            )
            .field(
                "include_header",
                ConfigField::boolean("Include Header")
                    .describe("Whether to include a header row in the CSV file")
                    .default_value(true),
            )
            .field(
                "append",
                ConfigField::boolean("Append")
                    .describe("Append to an existing file instead of replacing it")
                    .default_value(false),
            )
    }

    async fn configure(&mut self, config: Payload) -> Result<(), ConnectorError> {
        config.require_str("file_path")?;
        self.config = config;
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ConnectorContext,
        input: Payload,
    ) -> Result<Payload, ConnectorError> {
        let path = self
            .settings
            .resolve_destination(self.config.require_str("file_path")?);
        let data = input
            .get("data")
            .ok_or_else(|| ConnectorError::MissingInput("data".into()))?;
        let table = Table::from_value(data)?;

        let append = self.config.bool_or("append", false);
        let existing_len = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        let header = self.config.bool_or("include_header", true) && (!append || existing_len == 0);

        let encoded = table.encode(
            first_byte(&self.config, "delimiter").unwrap_or(b','),
            header,
        )?;
        write_file(&path, &encoded, append).await?;

        ctx.events.info(format!(
            "Wrote {} rows to {}",
            table.rows.len(),
            path.display()
        ));

        let mut output = Payload::new();
        output.insert("file_path".into(), json!(path.display().to_string()));
        output.insert("record_count".into(), json!(table.rows.len()));
        output.insert("success".into(), json!(true));
        Ok(output)
    }
}

/// Rows with a shared, sorted header built from the union of row keys
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Accepts an array of objects, an object holding such an array under
    /// `data`, or a single object treated as one row.
    pub fn from_value(value: &Value) -> Result<Self, ConnectorError> {
        match value {
            Value::Array(items) => Ok(Self::from_objects(items.iter().filter_map(Value::as_object))),
            Value::Object(map) => match map.get("data") {
                Some(inner @ Value::Array(_)) => Self::from_value(inner),
                _ => Ok(Self::from_objects(std::iter::once(map))),
            },
            _ => Err(ConnectorError::ExecutionFailed(
                "input data must be an array of objects or a single object".into(),
            )),
        }
    }

    pub fn from_objects<'a>(objects: impl Iterator<Item = &'a Payload> + Clone) -> Self {
        let headers: Vec<String> = objects
            .clone()
            .flat_map(|o| o.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let rows = objects
            .map(|o| {
                headers
                    .iter()
                    .map(|h| o.get(h).map(plain_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        Self { headers, rows }
    }

    pub fn encode(&self, delimiter: u8, include_header: bool) -> Result<Vec<u8>, ConnectorError> {
        let mut writer = ::csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(Vec::new());

        let write_err = |e: ::csv::Error| {
            ConnectorError::ExecutionFailed(format!("failed to write CSV row: {}", e))
        };
        if include_header && !self.headers.is_empty() {
            writer.write_record(&self.headers).map_err(write_err)?;
        }
        for row in &self.rows {
            writer.write_record(row).map_err(write_err)?;
        }

        writer
            .into_inner()
            .map_err(|e| ConnectorError::ExecutionFailed(format!("failed to flush CSV: {}", e)))
    }
}

/// Create parent directories, then replace or append to the file
pub(crate) async fn write_file(path: &Path, bytes: &[u8], append: bool) -> Result<(), ConnectorError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            ConnectorError::ExecutionFailed(format!("failed to create directory: {}", e))
        })?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }

    let mut file = options.open(path).await.map_err(|e| {
        ConnectorError::ExecutionFailed(format!("failed to open CSV file for writing: {}", e))
    })?;
    file.write_all(bytes)
        .await
        .map_err(|e| ConnectorError::ExecutionFailed(format!("failed to write CSV file: {}", e)))?;
    file.flush()
        .await
        .map_err(|e| ConnectorError::ExecutionFailed(format!("failed to write CSV file: {}", e)))
}

/// First byte of a single-character config value such as a delimiter
fn first_byte(config: &Payload, key: &str) -> Option<u8> {
    config.opt_str(key).and_then(|s| s.bytes().next())
}
