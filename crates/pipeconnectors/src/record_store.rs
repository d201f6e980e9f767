use async_trait::async_trait;
use pipecore::store::parse_sort;
use pipecore::{
    ConfigField, ConfigSchema, Connector, ConnectorContext, ConnectorError, NodeCategory,
    Payload, PayloadExt, RecordQuery,
};
use serde_json::{json, Value};

const MAX_BATCH_SIZE: u64 = 500;
const DEFAULT_SORT: &str = "-created";
const INTERNAL_FIELDS: &[&str] = &["collectionId", "collectionName", "expand"];

/// Pages through a record store collection, scoped to the executing user
pub struct RecordStoreSource {
    config: Payload,
}

impl RecordStoreSource {
    pub const KIND: &'static str = "record_store_source";

    pub fn new() -> Self {
        Self {
            config: Payload::new(),
        }
    }
}

impl Default for RecordStoreSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for RecordStoreSource {
    fn id(&self) -> &str {
        Self::KIND
    }

    fn name(&self) -> &str {
        "Record Store Source"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Source
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "collection",
                ConfigField::string("Collection")
                    .describe("Name of the collection to read")
                    .required(),
            )
            .field(
                "filter",
                ConfigField::object("Filter").describe("Field values records must equal"),
            )
            .field(
                "sort",
                ConfigField::string("Sort")
                    .describe("Comma separated fields, prefix with - for descending")
                    .default_value(DEFAULT_SORT),
            )
            .field(
                "batch_size",
                ConfigField::integer("Batch Size")
                    .describe("Records fetched per page")
                    .default_value(100)
                    .range(1.0, MAX_BATCH_SIZE as f64),
            )
            .field(
                "max_records",
                ConfigField::integer("Max Records")
                    .describe("Upper bound on records returned (0 for no limit)")
                    .default_value(1000),
            )
            .field(
                "ignore_user_filter",
                ConfigField::boolean("Ignore User Filter")
                    .describe("Return records of every user")
                    .default_value(false),
            )
    }

    async fn configure(&mut self, config: Payload) -> Result<(), ConnectorError> {
        config.require_str("collection")?;
        match config.get("filter") {
            None | Some(Value::Null) | Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(ConnectorError::InvalidConfig {
                    field: "filter".into(),
                    expected: "object".into(),
                })
            }
        }
        self.config = config;
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ConnectorContext,
        _input: Payload,
    ) -> Result<Payload, ConnectorError> {
        let collection = self.config.require_str("collection")?;
        let user = ctx.require_user()?;
        let ignore_user_filter = self.config.bool_or("ignore_user_filter", false);
        let batch_size = self.config.u64_or("batch_size", 100).clamp(1, MAX_BATCH_SIZE) as usize;
        let max_records = self.config.u64_or("max_records", 1000) as usize;
        let sort = self.config.str_or("sort", DEFAULT_SORT);

        let mut base = RecordQuery::new(collection);
        base.sort = parse_sort(sort);
        if base.sort.is_empty() {
            base.sort = parse_sort(DEFAULT_SORT);
        }
        if let Some(filter) = self.config.object("filter") {
            for (field, value) in filter {
                base.filter.insert(field.clone(), value.clone());
            }
        }
        if !ignore_user_filter {
            base.owner = Some(user.to_string());
        }

        let mut records: Vec<Value> = Vec::new();
        loop {
            if max_records > 0 && records.len() >= max_records {
                break;
            }
            let page_size = if max_records > 0 {
                batch_size.min(max_records - records.len())
            } else {
                batch_size
            };

            let query = base.clone().page(records.len(), page_size);
            let page = ctx.store.query_records(&query).await.map_err(|e| {
                ConnectorError::ExecutionFailed(format!("failed to query records: {}", e))
            })?;
            let fetched = page.len();

            for mut record in page {
                for field in INTERNAL_FIELDS {
                    record.remove(*field);
                }
                records.push(Value::Object(record));
            }

            tracing::info!(
                "Fetched {} records from collection {} (total: {})",
                fetched,
                collection,
                records.len()
            );

            if fetched < page_size {
                break;
            }
        }

        ctx.events
            .info(format!("Read {} records from {}", records.len(), collection));

        let mut output = Payload::new();
        output.insert("total".into(), json!(records.len()));
        output.insert("records".into(), Value::Array(records));
        output.insert("collection".into(), json!(collection));
        output.insert(
            "metadata".into(),
            json!({
                "filter": base.filter,
                "sort": sort,
                "batch_size": batch_size,
                "max_records": max_records,
                "user": user,
                "user_scoped": !ignore_user_filter,
            }),
        );
        Ok(output)
    }
}
