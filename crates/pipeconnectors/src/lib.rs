//! Standard connector library
//!
//! Built-in connectors for reading, transforming and writing workflow data.

mod converter;
mod csv_file;
mod file;
mod gmail;
mod http;
mod log;
mod record_store;
mod settings;
mod transform;

pub use converter::RecordsToCsvConverter;
pub use csv_file::{CsvDestination, CsvSource};
pub use file::FileSource;
pub use gmail::GmailSource;
pub use http::{build_url, HttpConnector};
pub use log::LogDestination;
pub use record_store::RecordStoreSource;
pub use settings::ConnectorSettings;
pub use transform::{Transformation, TransformProcessor};

use pipecore::Connector;
use piperuntime::ConnectorRegistry;
use std::sync::Arc;

/// Register all standard connectors with a registry
pub fn register_all(registry: &mut ConnectorRegistry, settings: Arc<ConnectorSettings>) {
    let s = settings.clone();
    registry.register(FileSource::KIND, move || {
        Box::new(FileSource::new(s.clone())) as Box<dyn Connector>
    });

    let s = settings.clone();
    registry.register(CsvSource::KIND, move || {
        Box::new(CsvSource::new(s.clone())) as Box<dyn Connector>
    });

    let s = settings.clone();
    registry.register(CsvDestination::KIND, move || {
        Box::new(CsvDestination::new(s.clone())) as Box<dyn Connector>
    });

    let s = settings;
    registry.register(RecordsToCsvConverter::KIND, move || {
        Box::new(RecordsToCsvConverter::new(s.clone())) as Box<dyn Connector>
    });

    registry.register(HttpConnector::SOURCE_KIND, || {
        Box::new(HttpConnector::source()) as Box<dyn Connector>
    });
    registry.register(HttpConnector::DESTINATION_KIND, || {
        Box::new(HttpConnector::destination()) as Box<dyn Connector>
    });
    registry.register(GmailSource::KIND, || {
        Box::new(GmailSource::new()) as Box<dyn Connector>
    });
    registry.register(RecordStoreSource::KIND, || {
        Box::new(RecordStoreSource::new()) as Box<dyn Connector>
    });
    registry.register(TransformProcessor::KIND, || {
        Box::new(TransformProcessor::new()) as Box<dyn Connector>
    });
    registry.register(LogDestination::KIND, || {
        Box::new(LogDestination::new()) as Box<dyn Connector>
    });
}

/// Render a JSON value as a CSV cell or query parameter
pub(crate) fn plain_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

