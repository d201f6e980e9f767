use crate::plain_text;
use async_trait::async_trait;
use pipecore::{
    ConfigField, ConfigSchema, Connector, ConnectorContext, ConnectorError, NodeCategory,
    Payload, PayloadExt,
};
use reqwest::{Method, Url};
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP request connector, usable as a source or a destination
pub struct HttpConnector {
    kind: &'static str,
    name: &'static str,
    category: NodeCategory,
    config: Payload,
    client: reqwest::Client,
}

impl HttpConnector {
    pub const SOURCE_KIND: &'static str = "http_source";
    pub const DESTINATION_KIND: &'static str = "http_destination";

    pub fn source() -> Self {
        Self::with_identity(Self::SOURCE_KIND, "HTTP Request", NodeCategory::Source)
    }

    /// Sends the input map as a JSON body when no body is configured
    pub fn destination() -> Self {
        Self::with_identity(
            Self::DESTINATION_KIND,
            "HTTP Destination",
            NodeCategory::Destination,
        )
    }

    fn with_identity(kind: &'static str, name: &'static str, category: NodeCategory) -> Self {
        Self {
            kind,
            name,
            category,
            config: Payload::new(),
            client: reqwest::Client::new(),
        }
    }

    fn method(&self) -> Result<Method, ConnectorError> {
        let raw = self.config.str_or("method", "GET").to_uppercase();
        Method::from_bytes(raw.as_bytes()).map_err(|_| ConnectorError::InvalidConfig {
            field: "method".into(),
            expected: "an HTTP method".into(),
        })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    fn id(&self) -> &str {
        self.kind
    }

    fn name(&self) -> &str {
        self.name
    }

    fn category(&self) -> NodeCategory {
        self.category
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "url",
                ConfigField::string("URL")
                    .describe("The URL to send the request to")
                    .required(),
            )
            .field(
                "method",
                ConfigField::string("Method")
                    .describe("HTTP method")
                    .default_value("GET")
                    .choices(&["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"]),
            )
            .field(
                "headers",
                ConfigField::object("Headers").describe("HTTP headers to include"),
            )
            .field("body", ConfigField::string("Body").describe("Request body"))
            .field(
                "params",
                ConfigField::object("Query Parameters").describe("URL query parameters"),
            )
            .field(
                "timeout",
                ConfigField::integer("Timeout")
                    .describe("Request timeout in seconds, 0 for none")
                    .default_value(DEFAULT_TIMEOUT_SECS),
            )
            .field(
                "parse_json",
                ConfigField::boolean("Parse JSON")
                    .describe("Parse the response as JSON")
                    .default_value(true),
            )
    }

    async fn configure(&mut self, config: Payload) -> Result<(), ConnectorError> {
        config.require_str("url")?;

        let mut builder = reqwest::Client::builder();
        // 0 disables the client timeout
        match config.u64_or("timeout", DEFAULT_TIMEOUT_SECS) {
            0 => {}
            secs => builder = builder.timeout(Duration::from_secs(secs)),
        }
        self.client = builder
            .build()
            .map_err(|e| ConnectorError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        self.config = config;
        self.method()?;
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ConnectorContext,
        input: Payload,
    ) -> Result<Payload, ConnectorError> {
        let url = build_url(self.config.require_str("url")?, self.config.object("params"))?;
        let method = self.method()?;

        ctx.events.info(format!("{} {}", method, url));
        let mut request = self.client.request(method, url);

        if let Some(headers) = self.config.object("headers") {
            for (key, value) in headers {
                request = request.header(key.as_str(), plain_text(value));
            }
        }

        request = match self.config.opt_str("body") {
            Some(body) => request.body(body.to_string()),
            None if self.category == NodeCategory::Destination => request.json(&input),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| ConnectorError::ExecutionFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        let headers: Payload = response
            .headers()
            .keys()
            .map(|name| {
                let joined = response
                    .headers()
                    .get_all(name)
                    .iter()
                    .map(|v| v.to_str().unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(", ");
                (name.to_string(), Value::String(joined))
            })
            .collect();

        let text = response.text().await.map_err(|e| {
            ConnectorError::ExecutionFailed(format!("failed to read response body: {}", e))
        })?;
        ctx.events.info(format!("Response status: {}", status));

        let body = if self.config.bool_or("parse_json", true) && !text.is_empty() {
            match serde_json::from_str::<Value>(&text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::info!("Failed to parse response as JSON: {}", e);
                    Value::String(text)
                }
            }
        } else {
            Value::String(text)
        };

        let mut output = Payload::new();
        output.insert("status_code".into(), json!(status.as_u16()));
        output.insert(
            "status_text".into(),
            json!(format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
            .trim_end()),
        );
        output.insert("headers".into(), Value::Object(headers));
        output.insert("body".into(), body);
        Ok(output)
    }
}

/// Append `params` to the query string of `url`
pub fn build_url(url: &str, params: Option<&Payload>) -> Result<Url, ConnectorError> {
    let mut parsed = Url::parse(url).map_err(|e| ConnectorError::InvalidConfig {
        field: "url".into(),
        expected: format!("a valid URL ({})", e),
    })?;

    if let Some(params) = params.filter(|p| !p.is_empty()) {
        let mut query = parsed.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, &plain_text(value));
        }
    }

    Ok(parsed)
}
