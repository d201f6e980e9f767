use async_trait::async_trait;
use base64::Engine;
use pipecore::{
    ConfigField, ConfigSchema, Connector, ConnectorContext, ConnectorError, NodeCategory,
    Payload, PayloadExt,
};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const TOKENS_COLLECTION: &str = "tokens";

/// Lists Gmail messages with an OAuth access token kept in the record store
pub struct GmailSource {
    config: Payload,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    label_ids: Vec<String>,
    #[serde(default)]
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
}

impl GmailSource {
    pub const KIND: &'static str = "gmail_source";

    pub fn new() -> Self {
        Self {
            config: Payload::new(),
            client: reqwest::Client::new(),
        }
    }

    async fn access_token(&self, ctx: &ConnectorContext) -> Result<String, ConnectorError> {
        let token_id = self.config.require_str("token_id")?;
        let record = ctx
            .store
            .get_record(TOKENS_COLLECTION, token_id)
            .await
            .map_err(|e| {
                ConnectorError::ExecutionFailed(format!(
                    "failed to find token with ID {}: {}",
                    token_id, e
                ))
            })?;

        record
            .opt_str("access_token")
            .map(str::to_string)
            .ok_or_else(|| ConnectorError::ExecutionFailed("invalid token data".into()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, ConnectorError> {
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ConnectorError::ExecutionFailed(format!("failed to {}: {}", what, e)))?;
        response
            .json::<T>()
            .await
            .map_err(|e| ConnectorError::ExecutionFailed(format!("failed to {}: {}", what, e)))
    }
}

impl Default for GmailSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for GmailSource {
    fn id(&self) -> &str {
        Self::KIND
    }

    fn name(&self) -> &str {
        "Gmail Source"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Source
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "token_id",
                ConfigField::string("Token ID")
                    .describe("ID of the stored OAuth token")
                    .required(),
            )
            .field(
                "query",
                ConfigField::string("Search Query").describe("Gmail search query"),
            )
            .field(
                "max_results",
                ConfigField::integer("Max Results")
                    .describe("Maximum number of emails to retrieve")
                    .default_value(10)
                    .range(1.0, 500.0),
            )
            .field(
                "include_content",
                ConfigField::boolean("Include Content")
                    .describe("Whether to include the email body")
                    .default_value(false),
            )
            .field(
                "label_ids",
                ConfigField::array("Label IDs").describe("Only return messages with these labels"),
            )
    }

    async fn configure(&mut self, config: Payload) -> Result<(), ConnectorError> {
        config.require_str("token_id")?;
        self.config = config;
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ConnectorContext,
        _input: Payload,
    ) -> Result<Payload, ConnectorError> {
        let token = self.access_token(ctx).await?;
        let base = self.config.str_or("api_base", DEFAULT_API_BASE).trim_end_matches('/');
        let max_results = self.config.u64_or("max_results", 10);
        let include_body = self.config.bool_or("include_content", false);

        let mut query: Vec<(&str, String)> = vec![("maxResults", max_results.to_string())];
        if let Some(q) = self.config.opt_str("query") {
            query.push(("q", q.to_string()));
        }
        if let Some(labels) = self.config.get("label_ids").and_then(Value::as_array) {
            for label in labels.iter().filter_map(Value::as_str) {
                query.push(("labelIds", label.to_string()));
            }
        }

        let list: MessageList = self
            .get_json(
                self.client
                    .get(format!("{}/users/me/messages", base))
                    .bearer_auth(&token)
                    .query(&query),
                "list messages",
            )
            .await?;

        let mut emails = Vec::with_capacity(list.messages.len());
        for message in &list.messages {
            let msg: Message = self
                .get_json(
                    self.client
                        .get(format!("{}/users/me/messages/{}", base, message.id))
                        .bearer_auth(&token)
                        .query(&[("format", "full")]),
                    &format!("get message {}", message.id),
                )
                .await?;
            emails.push(email_summary(&msg, include_body)?);
        }

        ctx.events.info(format!("Fetched {} emails", emails.len()));

        let next_page_token = list.next_page_token.unwrap_or_default();
        let mut output = Payload::new();
        output.insert("result_count".into(), json!(emails.len()));
        output.insert("data".into(), Value::Array(emails));
        output.insert("has_more".into(), json!(!next_page_token.is_empty()));
        output.insert("next_page_token".into(), json!(next_page_token));
        Ok(output)
    }
}

fn email_summary(msg: &Message, include_body: bool) -> Result<Value, ConnectorError> {
    let header = |name: &str| -> String {
        msg.payload
            .as_ref()
            .and_then(|p| {
                p.headers
                    .iter()
                    .find(|h| h.name.eq_ignore_ascii_case(name))
                    .map(|h| h.value.clone())
            })
            .unwrap_or_default()
    };

    let mut email = json!({
        "id": msg.id,
        "thread_id": msg.thread_id,
        "from": header("from"),
        "to": header("to"),
        "subject": header("subject"),
        "date": header("date"),
        "snippet": msg.snippet,
        "labels": msg.label_ids,
    });

    if include_body {
        let body = msg
            .payload
            .as_ref()
            .map(message_body)
            .transpose()
            .map_err(|e| {
                ConnectorError::ExecutionFailed(format!(
                    "failed to extract body from message {}: {}",
                    msg.id, e
                ))
            })?
            .unwrap_or_default();
        email["body"] = Value::String(body);
    }

    Ok(email)
}

/// Body of the top-level part, else the first plain or html sub-part
fn message_body(part: &MessagePart) -> Result<String, base64::DecodeError> {
    if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
        if !data.is_empty() {
            return decode_part(data);
        }
    }

    for sub in &part.parts {
        if sub.mime_type == "text/plain" || sub.mime_type == "text/html" {
            if let Some(data) = sub.body.as_ref().and_then(|b| b.data.as_deref()) {
                if !data.is_empty() {
                    return decode_part(data);
                }
            }
        }
    }

    Ok(String::new())
}

fn decode_part(data: &str) -> Result<String, base64::DecodeError> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
