use crate::core::error::ChatError;
use crate::providers::base_client::{HttpClient, SseDecoder};
use crate::providers::{
    ChatRequest, LLMProvider, Message, Role, StreamEvent, Usage, parse_tool_input,
};
use crate::tools::{ToolCall, ToolSchema};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// The API accepts four cache breakpoints: system, tools and this many user
/// turns.
const USER_CACHE_BREAKPOINTS: usize = 2;

struct PendingToolUse {
    id: String,
    name: String,
    json: String,
}

/// Stateful decoder for Anthropic Messages streaming events. Tool-use blocks
/// are buffered by index until their `content_block_stop` arrives.
#[derive(Default)]
pub struct AnthropicDecoder {
    pending: HashMap<u64, PendingToolUse>,
    usage: Usage,
}

/// Copies the counters present in an Anthropic `usage` object.
fn read_usage(value: &Value, usage: &mut Usage) {
    let fields = [
        ("input_tokens", &mut usage.input_tokens),
        ("output_tokens", &mut usage.output_tokens),
        ("cache_creation_input_tokens", &mut usage.cache_creation_input_tokens),
        ("cache_read_input_tokens", &mut usage.cache_read_input_tokens),
    ];
    for (key, slot) in fields {
        if let Some(count) = value[key].as_u64() {
            *slot = count;
        }
    }
}

impl SseDecoder for AnthropicDecoder {
    fn decode(&mut self, data: &str) -> Result<Vec<StreamEvent>, ChatError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let parsed: Value = serde_json::from_str(data)?;
        let index = parsed["index"].as_u64().unwrap_or(0);

        let mut events = Vec::new();
        match parsed["type"].as_str() {
            Some("content_block_start") => {
                let block = &parsed["content_block"];
                match block["type"].as_str() {
                    Some("tool_use") => {
                        self.pending.insert(
                            index,
                            PendingToolUse {
                                id: block["id"].as_str().unwrap_or_default().to_string(),
                                name: block["name"].as_str().unwrap_or_default().to_string(),
                                json: String::new(),
                            },
                        );
                    }
                    Some("text") => {
                        if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                            events.push(StreamEvent::Text(text.to_string()));
                        }
                    }
                    _ => {}
                }
            }
            Some("content_block_delta") => {
                let delta = &parsed["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => {
                        if let Some(text) = delta["text"].as_str() {
                            events.push(StreamEvent::Text(text.to_string()));
                        }
                    }
                    Some("input_json_delta") => {
                        if let (Some(pending), Some(partial)) = (
                            self.pending.get_mut(&index),
                            delta["partial_json"].as_str(),
                        ) {
                            pending.json.push_str(partial);
                        }
                    }
                    _ => {}
                }
            }
            Some("content_block_stop") => {
                if let Some(pending) = self.pending.remove(&index) {
                    events.push(StreamEvent::ToolCall(ToolCall {
                        id: pending.id,
                        name: pending.name,
                        input: parse_tool_input(&pending.json),
                    }));
                }
            }
            Some("message_start") => {
                read_usage(&parsed["message"]["usage"], &mut self.usage);
            }
            Some("message_delta") => {
                if let Some(reason) = parsed["delta"]["stop_reason"].as_str() {
                    debug!(stop_reason = reason, "anthropic message finished");
                }
                read_usage(&parsed["usage"], &mut self.usage);
                if !self.usage.is_empty() {
                    events.push(StreamEvent::Usage(self.usage));
                }
            }
            Some("error") => {
                let message = parsed["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown error");
                return Err(ChatError::Api(format!("Anthropic stream error: {}", message)));
            }
            _ => {}
        }
        Ok(events)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

const EPHEMERAL: CacheControl = CacheControl { kind: "ephemeral" };

#[derive(Serialize)]
struct SystemBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(flatten)]
    schema: &'a ToolSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<SystemBlock<'a>>,
    messages: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    stream: bool,
}

impl<'a> AnthropicRequest<'a> {
    /// Builds the request body. With caching on, the system prompt, the last
    /// tool and the newest user turns carry an ephemeral `cache_control`.
    fn new(
        model: &'a str,
        max_tokens: u32,
        request: &ChatRequest<'a>,
        caching: bool,
    ) -> Result<Self, ChatError> {
        let cache = caching.then_some(EPHEMERAL);

        let system = if request.system.is_empty() {
            Vec::new()
        } else {
            vec![SystemBlock {
                kind: "text",
                text: request.system,
                cache_control: cache,
            }]
        };

        let last_tool = request.tools.len().saturating_sub(1);
        let tools = request
            .tools
            .iter()
            .enumerate()
            .map(|(i, schema)| WireTool {
                schema,
                cache_control: cache.filter(|_| i == last_tool),
            })
            .collect();

        let mut messages = serde_json::to_value(request.messages)?;
        if caching {
            mark_recent_user_turns(&mut messages, request.messages);
        }

        Ok(Self {
            model,
            max_tokens,
            system,
            messages,
            tools,
            stream: true,
        })
    }
}

fn mark_recent_user_turns(wire: &mut Value, messages: &[Message]) {
    let Some(wire) = wire.as_array_mut() else {
        return;
    };
    let recent_users = messages
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, message)| message.role == Role::User)
        .take(USER_CACHE_BREAKPOINTS)
        .map(|(i, _)| i);
    for index in recent_users {
        if let Some(last_block) = wire[index]["content"]
            .as_array_mut()
            .and_then(|blocks| blocks.last_mut())
            .and_then(Value::as_object_mut)
        {
            last_block.insert("cache_control".to_string(), json!({"type": EPHEMERAL.kind}));
        }
    }
}

#[derive(Clone)]
pub struct AnthropicProvider {
    client: HttpClient,
    model: String,
    max_tokens: u32,
    prompt_caching: bool,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: String, max_tokens: u32) -> Self {
        let mut extra_headers = HashMap::new();
        extra_headers.insert("anthropic-version".to_string(), API_VERSION.to_string());
        Self {
            client: HttpClient::new(
                base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                Some(("x-api-key".to_string(), api_key)),
                Some(extra_headers),
            ),
            model,
            max_tokens,
            prompt_caching: true,
        }
    }

    pub fn with_prompt_caching(mut self, enabled: bool) -> Self {
        self.prompt_caching = enabled;
        self
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn get_response_stream(
        &self,
        request: &ChatRequest<'_>,
    ) -> Result<BoxStream<'static, Result<StreamEvent, ChatError>>, ChatError> {
        let payload =
            AnthropicRequest::new(&self.model, self.max_tokens, request, self.prompt_caching)?;

        let response = self.client.post("messages", &payload).await?;
        Ok(HttpClient::stream_events(
            response,
            AnthropicDecoder::default(),
        ))
    }

    fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    fn model(&self) -> &str {
        &self.model
    }
}
