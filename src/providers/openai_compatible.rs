use crate::core::error::ChatError;
use crate::providers::base_client::{HttpClient, SseDecoder};
use crate::providers::{
    ChatRequest, ContentBlock, LLMProvider, Message, Role, StreamEvent, Usage, parse_tool_input,
};
use crate::tools::{ToolCall, ToolSchema};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Decoder for OpenAI-style `chat.completion.chunk` streams. Tool-call
/// fragments are accumulated per index and flushed when the choice finishes.
#[derive(Default)]
pub struct OpenAIDecoder {
    calls: BTreeMap<u64, PendingCall>,
}

impl OpenAIDecoder {
    fn flush(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .map(|(index, call)| {
                let id = if call.id.is_empty() {
                    format!("call_{}", index)
                } else {
                    call.id
                };
                StreamEvent::ToolCall(ToolCall {
                    id,
                    name: call.name,
                    input: parse_tool_input(&call.arguments),
                })
            })
            .collect()
    }
}

impl SseDecoder for OpenAIDecoder {
    fn decode(&mut self, data: &str) -> Result<Vec<StreamEvent>, ChatError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        if data == "[DONE]" {
            return Ok(self.flush());
        }

        let parsed: Value = serde_json::from_str(data).map_err(|e| {
            ChatError::Serialization(format!("Failed to parse stream data: {}", e))
        })?;
        if let Some(message) = parsed["error"]["message"].as_str() {
            return Err(ChatError::Api(message.to_string()));
        }

        let mut events = Vec::new();
        if let Some(usage) = read_usage(&parsed["usage"]) {
            events.push(StreamEvent::Usage(usage));
        }
        let Some(choice) = parsed["choices"].as_array().and_then(|c| c.first()) else {
            return Ok(events);
        };
        let delta = &choice["delta"];

        if let Some(text) = delta["content"].as_str().filter(|t| !t.is_empty()) {
            events.push(StreamEvent::Text(text.to_string()));
        }
        if let Some(fragments) = delta["tool_calls"].as_array() {
            for fragment in fragments {
                let index = fragment["index"].as_u64().unwrap_or(0);
                let call = self.calls.entry(index).or_default();
                if let Some(id) = fragment["id"].as_str() {
                    call.id = id.to_string();
                }
                if let Some(name) = fragment["function"]["name"].as_str() {
                    call.name.push_str(name);
                }
                if let Some(arguments) = fragment["function"]["arguments"].as_str() {
                    call.arguments.push_str(arguments);
                }
            }
        }
        if choice["finish_reason"].is_string() {
            events.extend(self.flush());
        }
        Ok(events)
    }

    fn finish(&mut self) -> Result<Vec<StreamEvent>, ChatError> {
        Ok(self.flush())
    }
}

/// Reads the final usage chunk. Cached prompt tokens are reported as
/// `prompt_tokens_details.cached_tokens` (DeepSeek: `prompt_cache_hit_tokens`).
fn read_usage(usage: &Value) -> Option<Usage> {
    if !usage.is_object() {
        return None;
    }
    let count = |value: &Value| value.as_u64().unwrap_or(0);
    let cached = usage["prompt_tokens_details"]["cached_tokens"]
        .as_u64()
        .or_else(|| usage["prompt_cache_hit_tokens"].as_u64())
        .unwrap_or(0);
    Some(Usage {
        input_tokens: count(&usage["prompt_tokens"]).saturating_sub(cached),
        output_tokens: count(&usage["completion_tokens"]),
        cache_creation_input_tokens: 0,
        cache_read_input_tokens: cached,
    })
}

/// Maps the conversation onto chat-completions messages. Tool results become
/// `tool` role messages placed before any user text of the same turn.
fn to_wire_messages(system: &str, messages: &[Message]) -> Vec<Value> {
    let mut wire = Vec::new();
    if !system.is_empty() {
        wire.push(json!({"role": "system", "content": system}));
    }

    for message in messages {
        match message.role {
            Role::User => {
                for block in &message.content {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        wire.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": content,
                        }));
                    }
                }
                let text = message.text_content();
                if !text.is_empty() {
                    wire.push(json!({"role": "user", "content": text}));
                }
            }
            Role::Assistant => {
                let text = message.text_content();
                let tool_calls: Vec<Value> = message
                    .tool_calls()
                    .into_iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.input.to_string(),
                            },
                        })
                    })
                    .collect();

                let mut entry = json!({
                    "role": "assistant",
                    "content": if text.is_empty() { Value::Null } else { Value::String(text) },
                });
                if !tool_calls.is_empty() {
                    entry["tool_calls"] = Value::Array(tool_calls);
                }
                wire.push(entry);
            }
        }
    }
    wire
}

fn to_wire_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                },
            })
        })
        .collect()
}

/// Provider for any endpoint speaking the OpenAI chat-completions protocol.
#[derive(Clone)]
pub struct OpenAICompatibleProvider {
    client: HttpClient,
    model: String,
    max_tokens: u32,
}

impl OpenAICompatibleProvider {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        max_tokens: u32,
        extra_headers: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            client: HttpClient::new(
                base_url,
                Some(("Authorization".to_string(), format!("Bearer {}", api_key))),
                extra_headers,
            ),
            model,
            max_tokens,
        }
    }

    fn payload(&self, request: &ChatRequest<'_>) -> Value {
        let mut payload = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": to_wire_messages(request.system, request.messages),
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        if !request.tools.is_empty() {
            payload["tools"] = Value::Array(to_wire_tools(request.tools));
        }
        payload
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn get_response_stream(
        &self,
        request: &ChatRequest<'_>,
    ) -> Result<BoxStream<'static, Result<StreamEvent, ChatError>>, ChatError> {
        let payload = self.payload(request);
        let response = self.client.post("chat/completions", &payload).await?;
        Ok(HttpClient::stream_events(response, OpenAIDecoder::default()))
    }

    fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    fn model(&self) -> &str {
        &self.model
    }
}
