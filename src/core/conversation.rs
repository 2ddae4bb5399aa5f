use crate::core::error::ChatError;
use crate::providers::{
    ChatRequest, ContentBlock, LLMProvider, Message, Role, StreamEvent, Usage,
};
use crate::tools::{ToolCall, ToolResult, ToolSet};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ordered history of a chat session plus its system prompt.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    system: String,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: Vec::new(),
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Appends user text. A trailing user message (left behind by an
    /// interrupted turn, or holding tool results) absorbs it so roles keep
    /// alternating.
    pub fn push_user_text(&mut self, text: &str) {
        let block = ContentBlock::Text {
            text: text.to_string(),
        };
        match self.messages.last_mut() {
            Some(last) if last.role == Role::User => last.content.push(block),
            _ => self.messages.push(Message {
                role: Role::User,
                content: vec![block],
            }),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Receives progress of a turn as it happens.
pub trait TurnObserver {
    fn on_text(&mut self, _chunk: &str) {}

    fn on_tool_call(&mut self, _call: &ToolCall) {}

    fn on_tool_result(&mut self, _call: &ToolCall, _result: &ToolResult) {}

    /// Token counts of one model response, when the API reports them.
    fn on_usage(&mut self, _usage: &Usage) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Text of the final model response.
    pub text: String,
    pub tool_rounds: usize,
    /// Summed over every model response of the turn.
    pub usage: Usage,
}

enum TurnState {
    AwaitingModelResponse,
    DispatchingTools(Vec<ToolCall>),
    Done(String),
}

fn result_block(call: &ToolCall, result: &ToolResult) -> ContentBlock {
    ContentBlock::ToolResult {
        tool_use_id: call.id.clone(),
        content: result.to_wire(),
        is_error: !result.success,
    }
}

/// Drives one user turn: model response, tool dispatch, repeat until the
/// model answers without tool calls.
pub struct ConversationLoop<'a> {
    provider: &'a dyn LLMProvider,
    tools: &'a mut ToolSet,
    max_iterations: usize,
}

impl<'a> ConversationLoop<'a> {
    pub fn new(provider: &'a dyn LLMProvider, tools: &'a mut ToolSet, max_iterations: usize) -> Self {
        Self {
            provider,
            tools,
            max_iterations,
        }
    }

    pub async fn run_turn(
        &mut self,
        conversation: &mut Conversation,
        input: &str,
        observer: &mut dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ChatError> {
        conversation.push_user_text(input);
        let mut rounds = 0;
        let mut usage = Usage::default();
        let mut state = TurnState::AwaitingModelResponse;

        loop {
            state = match state {
                TurnState::AwaitingModelResponse => {
                    let reply = self
                        .next_reply(conversation, observer, &mut usage, cancel)
                        .await?;
                    let calls = reply.tool_calls();
                    let text = reply.text_content();
                    if reply.content.is_empty() {
                        warn!("model returned an empty response");
                    } else {
                        conversation.push(reply);
                    }
                    if calls.is_empty() {
                        TurnState::Done(text)
                    } else {
                        TurnState::DispatchingTools(calls)
                    }
                }
                TurnState::DispatchingTools(calls) => {
                    if rounds >= self.max_iterations {
                        warn!(limit = self.max_iterations, "tool iteration limit reached");
                        let skipped = ToolResult::failure(format!(
                            "Not executed: the limit of {} tool rounds per turn was reached.",
                            self.max_iterations
                        ));
                        let content = calls
                            .iter()
                            .map(|call| result_block(call, &skipped))
                            .collect();
                        conversation.push(Message {
                            role: Role::User,
                            content,
                        });
                        return Err(ChatError::IterationLimit(self.max_iterations));
                    }
                    rounds += 1;
                    self.dispatch_all(conversation, &calls, observer, cancel)
                        .await?;
                    TurnState::AwaitingModelResponse
                }
                TurnState::Done(text) => {
                    info!(
                        tool_rounds = rounds,
                        input_tokens = usage.input_tokens,
                        cache_read_tokens = usage.cache_read_input_tokens,
                        "turn complete"
                    );
                    return Ok(TurnOutcome {
                        text,
                        tool_rounds: rounds,
                        usage,
                    });
                }
            };
        }
    }

    async fn next_reply(
        &self,
        conversation: &Conversation,
        observer: &mut dyn TurnObserver,
        usage: &mut Usage,
        cancel: &CancellationToken,
    ) -> Result<Message, ChatError> {
        let request = ChatRequest {
            system: conversation.system(),
            messages: conversation.messages(),
            tools: self.tools.schemas(),
        };
        debug!(
            model = self.provider.model(),
            messages = request.messages.len(),
            "requesting model response"
        );

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            stream = self.provider.get_response_stream(&request) => stream?,
        };

        let mut text = String::new();
        let mut calls = Vec::new();
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                event = stream.next() => event,
            };
            match event {
                None => break,
                Some(Err(e)) => return Err(e),
                Some(Ok(StreamEvent::Text(chunk))) => {
                    observer.on_text(&chunk);
                    text.push_str(&chunk);
                }
                Some(Ok(StreamEvent::ToolCall(call))) => calls.push(call),
                Some(Ok(StreamEvent::Usage(reported))) => {
                    observer.on_usage(&reported);
                    usage.add(&reported);
                }
            }
        }

        let mut content = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
        content.extend(calls.into_iter().map(|call| ContentBlock::ToolUse {
            id: call.id,
            name: call.name,
            input: call.input,
        }));
        Ok(Message {
            role: Role::Assistant,
            content,
        })
    }

    /// Runs every call in order and appends one user message with all
    /// results. Calls left unexecuted by a cancellation or a fatal error
    /// still get a failed result.
    async fn dispatch_all(
        &mut self,
        conversation: &mut Conversation,
        calls: &[ToolCall],
        observer: &mut dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<(), ChatError> {
        let mut content = Vec::with_capacity(calls.len());
        let mut fatal = None;

        for call in calls {
            let result = if fatal.is_some() {
                ToolResult::failure("Not executed: a previous tool call failed fatally.")
            } else if cancel.is_cancelled() {
                ToolResult::failure("Cancelled by user")
            } else {
                observer.on_tool_call(call);
                match self.tools.dispatch(call, cancel).await {
                    Ok(result) => {
                        observer.on_tool_result(call, &result);
                        result
                    }
                    Err(e) => {
                        let result = ToolResult::failure(e.to_string());
                        observer.on_tool_result(call, &result);
                        fatal = Some(e);
                        result
                    }
                }
            };
            content.push(result_block(call, &result));
        }

        conversation.push(Message {
            role: Role::User,
            content,
        });

        if let Some(e) = fatal {
            return Err(e.into());
        }
        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }
        Ok(())
    }
}
