pub mod dispatcher;
pub mod handler;
pub mod registry;

use crate::core::conversation::Conversation;
use crate::providers::LLMProvider;
use crate::tools::ToolSchema;
pub use dispatcher::create_command_registry;

/// Session state that slash commands may inspect or change.
pub struct ChatState {
    pub conversation: Conversation,
    pub provider: Box<dyn LLMProvider>,
    pub tool_schemas: Vec<ToolSchema>,
    pub should_continue: bool,
}

impl ChatState {
    pub fn new(
        provider: Box<dyn LLMProvider>,
        system_prompt: &str,
        tool_schemas: Vec<ToolSchema>,
    ) -> Self {
        Self {
            conversation: Conversation::new(system_prompt),
            provider,
            tool_schemas,
            should_continue: true,
        }
    }
}
