use super::{
    ChatState,
    handler::{ClearCommand, HelpCommand, ModelCommand, QuitCommand, ToolsCommand},
    registry::CommandRegistry,
};
use crate::core::error::ChatError;
use std::sync::Arc;

#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    pub fn execute(
        &self,
        command: &str,
        args: &[&str],
        state: &mut ChatState,
    ) -> Result<Option<String>, ChatError> {
        self.registry.execute(command, args, state)
    }

    /// Parses a `/command arg...` line and runs it.
    pub fn execute_line(
        &self,
        line: &str,
        state: &mut ChatState,
    ) -> Result<Option<String>, ChatError> {
        let parts: Vec<&str> = line.trim_start_matches('/').split_whitespace().collect();
        match parts.split_first() {
            Some((command, args)) => self.execute(command, args, state),
            None => Ok(None),
        }
    }

    pub fn get_command_names(&self) -> Vec<String> {
        self.registry.get_command_names()
    }
}

pub fn create_command_registry() -> CommandDispatcher {
    let mut registry = CommandRegistry::new();

    registry.register(&["quit", "exit", "q"], QuitCommand);
    registry.register(&["help"], HelpCommand);
    registry.register(&["clear"], ClearCommand);
    registry.register(&["model"], ModelCommand);
    registry.register(&["tools"], ToolsCommand);

    CommandDispatcher::new(Arc::new(registry))
}
