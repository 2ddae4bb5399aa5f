use super::ChatState;
use crate::core::error::ChatError;

use console::style;

pub trait CommandHandler {
    fn execute(&self, state: &mut ChatState, args: &[&str]) -> Result<Option<String>, ChatError>;
    fn help(&self) -> &'static str;
}

pub struct QuitCommand;
pub struct HelpCommand;
pub struct ClearCommand;
pub struct ModelCommand;
pub struct ToolsCommand;

impl CommandHandler for QuitCommand {
    fn execute(&self, state: &mut ChatState, _args: &[&str]) -> Result<Option<String>, ChatError> {
        state.should_continue = false;
        Ok(None)
    }

    fn help(&self) -> &'static str {
        "/quit - Exit the chat session (also /exit, /q)"
    }
}

impl CommandHandler for HelpCommand {
    fn execute(
        &self,
        _state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        let title = style("Available Commands").bold().underlined();
        let help_text = [
            title.to_string(),
            QuitCommand.help().to_string(),
            HelpCommand.help().to_string(),
            ClearCommand.help().to_string(),
            ModelCommand.help().to_string(),
            ToolsCommand.help().to_string(),
        ]
        .join("\n");

        Ok(Some(help_text))
    }

    fn help(&self) -> &'static str {
        "/help - Show available commands"
    }
}

impl CommandHandler for ClearCommand {
    fn execute(&self, state: &mut ChatState, _args: &[&str]) -> Result<Option<String>, ChatError> {
        state.conversation.clear();
        Ok(Some("Chat history cleared.".to_string()))
    }

    fn help(&self) -> &'static str {
        "/clear - Clear conversation history"
    }
}

impl CommandHandler for ModelCommand {
    fn execute(&self, state: &mut ChatState, args: &[&str]) -> Result<Option<String>, ChatError> {
        match args.first() {
            None => Ok(Some(format!("Current model: {}", state.provider.model()))),
            Some(model) => {
                state.provider.set_model(model);
                Ok(Some(format!("Switched to model: {}", model)))
            }
        }
    }

    fn help(&self) -> &'static str {
        "/model [name] - Show or switch the current model"
    }
}

impl CommandHandler for ToolsCommand {
    fn execute(&self, state: &mut ChatState, _args: &[&str]) -> Result<Option<String>, ChatError> {
        if state.tool_schemas.is_empty() {
            return Ok(Some("No tools registered.".to_string()));
        }
        let lines: Vec<String> = state
            .tool_schemas
            .iter()
            .map(|schema| {
                let summary = schema.description.lines().next().unwrap_or_default();
                format!("{} - {}", style(&schema.name).bold().cyan(), summary)
            })
            .collect();
        Ok(Some(lines.join("\n")))
    }

    fn help(&self) -> &'static str {
        "/tools - List the tools available to the model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::create_command_registry;
    use crate::providers::{ChatRequest, LLMProvider, Message, Role, StreamEvent};
    use crate::tools::ToolSchema;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use serde_json::json;

    #[derive(Clone)]
    struct NamedProvider {
        model: String,
    }

    #[async_trait]
    impl LLMProvider for NamedProvider {
        async fn get_response_stream(
            &self,
            _request: &ChatRequest<'_>,
        ) -> Result<BoxStream<'static, Result<StreamEvent, ChatError>>, ChatError> {
            Err(ChatError::Api("offline".to_string()))
        }

        fn set_model(&mut self, model: &str) {
            self.model = model.to_string();
        }

        fn model(&self) -> &str {
            &self.model
        }
    }

    fn state() -> ChatState {
        ChatState::new(
            Box::new(NamedProvider {
                model: "first".to_string(),
            }),
            "system",
            vec![ToolSchema {
                name: "bash".to_string(),
                description: "Run commands in a bash shell\nMore detail.".to_string(),
                input_schema: json!({"type": "object"}),
            }],
        )
    }

    #[test]
    fn model_command_shows_and_switches() {
        let dispatcher = create_command_registry();
        let mut state = state();

        let shown = dispatcher.execute_line("/model", &mut state).unwrap();
        assert_eq!(shown.as_deref(), Some("Current model: first"));

        dispatcher.execute_line("/model second", &mut state).unwrap();
        assert_eq!(state.provider.model(), "second");
    }

    #[test]
    fn clear_keeps_the_system_prompt() {
        let dispatcher = create_command_registry();
        let mut state = state();
        state.conversation.push_user_text("hi");
        state
            .conversation
            .push(Message::text(Role::Assistant, "hello"));

        dispatcher.execute_line("/clear", &mut state).unwrap();
        assert!(state.conversation.messages().is_empty());
        assert_eq!(state.conversation.system(), "system");
    }

    #[test]
    fn quit_aliases_stop_the_session() {
        let dispatcher = create_command_registry();
        for line in ["/quit", "/exit", "/q"] {
            let mut state = state();
            dispatcher.execute_line(line, &mut state).unwrap();
            assert!(!state.should_continue, "{line} should quit");
        }
    }

    #[test]
    fn tools_lists_first_description_line() {
        let dispatcher = create_command_registry();
        let mut state = state();
        let output = dispatcher.execute_line("/tools", &mut state).unwrap().unwrap();
        assert!(output.contains("Run commands in a bash shell"));
        assert!(!output.contains("More detail."));
    }

    #[test]
    fn unknown_commands_are_input_errors() {
        let dispatcher = create_command_registry();
        let mut state = state();
        assert!(matches!(
            dispatcher.execute_line("/frobnicate", &mut state),
            Err(ChatError::Input(_))
        ));
        assert!(dispatcher.get_command_names().contains(&"exit".to_string()));
    }
}
