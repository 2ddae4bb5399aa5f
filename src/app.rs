use crate::cli::Args;
use crate::commands::{ChatState, dispatcher::CommandDispatcher};
use crate::config::Config;
use crate::core::conversation::{ConversationLoop, TurnOutcome};
use crate::core::error::ChatError;
use crate::display::{self, ConsoleObserver};
use crate::input;
use crate::providers::LLMProvider;
use crate::system::SystemInfo;
use crate::tools::ToolSet;
use crate::tools::bash::{BashTool, ShellSession};
use crate::tools::edit::{EditTool, FileEditor};
use is_terminal::IsTerminal;
use std::io::{self, Read};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Registers the shell and file-editor tools configured for this host.
pub fn build_tool_set(config: &Config, system_info: &SystemInfo) -> ToolSet {
    let shell_path = config
        .tools
        .shell_path
        .clone()
        .unwrap_or_else(|| system_info.shell_path.clone());
    let session = ShellSession::new(
        shell_path,
        Duration::from_secs(config.tools.shell_timeout_secs),
        config.tools.max_output_bytes,
    );

    let mut tools = ToolSet::new();
    tools.add_tool(Box::new(BashTool::new(session)));
    tools.add_tool(Box::new(EditTool::new(
        FileEditor::new(system_info.working_dir.clone()),
        config.tools.max_output_bytes,
    )));
    tools
}

/// Combines piped stdin with the query argument.
fn compose_query(query: Option<&str>, context: Option<&str>) -> Option<String> {
    match (query, context) {
        (Some(q), Some(ctx)) => Some(format!("<pipe>{}</pipe>\n\n{}", ctx, q)),
        (None, Some(ctx)) => Some(format!("<pipe>{}</pipe>", ctx)),
        (Some(q), None) => Some(q.to_string()),
        (None, None) => None,
    }
}

pub struct Application {
    pub args: Args,
    pub config: Config,
    pub provider_name: String,
    pub state: ChatState,
    pub tools: ToolSet,
    pub command_dispatcher: CommandDispatcher,
}

impl Application {
    pub fn new(
        args: Args,
        config: Config,
        provider_name: &str,
        provider: Box<dyn LLMProvider>,
        system_info: &SystemInfo,
        command_dispatcher: CommandDispatcher,
    ) -> Self {
        let tools = build_tool_set(&config, system_info);
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| system_info.system_prompt());
        let state = ChatState::new(provider, &system_prompt, tools.schemas().to_vec());
        Self {
            args,
            config,
            provider_name: provider_name.to_string(),
            state,
            tools,
            command_dispatcher,
        }
    }

    pub async fn run(&mut self) -> Result<(), ChatError> {
        let context = if !io::stdin().is_terminal() {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| ChatError::Input(format!("Failed to read from stdin: {}", e)))?;
            Some(buffer).filter(|b| !b.trim().is_empty())
        } else {
            None
        };

        match compose_query(self.args.query.as_deref(), context.as_deref()) {
            Some(query) => self.handle_one_shot(&query).await,
            None => self.handle_continuous_chat_mode().await,
        }
    }

    fn max_tool_iterations(&self) -> usize {
        self.args
            .max_tool_iterations
            .unwrap_or(self.config.tools.max_tool_iterations)
    }

    /// Runs one user turn. Ctrl-C while it runs cancels the turn only.
    async fn run_turn(&mut self, input: &str) -> Result<TurnOutcome, ChatError> {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    debug!("interrupt received, cancelling turn");
                    cancel.cancel();
                }
            })
        };

        let max_iterations = self.max_tool_iterations();
        let mut observer = ConsoleObserver::new();
        let result = ConversationLoop::new(self.state.provider.as_ref(), &mut self.tools, max_iterations)
            .run_turn(&mut self.state.conversation, input, &mut observer, &cancel)
            .await;

        watcher.abort();
        observer.finish();
        observer.report_usage();
        result
    }

    async fn handle_one_shot(&mut self, query: &str) -> Result<(), ChatError> {
        let outcome = self.run_turn(query).await?;
        info!(tool_rounds = outcome.tool_rounds, "one-shot query answered");
        Ok(())
    }

    async fn handle_continuous_chat_mode(&mut self) -> Result<(), ChatError> {
        display::display_welcome(&self.provider_name, self.state.provider.model());
        let mut editor = input::create_editor(self.command_dispatcher.clone())?;

        loop {
            let input = match input::read_input(&mut editor)? {
                Some(input) => input.trim().to_string(),
                None => break,
            };

            if input.is_empty() {
                continue;
            }

            if input.starts_with('/') {
                match self.command_dispatcher.execute_line(&input, &mut self.state) {
                    Ok(Some(output)) => println!("{}", output),
                    Ok(None) => {}
                    Err(e) => display::display_error(&e.to_string()),
                }
                if !self.state.should_continue {
                    break;
                }
                continue;
            }

            match self.run_turn(&input).await {
                Ok(_) => {}
                Err(e @ (ChatError::IterationLimit(_) | ChatError::Cancelled)) => {
                    display::display_notice(&e.to_string())
                }
                Err(e) => display::display_error(&e.to_string()),
            }
        }

        input::save_history(&mut editor)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn piped_context_wraps_the_query() {
        assert_eq!(
            compose_query(Some("explain"), Some("log line")).as_deref(),
            Some("<pipe>log line</pipe>\n\nexplain")
        );
        assert_eq!(
            compose_query(None, Some("data")).as_deref(),
            Some("<pipe>data</pipe>")
        );
        assert_eq!(compose_query(Some("hi"), None).as_deref(), Some("hi"));
        assert_eq!(compose_query(None, None), None);
    }

    #[test]
    fn tool_set_exposes_bash_and_editor() {
        let dir = TempDir::new().unwrap();
        let info = SystemInfo {
            os_info: "test".to_string(),
            shell_path: PathBuf::from("/bin/sh"),
            working_dir: dir.path().to_path_buf(),
        };
        let tools = build_tool_set(&Config::default(), &info);
        let names: Vec<&str> = tools.schemas().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["bash", "str_replace_editor"]);
    }
}
