use crate::commands::dispatcher::CommandDispatcher;
use crate::config::Config as AppConfig;
use crate::core::error::ChatError;

use console::style;
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::{Highlighter, MatchingBracketHighlighter};
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::history::FileHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Config, Context, EditMode, Editor, Helper};
use std::borrow::Cow;
use tracing::debug;

pub type ChatEditor = Editor<ChatHelper, FileHistory>;

/// Candidates for a `/command` prefix; `None` once the cursor has left the
/// command word.
fn complete_command(names: &[String], line: &str, pos: usize) -> Option<Vec<String>> {
    let typed = line.get(..pos)?.strip_prefix('/')?;
    if typed.contains(char::is_whitespace) {
        return None;
    }
    let matches: Vec<String> = names
        .iter()
        .filter(|name| name.starts_with(typed))
        .cloned()
        .collect();
    (!matches.is_empty()).then_some(matches)
}

/// Line-editor helper: slash-command and filename completion, history hints
/// and bracket highlighting.
pub struct ChatHelper {
    commands: CommandDispatcher,
    filenames: FilenameCompleter,
    brackets: MatchingBracketHighlighter,
    history_hinter: HistoryHinter,
}

impl ChatHelper {
    pub fn new(commands: CommandDispatcher) -> Self {
        Self {
            commands,
            filenames: FilenameCompleter::new(),
            brackets: MatchingBracketHighlighter::new(),
            history_hinter: HistoryHinter::new(),
        }
    }
}

impl Helper for ChatHelper {}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        if let Some(matches) = complete_command(&self.commands.get_command_names(), line, pos) {
            let pairs = matches
                .into_iter()
                .map(|name| Pair {
                    display: name.clone(),
                    replacement: name,
                })
                .collect();
            // Replacement starts right after the '/'.
            return Ok((1, pairs));
        }
        self.filenames.complete(line, pos, ctx)
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        self.history_hinter.hint(line, pos, ctx)
    }
}

impl Highlighter for ChatHelper {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        self.brackets.highlight(line, pos)
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(style(hint).dim().to_string())
    }
}

impl Validator for ChatHelper {}

/// Creates a configured rustyline editor with persisted history loaded.
pub fn create_editor(commands: CommandDispatcher) -> Result<ChatEditor, ChatError> {
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(false)
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();

    let mut editor = Editor::with_config(config)
        .map_err(|e| ChatError::Input(format!("Failed to create line editor: {}", e)))?;
    editor.set_helper(Some(ChatHelper::new(commands)));

    let history_path = AppConfig::input_history_path();
    if let Err(e) = editor.load_history(&history_path) {
        debug!(path = %history_path.display(), error = %e, "no input history loaded");
    }

    Ok(editor)
}

/// Reads one line. `None` means the user asked to leave (Ctrl-C or Ctrl-D).
pub fn read_input(editor: &mut ChatEditor) -> Result<Option<String>, ChatError> {
    let prompt = style("> ").bold().cyan().to_string();
    match editor.readline(&prompt) {
        Ok(line) => {
            if !line.trim().is_empty() {
                editor
                    .add_history_entry(line.as_str())
                    .map_err(|e| ChatError::Input(format!("Failed to add history entry: {}", e)))?;
            }
            Ok(Some(line))
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
            println!("Exiting...");
            Ok(None)
        }
        Err(err) => Err(ChatError::Input(format!("Input error: {}", err))),
    }
}

pub fn save_history(editor: &mut ChatEditor) -> Result<(), ChatError> {
    let history_path = AppConfig::input_history_path();
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    editor
        .save_history(&history_path)
        .map_err(|e| ChatError::Input(format!("Failed to save history: {}", e)))
}
