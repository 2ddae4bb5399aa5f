use crate::core::conversation::TurnObserver;
use crate::providers::Usage;
use crate::tools::{ToolCall, ToolResult};
use console::style;
use serde_json::Value;
use std::io::{self, Write};

/// Lines of tool output echoed to the terminal before eliding the rest.
const PREVIEW_LINES: usize = 12;

fn box_width() -> usize {
    let terminal_width = console::Term::stdout().size().1 as usize;
    std::cmp::min(terminal_width.saturating_sub(4), 100).max(50)
}

/// Cuts `line` to at most `max` chars.
fn fit(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let mut cut: String = line.chars().take(max.saturating_sub(3)).collect();
        cut.push_str("...");
        cut
    }
}

/// One-line summary of the arguments the model passed to a tool.
fn describe_call(call: &ToolCall) -> String {
    match (&call.input["command"], &call.input["path"]) {
        (Value::String(command), Value::String(path)) => format!("{} {}", command, path),
        (Value::String(command), _) => command.clone(),
        _ if call.input["restart"] == Value::Bool(true) => "restart".to_string(),
        _ => call.input.to_string(),
    }
}

pub fn display_tool_call(call: &ToolCall) {
    let width = box_width();
    let header = format!("┌─ {} ", call.name);
    let header = header.clone() + &"─".repeat(width.saturating_sub(header.chars().count() + 1)) + "┐";

    println!("\n{}", style(&header).dim().green());
    for (i, line) in describe_call(call).lines().enumerate() {
        let prompt = if i == 0 { "$ " } else { "  " };
        let line = fit(line, width.saturating_sub(6));
        let padding = width.saturating_sub(prompt.len() + line.chars().count() + 3);
        println!(
            "│ {}{}{}│",
            style(prompt).bold().green(),
            style(&line).bold().white(),
            " ".repeat(padding)
        );
    }
    println!(
        "{}",
        style("└".to_string() + &"─".repeat(width.saturating_sub(2)) + "┘")
            .dim()
            .green()
    );
}

pub fn display_tool_result(result: &ToolResult) {
    let lines: Vec<&str> = result.output.lines().collect();
    for line in lines.iter().take(PREVIEW_LINES) {
        println!("  {}", style(line).dim());
    }
    if lines.len() > PREVIEW_LINES {
        println!(
            "  {}",
            style(format!("... {} more lines", lines.len() - PREVIEW_LINES))
                .dim()
                .italic()
        );
    }

    let status = if result.success {
        style("✅ ok").bold().green()
    } else {
        style("❌ failed").bold().red()
    };
    if result.truncated {
        println!("{} {}", status, style("(output clipped)").yellow());
    } else {
        println!("{}", status);
    }
}

fn describe_usage(usage: &Usage) -> String {
    let mut line = format!("tokens: {} in", usage.input_tokens);
    if usage.cache_creation_input_tokens > 0 || usage.cache_read_input_tokens > 0 {
        line.push_str(&format!(
            " (cache: {} written, {} read)",
            usage.cache_creation_input_tokens, usage.cache_read_input_tokens
        ));
    }
    line.push_str(&format!(", {} out", usage.output_tokens));
    line
}

pub fn display_error(message: &str) {
    eprintln!("{} {}", style("Error:").bold().red(), message);
}

pub fn display_notice(message: &str) {
    println!("{} {}", style("!").bold().yellow(), style(message).yellow());
}

pub fn display_welcome(provider: &str, model: &str) {
    println!(
        "{} {}",
        style("toolchat").bold().magenta(),
        style(format!("({} / {})", provider, model)).dim()
    );
    println!(
        "Type '/help' for available commands. Press Ctrl+D or type /quit to exit. \
Ctrl+C interrupts a running turn."
    );
}

/// Streams model text straight to stdout and frames tool activity.
#[derive(Default)]
pub struct ConsoleObserver {
    mid_line: bool,
    usage: Usage,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ends a partially printed line of model text.
    pub fn finish(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }

    /// Prints the turn's token counts to stderr, if the API reported any.
    pub fn report_usage(&self) {
        if !self.usage.is_empty() {
            eprintln!("{}", style(describe_usage(&self.usage)).dim());
        }
    }
}

impl TurnObserver for ConsoleObserver {
    fn on_text(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        print!("{}", chunk);
        let _ = io::stdout().flush();
        self.mid_line = !chunk.ends_with('\n');
    }

    fn on_tool_call(&mut self, call: &ToolCall) {
        self.finish();
        display_tool_call(call);
    }

    fn on_tool_result(&mut self, _call: &ToolCall, result: &ToolResult) {
        display_tool_result(result);
    }

    fn on_usage(&mut self, usage: &Usage) {
        self.usage.add(usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(input: Value) -> ToolCall {
        ToolCall {
            id: "1".to_string(),
            name: "tool".to_string(),
            input,
        }
    }

    #[test]
    fn calls_are_summarised_by_command_and_path() {
        assert_eq!(
            describe_call(&call(json!({"command": "view", "path": "src/main.rs"}))),
            "view src/main.rs"
        );
        assert_eq!(describe_call(&call(json!({"command": "ls -la"}))), "ls -la");
        assert_eq!(describe_call(&call(json!({"restart": true}))), "restart");
        assert_eq!(describe_call(&call(json!({"x": 1}))), r#"{"x":1}"#);
    }

    #[test]
    fn usage_line_mentions_cache_only_when_used() {
        let mut usage = Usage {
            input_tokens: 12,
            output_tokens: 80,
            ..Default::default()
        };
        assert_eq!(describe_usage(&usage), "tokens: 12 in, 80 out");

        usage.cache_read_input_tokens = 2048;
        assert_eq!(
            describe_usage(&usage),
            "tokens: 12 in (cache: 0 written, 2048 read), 80 out"
        );
    }

    #[test]
    fn long_lines_are_cut_on_char_boundaries() {
        assert_eq!(fit("short", 10), "short");
        assert_eq!(fit("ééééééééééé", 6), "ééé...");
    }
}
