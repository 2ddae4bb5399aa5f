use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Question to answer in one shot; starts an interactive chat when omitted
    pub query: Option<String>,

    /// AI provider to use [possible values: anthropic, openai, openrouter, deepseek]
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model to use (provider-specific)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Maximum tool rounds per turn before control returns to you
    #[arg(long)]
    pub max_tool_iterations: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_and_flags_parse() {
        let args = Args::parse_from(["toolchat", "-p", "openai", "-m", "gpt-4.1", "what is here?"]);
        assert_eq!(args.query.as_deref(), Some("what is here?"));
        assert_eq!(args.provider.as_deref(), Some("openai"));
        assert_eq!(args.model.as_deref(), Some("gpt-4.1"));
        assert_eq!(args.max_tool_iterations, None);
    }

    #[test]
    fn no_query_means_interactive() {
        let args = Args::parse_from(["toolchat", "--max-tool-iterations", "5"]);
        assert!(args.query.is_none());
        assert_eq!(args.max_tool_iterations, Some(5));
    }
}
