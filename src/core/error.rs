use std::io;
use thiserror::Error;

/// Application-level error for toolchat
#[derive(Error, Debug)]
pub enum ChatError {
    /// The model API could not be reached, or a shell could not be spawned at all
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The API answered with an error payload
    #[error("API error: {0}")]
    Api(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// User input errors
    #[error("Input error: {0}")]
    Input(String),

    /// IO-related errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The model kept asking for tools past the per-turn cap
    #[error("Stopped after {0} consecutive tool rounds; send another message to continue")]
    IterationLimit(usize),

    /// The user interrupted the turn
    #[error("Turn cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Transport(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ChatError::Transport(format!("Connection failed: {}", err))
        } else if err.is_status() {
            ChatError::Api(format!("API returned error status: {}", err))
        } else {
            ChatError::Transport(format!("Request failed: {}", err))
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yml::Error> for ChatError {
    fn from(err: serde_yml::Error) -> Self {
        ChatError::Serialization(format!("YAML error: {}", err))
    }
}

impl From<ToolError> for ChatError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Cancelled => ChatError::Cancelled,
            other => ChatError::Transport(other.to_string()),
        }
    }
}

/// Errors raised while executing a tool call.
///
/// Everything except [`ToolError::TransportFailure`] is recovered by the
/// conversation loop and handed back to the model as a failed tool result.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("File already exists at: {0}. Cannot overwrite files using command `create`.")]
    AlreadyExists(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Ambiguous(String),

    #[error("{0}")]
    OutOfRange(String),

    #[error("No edit history found for {0}.")]
    NoHistory(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Command timed out after {0} seconds; the shell was terminated and the next command starts a fresh session")]
    Timeout(u64),

    #[error("The shell exited{0}; the next command starts a fresh session")]
    ShellExited(String),

    #[error("Cancelled by user")]
    Cancelled,

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("Transport failure: {0}")]
    TransportFailure(String),
}

impl ToolError {
    /// Whether this error must end the turn instead of being reported to the model.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::TransportFailure(_))
    }
}
