pub mod bash;
pub mod edit;

use crate::core::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Key under which tool-call arguments that were not a JSON object are kept.
pub const UNPARSED_INPUT_KEY: &str = "unparsed_input";

const CLIPPED_NOTICE: &str = "<response clipped><NOTE>Only part of the output is shown. \
Narrow the command (e.g. with grep, head or tail) to see the rest.</NOTE>";

/// Name, description and parameter shape advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Outcome of a tool call, serialized verbatim as the tool result content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub truncated: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            truncated: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            truncated: false,
        }
    }

    /// Clips `output` to at most `limit` bytes on a char boundary.
    pub fn clipped(mut self, limit: usize) -> Self {
        if self.output.len() > limit {
            let mut cut = limit;
            while !self.output.is_char_boundary(cut) {
                cut -= 1;
            }
            self.output.truncate(cut);
            self.output.push('\n');
            self.output.push_str(CLIPPED_NOTICE);
            self.truncated = true;
        }
        self
    }

    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.output.clone())
    }
}

#[async_trait]
pub trait Tool: Send {
    fn schema(&self) -> &ToolSchema;

    async fn call(
        &mut self,
        args: Value,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError>;
}

/// Registry binding each schema name to exactly one executor.
pub struct ToolSet {
    tools: HashMap<String, Box<dyn Tool>>,
    schemas: Vec<ToolSchema>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            schemas: Vec::new(),
        }
    }

    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        let schema = tool.schema().clone();
        if self.tools.insert(schema.name.clone(), tool).is_some() {
            warn!(tool = %schema.name, "replacing previously registered tool");
            self.schemas.retain(|s| s.name != schema.name);
        }
        self.schemas.push(schema);
    }

    /// Schemas in registration order.
    pub fn schemas(&self) -> &[ToolSchema] {
        &self.schemas
    }

    pub async fn call_tool(
        &mut self,
        name: &str,
        args: Value,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get_mut(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.call(args, cancel).await
    }

    /// Runs a call and folds every recoverable error into a failed result.
    pub async fn dispatch(
        &mut self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        debug!(tool = %call.name, id = %call.id, "dispatching tool call");
        if let Some(raw) = call.input.get(UNPARSED_INPUT_KEY).and_then(Value::as_str) {
            debug!(tool = %call.name, raw, "tool input is not a JSON object");
            return Ok(ToolResult::failure(
                ToolError::InvalidParameter(format!(
                    "tool input is not a valid JSON object: {}",
                    raw
                ))
                .to_string(),
            ));
        }
        match self.call_tool(&call.name, call.input.clone(), cancel).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!(tool = %call.name, error = %e, "tool call failed");
                Ok(ToolResult::failure(e.to_string()))
            }
        }
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        schema: ToolSchema,
        fail_with: Option<ToolError>,
    }

    impl EchoTool {
        fn new(name: &str) -> Self {
            Self {
                schema: ToolSchema {
                    name: name.to_string(),
                    description: "echoes its input".to_string(),
                    input_schema: json!({"type": "object"}),
                },
                fail_with: None,
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> &ToolSchema {
            &self.schema
        }

        async fn call(
            &mut self,
            args: Value,
            _cancel: &CancellationToken,
        ) -> Result<ToolResult, ToolError> {
            match self.fail_with.take() {
                Some(err) => Err(err),
                None => Ok(ToolResult::success(args.to_string())),
            }
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            input: json!({"x": 1}),
        }
    }

    #[tokio::test]
    async fn dispatch_routes_by_exact_name() {
        let mut set = ToolSet::new();
        set.add_tool(Box::new(EchoTool::new("echo")));
        let cancel = CancellationToken::new();

        let result = set.dispatch(&call("echo"), &cancel).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, r#"{"x":1}"#);

        let result = set.dispatch(&call("Echo"), &cancel).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "Unknown tool: Echo");
    }

    #[tokio::test]
    async fn recoverable_errors_become_failed_results() {
        let mut set = ToolSet::new();
        let mut tool = EchoTool::new("broken");
        tool.fail_with = Some(ToolError::NoHistory("/tmp/x".to_string()));
        set.add_tool(Box::new(tool));

        let result = set
            .dispatch(&call("broken"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, ToolResult::failure("No edit history found for /tmp/x."));
    }

    #[tokio::test]
    async fn transport_failures_propagate() {
        let mut set = ToolSet::new();
        let mut tool = EchoTool::new("shell");
        tool.fail_with = Some(ToolError::TransportFailure("cannot spawn".to_string()));
        set.add_tool(Box::new(tool));

        let err = set
            .dispatch(&call("shell"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn unparsed_input_is_rejected_before_the_tool_runs() {
        let mut set = ToolSet::new();
        set.add_tool(Box::new(EchoTool::new("echo")));
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "echo".to_string(),
            input: json!({UNPARSED_INPUT_KEY: "{\"x\": "}),
        };

        let result = set.dispatch(&call, &CancellationToken::new()).await.unwrap();
        assert!(!result.success);
        assert_eq!(
            result.output,
            "Invalid parameter: tool input is not a valid JSON object: {\"x\": "
        );
    }

    #[test]
    fn schemas_keep_registration_order_and_replace_duplicates() {
        let mut set = ToolSet::new();
        set.add_tool(Box::new(EchoTool::new("b")));
        set.add_tool(Box::new(EchoTool::new("a")));
        set.add_tool(Box::new(EchoTool::new("b")));
        let names: Vec<_> = set.schemas().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn clipping_respects_char_boundaries() {
        let result = ToolResult::success("héllo").clipped(2);
        assert!(result.truncated);
        assert!(result.output.starts_with("h\n<response clipped>"));

        let result = ToolResult::success("short").clipped(16);
        assert!(!result.truncated);
        assert_eq!(result.output, "short");
    }

    #[test]
    fn wire_shape_has_three_fields() {
        let wire: Value = serde_json::from_str(&ToolResult::failure("nope").to_wire()).unwrap();
        assert_eq!(
            wire,
            json!({"success": false, "output": "nope", "truncated": false})
        );
    }
}
