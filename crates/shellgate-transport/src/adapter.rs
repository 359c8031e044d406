//! Tool protocol adapter exposing the `shell` capability.

use std::{path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use shellgate_core::{CommandExecutor, SessionId};
use tokio::sync::mpsc;

use crate::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    SUPPORTED_PROTOCOL_VERSIONS, ServerCapabilities, Tool,
};

/// Name of the only capability.
pub const SHELL_TOOL: &str = "shell";

/// Arguments of a `shell` call.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellArguments {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
}

/// Translates protocol requests of one session into executor calls.
pub struct ToolAdapter {
    executor: Arc<dyn CommandExecutor>,
    server_info: Implementation,
}

impl ToolAdapter {
    #[must_use]
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            server_info: Implementation {
                name: "shellgate".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Descriptor of the `shell` capability.
    #[must_use]
    pub fn shell_tool(&self) -> Tool {
        let root = self.executor.sandbox_root();
        let root = root.display();
        Tool {
            name: SHELL_TOOL.to_string(),
            description: format!(
                "Run shell commands with gh CLI authenticated to GitHub.

Available commands:
- gh repo clone <owner/repo> -- clone a repository
- gh issue list/view/create -- manage issues
- gh pr list/view/create -- manage pull requests
- gh project list/view -- view projects
- ls, cat, grep, find, etc. -- inspect cloned code

Workspace: {root} (use this for cloning repos)

Example workflow:
  gh repo clone facebook/react
  cd {root}/react
  ls -la src/
  cat src/index.js"
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute",
                    },
                    "cwd": {
                        "type": "string",
                        "description": format!("Working directory (default: {root})"),
                        "default": root.to_string(),
                    },
                },
                "required": ["command"],
            }),
        }
    }

    #[must_use]
    pub fn list_tools(&self) -> ListToolsResult {
        ListToolsResult {
            tools: vec![self.shell_tool()],
        }
    }

    #[must_use]
    pub fn initialize(&self, params: &InitializeParams) -> InitializeResult {
        let protocol_version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str())
        {
            params.protocol_version.clone()
        } else {
            SUPPORTED_PROTOCOL_VERSIONS[0].to_string()
        };
        if let Some(client) = &params.client_info {
            tracing::info!(client = %client.name, version = %client.version, %protocol_version, "Client initialized");
        }
        InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities::default(),
            server_info: self.server_info.clone(),
        }
    }

    /// Run a tool call. Every failure becomes an `is_error` result.
    pub async fn call_tool(&self, params: CallToolParams) -> CallToolResult {
        if params.name != SHELL_TOOL {
            tracing::warn!(tool = %params.name, "Unknown tool requested");
            return CallToolResult::error(format!("Unknown tool: {}", params.name));
        }

        let args: ShellArguments =
            match serde_json::from_value(params.arguments.unwrap_or(Value::Null)) {
                Ok(args) => args,
                Err(e) => return CallToolResult::error(format!("Invalid arguments: {e}")),
            };
        let cwd = args.cwd.filter(|c| !c.is_empty()).map(PathBuf::from);

        match self.executor.execute(&args.command, cwd).await {
            Ok(result) => CallToolResult::text(result.output),
            Err(e) => CallToolResult::error(format!("Error: {e}")),
        }
    }

    /// Answer one request. Notifications get no response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "Notification received");
            return None;
        };

        let outcome = match request.method.as_str() {
            "initialize" => parse_params::<InitializeParams>(request.params)
                .and_then(|params| to_result(&self.initialize(&params))),
            "ping" => Ok(json!({})),
            "tools/list" => to_result(&self.list_tools()),
            "tools/call" => match parse_params::<CallToolParams>(request.params) {
                Ok(params) => to_result(&self.call_tool(params).await),
                Err(e) => Err(e),
            },
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(Some(id), error),
        })
    }

    /// Serve a session until its inbound queue closes.
    ///
    /// Each request runs on its own task, so a long command does not hold
    /// up other requests. Results for a session that has closed meanwhile
    /// are dropped; the commands themselves are not cancelled.
    pub async fn serve(
        self: Arc<Self>,
        session_id: SessionId,
        mut inbound: mpsc::UnboundedReceiver<JsonRpcMessage>,
        outbound: mpsc::UnboundedSender<JsonRpcResponse>,
    ) {
        while let Some(message) = inbound.recv().await {
            let request = match message {
                JsonRpcMessage::Request(request) => request,
                JsonRpcMessage::Response(response) => {
                    tracing::debug!(%session_id, id = ?response.id, "Ignoring client response");
                    continue;
                }
            };

            let adapter = Arc::clone(&self);
            let outbound = outbound.clone();
            tokio::spawn(async move {
                let method = request.method.clone();
                if let Some(response) = adapter.handle(request).await {
                    if outbound.send(response).is_err() {
                        tracing::debug!(%session_id, %method, "Session closed before response was sent");
                    }
                }
            });
        }
        tracing::debug!(%session_id, "Adapter stopped");
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(JsonRpcError::invalid_params)
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(JsonRpcError::internal)
}
