//! MCP server exposing the `turn` tool over stdio.
//!
//! JSON-RPC 2.0, one message per line. `tools/call` runs in its own task so
//! the reader keeps answering `ping` while the agent is blocked in a wait.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
    task::JoinSet,
};

use crate::{
    bridge::AgentBridge,
    error::BridgeError,
    mailbox::Mailbox,
    types::StatusRecord,
};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "turn-mcp";
pub const TOOL_NAME: &str = "turn";

const PARSE_ERROR: i32 = -32700;
const INVALID_PARAMS: i32 = -32602;
const METHOD_NOT_FOUND: i32 = -32601;
const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    fn text(text: String) -> Self {
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: false,
        }
    }

    fn error(text: String) -> Self {
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct TurnArguments {
    #[serde(default)]
    context: String,
    #[serde(default)]
    question: Option<String>,
}

pub fn turn_tool_definition() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": "Pause and wait for the user's next instruction. The call blocks until the user \
            replies from the editor panel, which lets a single request carry many conversational \
            turns. Call it whenever you finish a step or need confirmation.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "context": {
                    "type": "string",
                    "description": "Short summary of the work done so far, shown to the user",
                },
                "question": {
                    "type": "string",
                    "description": "Optional question asking the user what to do next",
                },
            },
            "required": ["context"],
            "additionalProperties": false,
        },
    })
}

pub struct McpServer<M> {
    bridge: Arc<AgentBridge<M>>,
}

impl<M: Mailbox + 'static> McpServer<M> {
    pub fn new(bridge: AgentBridge<M>) -> Self {
        Self {
            bridge: Arc::new(bridge),
        }
    }

    /// Answer one request. Notifications (no id) yield `None`.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id?;
        let response = match request.method.as_str() {
            "initialize" => {
                let requested = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(Value::as_str)
                    .unwrap_or(PROTOCOL_VERSION);
                JsonRpcResponse::ok(
                    id,
                    json!({
                        "protocolVersion": requested,
                        "capabilities": { "tools": {} },
                        "serverInfo": {
                            "name": SERVER_NAME,
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    }),
                )
            }
            "ping" => JsonRpcResponse::ok(id, json!({})),
            "tools/list" => JsonRpcResponse::ok(id, json!({ "tools": [turn_tool_definition()] })),
            "tools/call" => {
                let params = match request
                    .params
                    .map(serde_json::from_value::<CallToolParams>)
                {
                    Some(Ok(params)) => params,
                    Some(Err(error)) => {
                        return Some(JsonRpcResponse::err(
                            id,
                            INVALID_PARAMS,
                            format!("invalid tools/call params: {error}"),
                        ))
                    }
                    None => {
                        return Some(JsonRpcResponse::err(
                            id,
                            INVALID_PARAMS,
                            "missing tools/call params",
                        ))
                    }
                };
                let result = self.call_tool(params).await;
                match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::ok(id, value),
                    Err(error) => JsonRpcResponse::err(id, INTERNAL_ERROR, error.to_string()),
                }
            }
            other => JsonRpcResponse::err(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
        };
        Some(response)
    }

    async fn call_tool(&self, params: CallToolParams) -> CallToolResult {
        if params.name != TOOL_NAME {
            return CallToolResult::error(format!("unknown tool: {}", params.name));
        }
        let args = match params
            .arguments
            .map(serde_json::from_value::<TurnArguments>)
            .transpose()
        {
            Ok(args) => args.unwrap_or_default(),
            Err(error) => return CallToolResult::error(format!("invalid arguments: {error}")),
        };

        match self
            .bridge
            .pause_and_wait(&args.context, args.question.as_deref())
            .await
        {
            Ok(text) => CallToolResult::text(text),
            Err(BridgeError::EmptyContext) => {
                CallToolResult::error("`context` is required and must not be empty".to_string())
            }
            Err(error) => {
                tracing::error!(target = "turn_mcp::mcp", error = %error, "turn call failed");
                CallToolResult::error(format!("turn failed: {error}"))
            }
        }
    }

    /// Serve until `reader` reaches EOF or fails. Either way, waits still in
    /// flight are abandoned and the waiting status is withdrawn before the
    /// read error (if any) is returned.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, mut out_rx) = mpsc::channel::<JsonRpcResponse>(64);
        let writer_task = tokio::spawn(async move {
            while let Some(response) = out_rx.recv().await {
                let mut line = serde_json::to_vec(&response)?;
                line.push(b'\n');
                writer.write_all(&line).await?;
                writer.flush().await?;
            }
            anyhow::Ok(())
        });

        let mut calls = JoinSet::new();
        let mut lines = BufReader::new(reader).lines();
        let read_result = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(error) => break Err(anyhow::Error::new(error).context("failed reading stdin")),
            };
            if line.trim().is_empty() {
                continue;
            }
            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(error) => {
                    tracing::warn!(target = "turn_mcp::mcp", error = %error, "invalid JSON-RPC frame");
                    let _ = out_tx
                        .send(JsonRpcResponse::err(
                            Value::Null,
                            PARSE_ERROR,
                            format!("parse error: {error}"),
                        ))
                        .await;
                    continue;
                }
            };

            if request.method == "tools/call" {
                let server = self.clone();
                let tx = out_tx.clone();
                calls.spawn(async move {
                    if let Some(response) = server.handle(request).await {
                        let _ = tx.send(response).await;
                    }
                });
            } else if let Some(response) = self.handle(request).await {
                let _ = out_tx.send(response).await;
            }

            while calls.try_join_next().is_some() {}
        };

        if !calls.is_empty() {
            calls.abort_all();
            while calls.join_next().await.is_some() {}
            if let Err(error) = self
                .bridge
                .mailbox()
                .write_status(&StatusRecord::finished())
            {
                tracing::warn!(target = "turn_mcp::mcp", error = %error, "failed to withdraw waiting status");
            }
            tracing::info!(target = "turn_mcp::mcp", "client disconnected during wait");
        }

        drop(out_tx);
        writer_task.await.context("stdout writer panicked")??;
        read_result
    }
}

/// Run the MCP server on the process's stdin/stdout.
pub async fn run_stdio<M: Mailbox + 'static>(bridge: AgentBridge<M>) -> Result<()> {
    tracing::info!(target = "turn_mcp::mcp", "MCP server started");
    Arc::new(McpServer::new(bridge))
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
}
