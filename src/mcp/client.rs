//! Connection lifecycle to the MCP tool host.
//!
//! `connect` performs the initialize handshake and caches the tool catalog;
//! `invoke` answers every failure as a tagged outcome so plan execution can
//! always continue; `disconnect` drops the session and is safe to repeat.

use std::time::Duration;

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, Implementation,
    InitializeRequestParams, InitializeResult, ListToolsResult, PaginatedRequestParams, RequestId,
    Tool, LATEST_PROTOCOL_VERSION,
};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::mcp::catalog::ToolCatalog;
use crate::mcp::transport::{
    apply_post_headers, apply_protocol_version_header, build_http_client,
    is_event_stream_content_type, next_sse_server_message, MCP_SESSION_ID_HEADER,
};
use crate::mcp::{
    is_method_not_found, parse_call_tool, parse_initialize_result, parse_list_tools,
};

const MCP_MAX_TOOL_LIST: usize = 100;
const HANDSHAKE_TIMEOUT_SECONDS: u64 = 30;
const INVOKE_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConnectError {
    /// Handshake failed or timed out before a session was established.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The server rejected the credential.
    #[error("authentication rejected: {0}")]
    Auth(String),
}

/// What a successful connect reports back to the UI.
#[derive(Debug, Clone)]
pub struct ConnectSummary {
    pub server_name: String,
    pub server_version: String,
    pub protocol_version: String,
    pub tool_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeFailureKind {
    /// The operation is not in the cached catalog. Answered locally.
    UnknownOperation,
    /// Network failure, timeout, or a remote-reported error.
    Remote,
}

/// Outcome of invoking a named remote operation. Failures are data, never
/// errors that unwind the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeOutcome {
    Success(Value),
    Failure {
        kind: InvokeFailureKind,
        message: String,
    },
}

impl InvokeOutcome {
    pub fn failure(kind: InvokeFailureKind, message: impl Into<String>) -> Self {
        InvokeOutcome::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, InvokeOutcome::Failure { .. })
    }
}

/// The seam plan execution runs against. Implemented by [`McpClient`] and
/// by scripted fakes in turn-loop tests.
#[async_trait]
pub trait ToolRunner: Send {
    /// Prompt text for the current catalog; empty while disconnected.
    fn catalog_text(&self) -> String;

    async fn invoke(
        &mut self,
        operation: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> InvokeOutcome;
}

enum SendFailure {
    Status(reqwest::StatusCode),
    Other(String),
}

impl SendFailure {
    fn into_message(self) -> String {
        match self {
            SendFailure::Status(status) => format!("HTTP error: {status}"),
            SendFailure::Other(message) => message,
        }
    }
}

fn classify_connect_failure(failure: SendFailure) -> ConnectError {
    match failure {
        SendFailure::Status(status)
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN =>
        {
            ConnectError::Auth(format!("HTTP {status}"))
        }
        other => ConnectError::Connection(other.into_message()),
    }
}

pub struct McpClient {
    base_url: String,
    api_key: Option<String>,
    http_client: Option<reqwest::Client>,
    session_id: Option<String>,
    negotiated_protocol_version: Option<String>,
    request_id: i64,
    catalog: Option<ToolCatalog>,
    server_summary: Option<ConnectSummary>,
}

impl McpClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        McpClient {
            base_url,
            api_key,
            http_client: None,
            session_id: None,
            negotiated_protocol_version: None,
            request_id: 0,
            catalog: None,
            server_summary: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    /// Point the client at a different host. Drops any live session.
    pub fn set_endpoint(&mut self, base_url: String) {
        self.disconnect();
        self.base_url = base_url;
    }

    pub fn is_connected(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn catalog(&self) -> Option<&ToolCatalog> {
        self.catalog.as_ref()
    }

    pub fn server_summary(&self) -> Option<&ConnectSummary> {
        self.server_summary.as_ref()
    }

    /// Establish a session and fetch the tool catalog. Any prior session is
    /// dropped first; on failure the client is left disconnected.
    pub async fn connect(&mut self) -> Result<ConnectSummary, ConnectError> {
        self.reset();
        match self.establish().await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    /// Release the session. Idempotent; safe when never connected.
    pub fn disconnect(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.http_client = None;
        self.session_id = None;
        self.negotiated_protocol_version = None;
        self.request_id = 0;
        self.catalog = None;
        self.server_summary = None;
    }

    async fn establish(&mut self) -> Result<ConnectSummary, ConnectError> {
        let client = build_http_client().map_err(ConnectError::Connection)?;
        self.http_client = Some(client);

        let initialize = match tokio::time::timeout(
            Duration::from_secs(HANDSHAKE_TIMEOUT_SECONDS),
            self.initialize_session(),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConnectError::Connection(format!(
                    "handshake timed out after {HANDSHAKE_TIMEOUT_SECONDS}s"
                )))
            }
        };

        let tools = self
            .fetch_all_tools()
            .await
            .map_err(classify_connect_failure)?;
        let catalog = ToolCatalog::new(tools);

        let summary = ConnectSummary {
            server_name: initialize.server_info.name.clone(),
            server_version: initialize.server_info.version.clone(),
            protocol_version: initialize.protocol_version.clone(),
            tool_count: catalog.len(),
        };
        debug!(
            server = %summary.server_name,
            tools = summary.tool_count,
            "connected to tool host"
        );

        self.catalog = Some(catalog);
        self.server_summary = Some(summary.clone());
        Ok(summary)
    }

    async fn initialize_session(&mut self) -> Result<InitializeResult, ConnectError> {
        let details = self.client_details();
        let response = self
            .send_request(RequestFromClient::InitializeRequest(details))
            .await
            .map_err(classify_connect_failure)?;
        let initialize = parse_initialize_result(response).map_err(ConnectError::Connection)?;
        self.negotiated_protocol_version = Some(initialize.protocol_version.clone());

        if self.session_id.is_none() {
            return Err(ConnectError::Connection(
                "Missing session id on initialize response.".to_string(),
            ));
        }

        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await
            .map_err(classify_connect_failure)?;
        Ok(initialize)
    }

    fn client_details(&self) -> InitializeRequestParams {
        InitializeRequestParams {
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "dray".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Dray Dispatch Agent".to_string()),
                description: Some("Terminal dispatch agent for delivery fleets".to_string()),
                icons: Vec::new(),
                website_url: None,
            },
            meta: None,
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
        }
    }

    async fn fetch_all_tools(&mut self) -> Result<Vec<Tool>, SendFailure> {
        let Some(mut list) = self.fetch_tools_page(None).await? else {
            return Ok(Vec::new());
        };
        let mut tools = std::mem::take(&mut list.tools);
        let mut next_cursor = list.next_cursor.take();

        if tools.len() >= MCP_MAX_TOOL_LIST {
            tools.truncate(MCP_MAX_TOOL_LIST);
            return Ok(tools);
        }

        while let Some(cursor) = next_cursor {
            match self.fetch_tools_page(Some(cursor)).await? {
                Some(next_list) => {
                    tools.extend(next_list.tools);
                    next_cursor = next_list.next_cursor;
                    if tools.len() >= MCP_MAX_TOOL_LIST {
                        tools.truncate(MCP_MAX_TOOL_LIST);
                        break;
                    }
                }
                None => break,
            }
        }

        Ok(tools)
    }

    async fn fetch_tools_page(
        &mut self,
        cursor: Option<String>,
    ) -> Result<Option<ListToolsResult>, SendFailure> {
        let params = cursor.map(|cursor| PaginatedRequestParams {
            cursor: Some(cursor),
            meta: None,
        });
        let response = self
            .send_request(RequestFromClient::ListToolsRequest(params))
            .await?;
        if is_method_not_found(&response) {
            return Ok(None);
        }
        parse_list_tools(response)
            .map(Some)
            .map_err(SendFailure::Other)
    }

    /// Invoke a named remote operation with the given arguments. Unknown
    /// names are refused from the cached catalog without a round trip; every
    /// other failure mode is folded into the returned outcome.
    pub async fn invoke(
        &mut self,
        operation: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> InvokeOutcome {
        let Some(catalog) = &self.catalog else {
            return InvokeOutcome::failure(
                InvokeFailureKind::Remote,
                "not connected to a tool server",
            );
        };
        if !catalog.contains(operation) {
            return InvokeOutcome::failure(
                InvokeFailureKind::UnknownOperation,
                format!("unknown operation '{operation}'"),
            );
        }

        let mut params = CallToolRequestParams::new(operation);
        if !arguments.is_empty() {
            params = params.with_arguments(arguments);
        }

        debug!(operation = %operation, "invoking remote operation");
        let send = self.send_request(RequestFromClient::CallToolRequest(params));
        let response =
            match tokio::time::timeout(Duration::from_secs(INVOKE_TIMEOUT_SECONDS), send).await {
                Ok(Ok(response)) => response,
                Ok(Err(failure)) => {
                    return InvokeOutcome::failure(
                        InvokeFailureKind::Remote,
                        failure.into_message(),
                    )
                }
                Err(_) => {
                    return InvokeOutcome::failure(
                        InvokeFailureKind::Remote,
                        format!("timed out after {INVOKE_TIMEOUT_SECONDS}s"),
                    )
                }
            };

        match parse_call_tool(response) {
            Ok(result) => interpret_call_result(&result),
            Err(err) => InvokeOutcome::failure(InvokeFailureKind::Remote, err),
        }
    }

    async fn send_request(
        &mut self,
        request: RequestFromClient,
    ) -> Result<ServerMessage, SendFailure> {
        self.request_id += 1;
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(RequestId::Integer(self.request_id)),
        )
        .map_err(|err| SendFailure::Other(err.to_string()))?;
        self.send_message(message).await
    }

    async fn send_notification(
        &mut self,
        notification: NotificationFromClient,
    ) -> Result<(), SendFailure> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| SendFailure::Other(err.to_string()))?;
        self.post_notification(message).await
    }

    async fn send_message(&mut self, message: ClientMessage) -> Result<ServerMessage, SendFailure> {
        let response = self.post_message(message).await?;

        let session_id = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        let server_message = if is_event_stream_content_type(&content_type) {
            next_sse_server_message(response)
                .await
                .map_err(SendFailure::Other)?
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|err| SendFailure::Other(err.to_string()))?;
            serde_json::from_slice::<ServerMessage>(&body)
                .map_err(|err| SendFailure::Other(err.to_string()))?
        };

        if let Some(session_id) = session_id {
            self.session_id = Some(session_id);
        }
        Ok(server_message)
    }

    async fn post_notification(&mut self, message: ClientMessage) -> Result<(), SendFailure> {
        let response = self.post_message(message).await?;
        if let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            self.session_id = Some(session_id.to_string());
        }
        Ok(())
    }

    async fn post_message(
        &mut self,
        message: ClientMessage,
    ) -> Result<reqwest::Response, SendFailure> {
        let payload =
            serde_json::to_string(&message).map_err(|err| SendFailure::Other(err.to_string()))?;
        let client = self
            .http_client
            .as_ref()
            .ok_or_else(|| SendFailure::Other("not connected to a tool server".to_string()))?;

        debug!(url = %self.base_url, "sending MCP request");
        let mut request = apply_protocol_version_header(
            apply_post_headers(client.post(&self.base_url)),
            self.negotiated_protocol_version.as_deref(),
        )
        .body(payload);

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(session_id) = &self.session_id {
            request = request.header(MCP_SESSION_ID_HEADER, session_id);
        }

        let response = request
            .send()
            .await
            .map_err(|err| SendFailure::Other(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SendFailure::Status(response.status()));
        }
        Ok(response)
    }
}

#[async_trait]
impl ToolRunner for McpClient {
    fn catalog_text(&self) -> String {
        self.catalog
            .as_ref()
            .map(|catalog| catalog.render_for_prompt())
            .unwrap_or_default()
    }

    async fn invoke(
        &mut self,
        operation: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> InvokeOutcome {
        McpClient::invoke(self, operation, arguments).await
    }
}

fn interpret_call_result(result: &CallToolResult) -> InvokeOutcome {
    let value = match serde_json::to_value(result) {
        Ok(value) => value,
        Err(err) => {
            return InvokeOutcome::failure(
                InvokeFailureKind::Remote,
                format!("unreadable tool result: {err}"),
            )
        }
    };

    let is_error = value
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let payload = call_result_payload(&value);

    if is_error {
        let message = match &payload {
            Value::String(text) => text.clone(),
            other => serde_json::to_string(other)
                .unwrap_or_else(|_| "tool reported an error".to_string()),
        };
        return InvokeOutcome::failure(InvokeFailureKind::Remote, message);
    }
    InvokeOutcome::Success(payload)
}

/// Pull the useful payload out of a tool result: structured content when
/// provided, else the first text block (parsed as JSON when it is JSON),
/// else the whole result object.
fn call_result_payload(value: &Value) -> Value {
    if let Some(structured) = value.get("structuredContent") {
        if !structured.is_null() {
            return structured.clone();
        }
    }

    if let Some(entries) = value.get("content").and_then(Value::as_array) {
        for entry in entries {
            if entry.get("type").and_then(Value::as_str) != Some("text") {
                continue;
            }
            if let Some(text) = entry.get("text").and_then(Value::as_str) {
                if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                    return parsed;
                }
                return Value::String(text.to_string());
            }
        }
    }

    value.clone()
}
