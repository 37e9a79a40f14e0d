//! Client for the remote MCP tool host.
//!
//! Three layers: `transport` owns HTTP/SSE framing, this module owns
//! message-level parsing, and `client` owns the connect / invoke /
//! disconnect lifecycle plus the cached tool `catalog`.

pub mod catalog;
pub mod client;
pub mod transport;

pub use catalog::ToolCatalog;
pub use client::{
    ConnectError, ConnectSummary, InvokeFailureKind, InvokeOutcome, McpClient, ToolRunner,
};

use rust_mcp_schema::schema_utils::ServerMessage;
use rust_mcp_schema::{CallToolResult, InitializeResult, ListToolsResult, RpcError};
use serde_json::Value;

pub(crate) const MCP_METHOD_NOT_FOUND: i64 = -32601;

/// Servers without tool support answer `tools/list` with method-not-found;
/// that is an empty catalog, not a failed connect.
pub(crate) fn is_method_not_found(message: &ServerMessage) -> bool {
    matches!(message, ServerMessage::Error(error) if error.error.code == MCP_METHOD_NOT_FOUND)
}

pub(crate) fn parse_response_value(message: ServerMessage) -> Result<Value, String> {
    match message {
        ServerMessage::Response(response) => {
            serde_json::to_value(&response.result).map_err(|err| err.to_string())
        }
        ServerMessage::Error(error) => Err(format_rpc_error(&error.error)),
        other => Err(format_unexpected_server_message(&other)),
    }
}

pub(crate) fn parse_initialize_result(message: ServerMessage) -> Result<InitializeResult, String> {
    let value = parse_response_value(message)?;
    let result =
        serde_json::from_value::<InitializeResult>(value).map_err(|err| err.to_string())?;
    if result.protocol_version.trim().is_empty() {
        return Err("Unexpected initialize response.".to_string());
    }
    Ok(result)
}

pub(crate) fn parse_list_tools(message: ServerMessage) -> Result<ListToolsResult, String> {
    parse_response(message)
}

pub(crate) fn parse_call_tool(message: ServerMessage) -> Result<CallToolResult, String> {
    parse_response(message)
}

fn parse_response<T: serde::de::DeserializeOwned>(message: ServerMessage) -> Result<T, String> {
    let value = parse_response_value(message)?;
    serde_json::from_value::<T>(value).map_err(|err| err.to_string())
}

pub(crate) fn format_unexpected_server_message(message: &ServerMessage) -> String {
    format!("Unexpected MCP server message: {message:?}")
}

pub(crate) fn format_rpc_error(error: &RpcError) -> String {
    let mut output = format!("MCP error {}: {}", error.code, error.message);
    if let Some(data) = &error.data {
        let details = data
            .get("details")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .or_else(|| data.as_str().map(|value| value.to_string()))
            .or_else(|| serde_json::to_string_pretty(data).ok());

        if let Some(details) = details {
            if !details.is_empty() {
                output.push('\n');
                output.push_str(&details);
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_message(value: serde_json::Value) -> ServerMessage {
        serde_json::from_value(value).expect("message should parse")
    }

    #[test]
    fn parse_initialize_rejects_blank_protocol_version() {
        let message = server_message(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "capabilities": {},
                "protocolVersion": " ",
                "serverInfo": {"name": "x", "version": "1.0.0"}
            }
        }));

        assert!(parse_initialize_result(message).is_err());
    }

    #[test]
    fn parse_initialize_accepts_valid_result() {
        let message = server_message(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "capabilities": {},
                "protocolVersion": "2025-11-25",
                "serverInfo": {"name": "fleet-tools", "version": "2.4.0"}
            }
        }));

        let result = parse_initialize_result(message).expect("should parse");
        assert_eq!(result.protocol_version, "2025-11-25");
        assert_eq!(result.server_info.name, "fleet-tools");
    }

    #[test]
    fn method_not_found_is_detected() {
        let miss = server_message(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32601, "message": "Method not found"}
        }));
        assert!(is_method_not_found(&miss));

        let other = server_message(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32000, "message": "boom"}
        }));
        assert!(!is_method_not_found(&other));
    }

    #[test]
    fn error_frames_format_with_details() {
        let message = server_message(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {
                "code": -32000,
                "message": "tool exploded",
                "data": {"details": "missing driver id"}
            }
        }));

        let err = parse_response_value(message).unwrap_err();
        assert!(err.contains("MCP error -32000: tool exploded"));
        assert!(err.contains("missing driver id"));
    }
}
