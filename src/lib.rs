//! Dray is a terminal dispatch agent for delivery fleets. A user describes a
//! dispatch request in natural language; a hosted language model turns it into
//! a step-by-step plan, and each step runs against an MCP tool server.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns configuration, conversation state, the planning prompt,
//!   plan parsing, the model client, and the turn loop that drives execution.
//! - [`mcp`] speaks streamable HTTP to the tool server: initialize handshake,
//!   tool discovery, and tool calls with SSE response handling.
//! - [`ui`] renders the full-screen interface and runs the interactive event
//!   loop that collects input and displays the transcript.
//! - [`commands`] implements the slash commands available from the input
//!   field.
//! - [`api`] defines the chat-completions payload types the model client
//!   sends and receives.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which parses flags and dispatches into
//! [`ui::chat_loop`] for interactive sessions.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod mcp;
pub mod ui;
pub mod utils;
