//! Command-line surface and runtime bootstrap.
//!
//! Parses flags, layers them over the config file and environment, starts
//! the tokio runtime, and hands off to the chat loop or the non-TUI
//! `tools` subcommand.

use std::error::Error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::core::config::{Config, Settings};
use crate::mcp::client::McpClient;
use crate::ui::chat_loop::run_chat;

#[derive(Parser)]
#[command(name = "dray")]
#[command(about = "A terminal dispatch agent for delivery fleets")]
#[command(
    long_about = "Dray is a full-screen terminal agent for delivery dispatch. Describe what \
needs to be delivered; the agent drafts a step-by-step plan with a hosted \
language model and executes each step against an MCP tool server.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    API key for the model endpoint\n\
  OPENAI_BASE_URL   Model API base URL (defaults to https://api.openai.com/v1)\n\
  DRAY_MODEL        Model id for plan generation\n\
  DRAY_MCP_URL      MCP tool server URL\n\
  DRAY_MCP_API_KEY  Bearer token for the tool server\n\n\
Controls:\n\
  Type              Enter your request in the input field\n\
  Enter             Send the request\n\
  Up/Down/Mouse     Scroll through the transcript\n\
  PageUp/PageDown   Scroll a screen at a time\n\
  Esc               Clear the input field\n\
  Ctrl+C            Quit\n\n\
Commands:\n\
  /connect [url]    Connect to the tool server\n\
  /tools            List the connected server's tools\n\
  /log <file>       Append the transcript to a file\n\
  /help             List all commands"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model id for plan generation
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible model API
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// URL of the MCP tool server
    #[arg(long, value_name = "URL")]
    pub mcp_url: Option<String>,

    /// Append the conversation transcript to this file
    #[arg(short = 'l', long, value_name = "FILE")]
    pub log: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the dispatch interface (default)
    Chat,
    /// Connect to the tool server, print its catalog, and exit
    Tools,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    // Diagnostics go to stderr so the alternate screen stays clean; off
    // unless RUST_LOG enables something.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = load_settings(&args)?;

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(settings, args.log).await,
        Commands::Tools => print_tools(settings).await,
    }
}

fn load_settings(args: &Args) -> Result<Settings, Box<dyn Error>> {
    let mut settings = Config::load()?.into_settings();
    settings.apply_env();
    apply_flag_overrides(&mut settings, args);
    Ok(settings)
}

fn apply_flag_overrides(settings: &mut Settings, args: &Args) {
    if let Some(model) = &args.model {
        settings.model = model.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        settings.model_base_url = endpoint.clone();
    }
    if let Some(mcp_url) = &args.mcp_url {
        settings.mcp_url = mcp_url.clone();
    }
}

async fn print_tools(settings: Settings) -> Result<(), Box<dyn Error>> {
    let mut client = McpClient::new(settings.mcp_url, settings.mcp_api_key);
    println!("Connecting to {}...", client.endpoint());
    let summary = client.connect().await?;
    println!(
        "Connected to {} v{} (protocol {}).",
        summary.server_name, summary.server_version, summary.protocol_version
    );
    match client.catalog() {
        Some(catalog) if !catalog.is_empty() => {
            println!("{} tools available:", catalog.len());
            for line in catalog.overview_lines() {
                println!("{line}");
            }
        }
        _ => println!("The server exposes no tools."),
    }
    client.disconnect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_is_the_default_command() {
        let args = Args::try_parse_from(["dray"]).expect("bare invocation parses");
        assert!(args.command.is_none());
        assert!(args.model.is_none());
        assert!(args.log.is_none());
    }

    #[test]
    fn flags_parse_into_their_fields() {
        let args = Args::try_parse_from([
            "dray",
            "--model",
            "gpt-4o",
            "--endpoint",
            "https://llm.example/v1",
            "--mcp-url",
            "http://tools.example/mcp",
            "--log",
            "transcript.txt",
        ])
        .expect("flags parse");

        assert_eq!(args.model.as_deref(), Some("gpt-4o"));
        assert_eq!(args.endpoint.as_deref(), Some("https://llm.example/v1"));
        assert_eq!(args.mcp_url.as_deref(), Some("http://tools.example/mcp"));
        assert_eq!(args.log.as_deref(), Some("transcript.txt"));
    }

    #[test]
    fn tools_subcommand_parses() {
        let args = Args::try_parse_from(["dray", "tools"]).expect("subcommand parses");
        assert!(matches!(args.command, Some(Commands::Tools)));
    }

    #[test]
    fn flag_overrides_beat_config_values() {
        let mut settings = Config::default().into_settings();
        let args = Args::try_parse_from([
            "dray",
            "--model",
            "mistral-large",
            "--mcp-url",
            "http://tools.example/mcp",
        ])
        .expect("flags parse");

        apply_flag_overrides(&mut settings, &args);

        assert_eq!(settings.model, "mistral-large");
        assert_eq!(settings.mcp_url, "http://tools.example/mcp");
        // Flags that were not passed leave the configured value alone.
        assert_eq!(settings.model_base_url, "https://api.openai.com/v1");
    }
}
