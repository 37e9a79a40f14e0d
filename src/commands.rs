//! Slash commands handled locally by the chat loop.

use crate::ui::chat_loop::App;

pub type CommandHandler = fn(&mut App, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub input: &'a str,
    pub args: &'a str,
}

/// What the chat loop should do after a command handler ran. Commands that
/// only touch the transcript return `Continue`; the rest name the follow-up
/// work the loop performs against the engine.
pub enum CommandResult {
    Continue,
    ProcessAsMessage(String),
    Connect { endpoint: Option<String> },
    Disconnect,
    ClearSession,
    Quit,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        help: "Show available commands.",
        handler: handle_help,
    },
    Command {
        name: "connect",
        help: "Connect to the tool server; /connect <url> switches endpoints.",
        handler: handle_connect,
    },
    Command {
        name: "disconnect",
        help: "Drop the tool server session.",
        handler: handle_disconnect,
    },
    Command {
        name: "tools",
        help: "List the connected server's tools.",
        handler: handle_tools,
    },
    Command {
        name: "status",
        help: "Show model, connection, and logging status.",
        handler: handle_status,
    },
    Command {
        name: "clear",
        help: "Clear the conversation and learned preferences.",
        handler: handle_clear,
    },
    Command {
        name: "log",
        help: "Toggle logging or set the log file path.",
        handler: handle_log,
    },
    Command {
        name: "quit",
        help: "Exit.",
        handler: handle_quit,
    },
];

/// Route one submitted line: slash commands go to their handler, anything
/// else comes back as a message for the dispatch pipeline.
pub fn process_input(app: &mut App, input: &str) -> CommandResult {
    let trimmed = input.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    if name.is_empty() {
        return CommandResult::ProcessAsMessage(input.to_string());
    }

    match find_command(name) {
        Some(command) => (command.handler)(
            app,
            CommandInvocation {
                input: trimmed,
                args,
            },
        ),
        None => {
            app.add_app_warning(format!("Unknown command: /{name}. Try /help."));
            CommandResult::Continue
        }
    }
}

fn handle_help(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    let mut lines = vec!["Available commands:".to_string()];
    for command in all_commands() {
        lines.push(format!("  /{:<12} {}", command.name, command.help));
    }
    app.add_app_info(lines.join("\n"));
    CommandResult::Continue
}

fn handle_connect(_app: &mut App, invocation: CommandInvocation<'_>) -> CommandResult {
    let endpoint = if invocation.args.is_empty() {
        None
    } else {
        Some(invocation.args.to_string())
    };
    CommandResult::Connect { endpoint }
}

fn handle_disconnect(_app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Disconnect
}

fn handle_tools(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    if app.catalog_overview.is_empty() {
        app.add_app_warning("No tools available. Use /connect to reach the tool server.");
        return CommandResult::Continue;
    }
    let mut lines = vec![format!("{} tools available:", app.catalog_overview.len())];
    lines.extend(app.catalog_overview.iter().cloned());
    app.add_app_info(lines.join("\n"));
    CommandResult::Continue
}

fn handle_status(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    let connection = match &app.server_summary {
        Some(summary) => format!(
            "connected to {} v{} ({} tools)",
            summary.server_name, summary.server_version, summary.tool_count
        ),
        None => "disconnected".to_string(),
    };
    app.add_app_info(format!(
        "Model: {}\nTool server: {} ({})\nLogging: {}",
        app.model_label,
        app.endpoint,
        connection,
        app.logging.get_status_string()
    ));
    CommandResult::Continue
}

fn handle_clear(_app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::ClearSession
}

fn handle_log(app: &mut App, invocation: CommandInvocation<'_>) -> CommandResult {
    let result = if invocation.args.is_empty() {
        app.logging.toggle_logging()
    } else {
        app.logging.set_log_file(invocation.args.to_string())
    };
    match result {
        Ok(message) => app.add_app_info(message),
        Err(err) => app.add_app_error(format!("Error: {err}")),
    }
    CommandResult::Continue
}

fn handle_quit(_app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Quit
}
