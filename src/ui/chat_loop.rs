//! Main dispatch event loop and UI rendering.
//!
//! Owns the terminal for the life of the session: draws the transcript and
//! input line, routes keys, and hands engine work (agent turns, tool-server
//! connects) to spawned tasks. Results come back over an unbounded channel
//! and are drained without blocking on every tick.

use crate::commands::{process_input, CommandResult};
use crate::core::agent::{DispatchAgent, TurnOutcome};
use crate::core::config::Settings;
use crate::core::message::Message;
use crate::core::model::HttpModelClient;
use crate::core::session::SessionState;
use crate::mcp::client::{ConnectSummary, McpClient};
use crate::ui::layout;
use crate::utils::logging::LoggingState;
use ratatui::crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEventKind,
        KeyModifiers, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::{
    collections::VecDeque,
    error::Error,
    io,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{mpsc, Mutex};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

// Rows of input text inside the bordered input box.
const INPUT_AREA_HEIGHT: u16 = 1;

/// Results of engine work performed off the UI thread.
enum UiEvent {
    TurnFinished(Box<TurnOutcome>),
    TurnFailed(String),
    ConnectFinished(Result<(ConnectSummary, Vec<String>), String>),
    Disconnected,
    SessionCleared,
}

/// The agent and its transport, locked together for the length of a turn so
/// two turns can never interleave.
struct Engine {
    agent: DispatchAgent<HttpModelClient>,
    mcp: McpClient,
}

/// Everything the renderer and the slash commands read or mutate.
pub struct App {
    pub messages: VecDeque<Message>,
    pub input: String,
    pub scroll_offset: u16,
    pub auto_scroll: bool,
    pub dispatching: bool,
    pub connecting: bool,
    pub pulse_start: Instant,
    pub model_label: String,
    pub endpoint: String,
    pub server_summary: Option<ConnectSummary>,
    pub catalog_overview: Vec<String>,
    pub logging: LoggingState,
}

impl App {
    pub fn new(model_label: String, endpoint: String) -> Self {
        let mut app = App {
            messages: VecDeque::new(),
            input: String::new(),
            scroll_offset: 0,
            auto_scroll: true,
            dispatching: false,
            connecting: false,
            pulse_start: Instant::now(),
            model_label,
            endpoint,
            server_summary: None,
            catalog_overview: Vec::new(),
            logging: LoggingState::new(),
        };
        app.add_app_info(
            "Welcome to Dray. Describe a dispatch request, or type /help for commands.",
        );
        app
    }

    /// Append a message to the transcript, mirroring conversation turns to
    /// the transcript log when one is active. A log write failure never
    /// fails the turn; it surfaces as a warning message.
    pub fn push_message(&mut self, message: Message) {
        let entry = transcript_entry(&message);
        self.messages.push_back(message);
        if let Some(entry) = entry {
            if let Err(err) = self.logging.log_message(&entry) {
                self.messages.push_back(Message::app_warning(format!(
                    "Could not write transcript log: {err}"
                )));
            }
        }
    }

    pub fn add_app_info(&mut self, content: impl Into<String>) {
        self.push_message(Message::app_info(content));
    }

    pub fn add_app_warning(&mut self, content: impl Into<String>) {
        self.push_message(Message::app_warning(content));
    }

    pub fn add_app_error(&mut self, content: impl Into<String>) {
        self.push_message(Message::app_error(content));
    }

    pub fn update_scroll_position(&mut self, available_height: u16, terminal_width: u16) {
        if self.auto_scroll {
            self.scroll_offset =
                layout::calculate_scroll_to_bottom(&self.messages, terminal_width, available_height);
        }
    }

    pub fn calculate_max_scroll_offset(&self, available_height: u16, terminal_width: u16) -> u16 {
        layout::calculate_max_scroll_offset(&self.messages, terminal_width, available_height)
    }
}

/// The log entry for a message, or `None` for app messages, which stay out
/// of the transcript log.
fn transcript_entry(message: &Message) -> Option<String> {
    if message.role.is_user() {
        return Some(format!("You: {}", message.content));
    }
    if message.role.is_assistant() {
        let mut entry = String::new();
        if let Some(reasoning) = &message.reasoning {
            entry.push_str(&format!("Reasoning: {reasoning}\n"));
        }
        for step in &message.steps {
            entry.push_str(&format!(
                "{} {}\n",
                layout::step_marker(&step.outcome),
                step.action
            ));
        }
        entry.push_str(&message.content);
        return Some(entry);
    }
    None
}

fn spawn_turn(engine: Arc<Mutex<Engine>>, tx: mpsc::UnboundedSender<UiEvent>, text: String) {
    tokio::spawn(async move {
        let mut engine = engine.lock().await;
        let Engine { agent, mcp } = &mut *engine;
        let event = match agent.process_turn(mcp, &text).await {
            Ok(outcome) => UiEvent::TurnFinished(Box::new(outcome)),
            Err(err) => UiEvent::TurnFailed(err.to_string()),
        };
        let _ = tx.send(event);
    });
}

fn spawn_connect(
    engine: Arc<Mutex<Engine>>,
    tx: mpsc::UnboundedSender<UiEvent>,
    endpoint: Option<String>,
) {
    tokio::spawn(async move {
        let mut engine = engine.lock().await;
        if let Some(endpoint) = endpoint {
            engine.mcp.set_endpoint(endpoint);
        }
        let result = match engine.mcp.connect().await {
            Ok(summary) => {
                let overview = engine
                    .mcp
                    .catalog()
                    .map(|catalog| catalog.overview_lines())
                    .unwrap_or_default();
                Ok((summary, overview))
            }
            Err(err) => Err(err.to_string()),
        };
        let _ = tx.send(UiEvent::ConnectFinished(result));
    });
}

fn spawn_disconnect(engine: Arc<Mutex<Engine>>, tx: mpsc::UnboundedSender<UiEvent>) {
    tokio::spawn(async move {
        engine.lock().await.mcp.disconnect();
        let _ = tx.send(UiEvent::Disconnected);
    });
}

fn spawn_clear(engine: Arc<Mutex<Engine>>, tx: mpsc::UnboundedSender<UiEvent>) {
    tokio::spawn(async move {
        engine.lock().await.agent.clear_session();
        let _ = tx.send(UiEvent::SessionCleared);
    });
}

fn handle_ui_event(app: &mut App, event: UiEvent) {
    match event {
        UiEvent::TurnFinished(outcome) => {
            app.dispatching = false;
            app.push_message(
                Message::assistant_with_steps(outcome.reply, outcome.steps)
                    .with_reasoning(outcome.reasoning),
            );
        }
        UiEvent::TurnFailed(message) => {
            app.dispatching = false;
            app.add_app_error(format!("Error: {message}"));
        }
        UiEvent::ConnectFinished(Ok((summary, overview))) => {
            app.connecting = false;
            app.add_app_info(format!(
                "Connected to {} v{} ({} tools).",
                summary.server_name, summary.server_version, summary.tool_count
            ));
            app.server_summary = Some(summary);
            app.catalog_overview = overview;
        }
        UiEvent::ConnectFinished(Err(message)) => {
            app.connecting = false;
            app.server_summary = None;
            app.catalog_overview.clear();
            app.add_app_error(message);
        }
        UiEvent::Disconnected => {
            app.server_summary = None;
            app.catalog_overview.clear();
            app.add_app_info("Disconnected from tool server.");
        }
        UiEvent::SessionCleared => {
            app.messages.clear();
            app.scroll_offset = 0;
            app.auto_scroll = true;
            app.add_app_info("Session cleared.");
        }
    }
}

pub async fn run_chat(settings: Settings, log_file: Option<String>) -> Result<(), Box<dyn Error>> {
    let mut app = App::new(settings.model.clone(), settings.mcp_url.clone());
    if let Some(path) = log_file {
        match app.logging.set_log_file(path) {
            Ok(message) => app.add_app_info(message),
            Err(err) => app.add_app_error(format!("Error: {err}")),
        }
    }

    if settings.model_api_key.is_none() {
        app.add_app_warning(
            "No model API key configured (set OPENAI_API_KEY); model requests may be rejected.",
        );
    }

    let model = HttpModelClient::new(
        settings.model,
        settings.model_base_url,
        settings.model_api_key,
    )?;
    let session = SessionState::new(settings.limits, settings.preference_triggers);
    let engine = Arc::new(Mutex::new(Engine {
        agent: DispatchAgent::new(model, session),
        mcp: McpClient::new(settings.mcp_url, settings.mcp_api_key),
    }));

    // Setup terminal only after successful engine creation.
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<UiEvent>();

    let result = 'main_loop: loop {
        terminal.draw(|f| draw_ui(f, &app))?;
        let term_size = terminal.size().unwrap_or_default();
        let available_height = term_size
            .height
            .saturating_sub(INPUT_AREA_HEIGHT + 2)
            .saturating_sub(1);

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if matches!(key.code, KeyCode::Char('c'))
                        && key.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        break 'main_loop Ok(());
                    }
                    match key.code {
                        KeyCode::Enter => {
                            let submitted = std::mem::take(&mut app.input);
                            let text = submitted.trim();
                            if !text.is_empty() {
                                match process_input(&mut app, text) {
                                    CommandResult::Continue => {}
                                    CommandResult::ProcessAsMessage(message) => {
                                        if app.dispatching {
                                            app.add_app_warning(
                                                "Still working on the previous request.",
                                            );
                                            app.input = message;
                                        } else {
                                            app.dispatching = true;
                                            app.pulse_start = Instant::now();
                                            app.push_message(Message::user(message.clone()));
                                            spawn_turn(
                                                Arc::clone(&engine),
                                                tx.clone(),
                                                message,
                                            );
                                        }
                                    }
                                    CommandResult::Connect { endpoint } => {
                                        if let Some(new_endpoint) = &endpoint {
                                            app.endpoint = new_endpoint.clone();
                                        }
                                        app.connecting = true;
                                        app.add_app_info(format!(
                                            "Connecting to {}...",
                                            app.endpoint
                                        ));
                                        spawn_connect(Arc::clone(&engine), tx.clone(), endpoint);
                                    }
                                    CommandResult::Disconnect => {
                                        spawn_disconnect(Arc::clone(&engine), tx.clone());
                                    }
                                    CommandResult::ClearSession => {
                                        spawn_clear(Arc::clone(&engine), tx.clone());
                                    }
                                    CommandResult::Quit => break 'main_loop Ok(()),
                                }
                                app.auto_scroll = true;
                                app.update_scroll_position(available_height, term_size.width);
                            }
                        }
                        KeyCode::Backspace => {
                            if let Some(grapheme_len) =
                                app.input.graphemes(true).next_back().map(str::len)
                            {
                                let new_len = app.input.len() - grapheme_len;
                                app.input.truncate(new_len);
                            }
                        }
                        KeyCode::Esc => {
                            app.input.clear();
                        }
                        KeyCode::Home => {
                            app.auto_scroll = false;
                            app.scroll_offset = 0;
                        }
                        KeyCode::End => {
                            app.auto_scroll = true;
                            app.update_scroll_position(available_height, term_size.width);
                        }
                        KeyCode::PageUp => {
                            app.auto_scroll = false;
                            app.scroll_offset = app.scroll_offset.saturating_sub(available_height);
                        }
                        KeyCode::PageDown => {
                            let max = app.calculate_max_scroll_offset(
                                available_height,
                                term_size.width,
                            );
                            app.scroll_offset =
                                app.scroll_offset.saturating_add(available_height).min(max);
                        }
                        KeyCode::Up => {
                            app.auto_scroll = false;
                            app.scroll_offset = app.scroll_offset.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            let max = app.calculate_max_scroll_offset(
                                available_height,
                                term_size.width,
                            );
                            app.scroll_offset = app.scroll_offset.saturating_add(1).min(max);
                        }
                        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                            app.input.push(c);
                        }
                        _ => {}
                    }
                }
                Event::Paste(text) => {
                    // Keep the input single-line and free of control characters.
                    let sanitized: String = text
                        .replace('\t', "    ")
                        .replace(['\r', '\n'], " ")
                        .chars()
                        .filter(|c| !c.is_control())
                        .collect();
                    app.input.push_str(&sanitized);
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => {
                        app.auto_scroll = false;
                        app.scroll_offset = app.scroll_offset.saturating_sub(3);
                    }
                    MouseEventKind::ScrollDown => {
                        let max =
                            app.calculate_max_scroll_offset(available_height, term_size.width);
                        app.scroll_offset = app.scroll_offset.saturating_add(3).min(max);
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        // Drain engine results without blocking.
        let mut received_any = false;
        while let Ok(event) = rx.try_recv() {
            handle_ui_event(&mut app, event);
            received_any = true;
        }
        if received_any {
            app.update_scroll_position(available_height, term_size.width);
            continue;
        }
    };

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    result
}

fn draw_ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(INPUT_AREA_HEIGHT + 2),
        ])
        .split(f.area());

    let lines = layout::build_display_lines(&app.messages);
    let available_height = chunks[0].height.saturating_sub(1);
    let total_wrapped_lines = layout::calculate_wrapped_line_count(&lines, chunks[0].width);
    let max_offset = total_wrapped_lines.saturating_sub(available_height);
    let scroll_offset = app.scroll_offset.min(max_offset);

    let connection = match &app.server_summary {
        Some(summary) => format!("{} ({} tools)", summary.server_name, summary.tool_count),
        None if app.connecting => "connecting...".to_string(),
        None => "disconnected".to_string(),
    };
    let title = format!(
        "Dray v{} - {} | {} | Logging: {}",
        env!("CARGO_PKG_VERSION"),
        app.model_label,
        connection,
        app.logging.get_status_string()
    );

    let transcript = Paragraph::new(lines)
        .block(Block::default().title(title))
        .wrap(Wrap { trim: true })
        .scroll((scroll_offset, 0));
    f.render_widget(transcript, chunks[0]);

    let input_title = if app.dispatching {
        "Dispatching... (/help for commands, Ctrl+C to quit)"
    } else {
        "Describe a dispatch request (/help for commands, Ctrl+C to quit)"
    };

    // While a turn is in flight, pad the input row so the pulse indicator
    // sits at the right edge.
    let input_text = if app.dispatching {
        let inner_width = chunks[1].width.saturating_sub(2) as usize;
        let mut row = vec![' '; inner_width];
        let input_chars: Vec<char> = app.input.chars().collect();
        let max_input_len = inner_width.saturating_sub(3);
        for (i, &ch) in input_chars.iter().take(max_input_len).enumerate() {
            row[i] = ch;
        }
        if input_chars.len() > max_input_len && max_input_len >= 3 {
            row[max_input_len - 3] = '.';
            row[max_input_len - 2] = '.';
            row[max_input_len - 1] = '.';
        }
        if inner_width > 1 {
            row[inner_width - 2] = dispatch_indicator(app.pulse_start);
        }
        row.into_iter().collect()
    } else {
        app.input.clone()
    };

    let input = Paragraph::new(input_text.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Reset))
            .title(input_title),
    );
    f.render_widget(input, chunks[1]);

    let max_cursor_x = if app.dispatching {
        chunks[1].width.saturating_sub(6)
    } else {
        chunks[1].width.saturating_sub(2)
    };
    let cursor_x = (app.input.as_str().width() as u16 + 1).min(max_cursor_x);
    f.set_cursor_position((chunks[1].x + cursor_x, chunks[1].y + 1));
}

fn dispatch_indicator(pulse_start: Instant) -> char {
    let elapsed = pulse_start.elapsed().as_millis() as f32 / 1000.0;
    let phase = (elapsed * 2.0) % 2.0;
    let intensity = if phase < 1.0 { phase } else { 2.0 - phase };
    if intensity < 0.33 {
        '○'
    } else if intensity < 0.66 {
        '◐'
    } else {
        '●'
    }
}
