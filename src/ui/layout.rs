//! Transcript line building and scroll math for the chat view.
//!
//! Lines are styled per role; assistant turns render their plan reasoning
//! dimmed, then the steps with a marker per outcome, then the reply.
//! Wrapped-line counts mirror ratatui's `Wrap { trim: true }` word wrapping
//! so scroll offsets match what the terminal actually shows.

use crate::core::message::{AppMessageKind, Message};
use crate::core::plan::{PlanStep, StepOutcome};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use std::collections::VecDeque;
use unicode_width::UnicodeWidthStr;

/// Marker shown in front of a plan step, in the transcript and in the
/// transcript log.
pub fn step_marker(outcome: &StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Pending => "○",
        StepOutcome::Succeeded(_) => "✓",
        StepOutcome::Failed(_) => "✗",
    }
}

fn step_style(outcome: &StepOutcome) -> Style {
    let color = match outcome {
        StepOutcome::Pending => Color::DarkGray,
        StepOutcome::Succeeded(_) => Color::Green,
        StepOutcome::Failed(_) => Color::Red,
    };
    Style::default().fg(color)
}

fn app_message_style(kind: AppMessageKind) -> Style {
    let color = match kind {
        AppMessageKind::Info => Color::DarkGray,
        AppMessageKind::Warning => Color::Yellow,
        AppMessageKind::Error => Color::Red,
    };
    Style::default().fg(color)
}

/// Build display lines for the whole transcript.
pub fn build_display_lines(messages: &VecDeque<Message>) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for message in messages {
        add_message_lines(&mut lines, message);
    }
    lines
}

fn add_message_lines(lines: &mut Vec<Line<'static>>, message: &Message) {
    if message.role.is_user() {
        lines.push(Line::from(vec![
            Span::styled(
                "You: ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(message.content.clone(), Style::default().fg(Color::Cyan)),
        ]));
    } else if message.role.is_assistant() {
        if let Some(reasoning) = &message.reasoning {
            for reasoning_line in reasoning.lines() {
                lines.push(Line::from(Span::styled(
                    reasoning_line.to_string(),
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                )));
            }
        }
        for step in &message.steps {
            lines.push(step_line(step));
        }
        for content_line in message.content.lines() {
            if content_line.trim().is_empty() {
                lines.push(Line::from(""));
            } else {
                lines.push(Line::from(Span::styled(
                    content_line.to_string(),
                    Style::default().fg(Color::White),
                )));
            }
        }
    } else if let Some(kind) = message.role.app_kind() {
        let style = app_message_style(kind);
        for content_line in message.content.lines() {
            lines.push(Line::from(Span::styled(content_line.to_string(), style)));
        }
    }
    // Blank spacer between messages.
    lines.push(Line::from(""));
}

fn step_line(step: &PlanStep) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("{} ", step_marker(&step.outcome)),
            step_style(&step.outcome),
        ),
        Span::styled(step.action.clone(), Style::default().fg(Color::Gray)),
    ])
}

/// Count the visual lines the given lines occupy after word wrapping,
/// matching `Wrap { trim: true }`.
pub fn calculate_wrapped_line_count(lines: &[Line], terminal_width: u16) -> u16 {
    let mut total = 0u16;
    for line in lines {
        let text = line
            .spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect::<String>();
        let trimmed = text.trim();
        if trimmed.is_empty() || terminal_width == 0 {
            total = total.saturating_add(1);
        } else {
            total = total.saturating_add(calculate_word_wrapped_lines(trimmed, terminal_width));
        }
    }
    total
}

fn calculate_word_wrapped_lines(text: &str, terminal_width: u16) -> u16 {
    let width = terminal_width as usize;
    let mut line_count = 1u16;
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut word_len = word.width();

        if current_len > 0 {
            if current_len + 1 + word_len > width {
                line_count = line_count.saturating_add(1);
                current_len = 0;
            } else {
                current_len += 1;
            }
        }

        // Overlong words break mid-word rather than undercounting.
        while current_len + word_len > width {
            word_len -= width - current_len;
            line_count = line_count.saturating_add(1);
            current_len = 0;
        }
        current_len += word_len;
    }

    line_count
}

/// Scroll offset that puts the last visual line at the bottom of the view.
pub fn calculate_scroll_to_bottom(
    messages: &VecDeque<Message>,
    terminal_width: u16,
    available_height: u16,
) -> u16 {
    let lines = build_display_lines(messages);
    let total = calculate_wrapped_line_count(&lines, terminal_width);
    total.saturating_sub(available_height)
}

pub fn calculate_max_scroll_offset(
    messages: &VecDeque<Message>,
    terminal_width: u16,
    available_height: u16,
) -> u16 {
    calculate_scroll_to_bottom(messages, terminal_width, available_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line_text(line: &Line) -> String {
        line.spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect()
    }

    fn step(action: &str, outcome: StepOutcome) -> PlanStep {
        PlanStep {
            action: action.to_string(),
            tool: Some("create_order".to_string()),
            arguments: serde_json::Map::new(),
            outcome,
        }
    }

    #[test]
    fn user_messages_carry_a_prefix_and_spacer() {
        let mut messages = VecDeque::new();
        messages.push_back(Message::user("deliver flowers to Anna"));

        let lines = build_display_lines(&messages);
        assert_eq!(lines.len(), 2);
        assert_eq!(line_text(&lines[0]), "You: deliver flowers to Anna");
        assert_eq!(line_text(&lines[1]), "");
    }

    #[test]
    fn assistant_steps_render_markers_before_the_reply() {
        let steps = vec![
            step("Create the order", StepOutcome::Succeeded(json!({"id": 7}))),
            step(
                "Geocode the address (failed: service down)",
                StepOutcome::Failed("service down".to_string()),
            ),
            step("Assign a driver", StepOutcome::Pending),
        ];
        let mut messages = VecDeque::new();
        messages.push_back(Message::assistant_with_steps("Order booked.", steps));

        let lines = build_display_lines(&messages);
        assert_eq!(line_text(&lines[0]), "✓ Create the order");
        assert_eq!(
            line_text(&lines[1]),
            "✗ Geocode the address (failed: service down)"
        );
        assert_eq!(line_text(&lines[2]), "○ Assign a driver");
        assert_eq!(line_text(&lines[3]), "Order booked.");
    }

    #[test]
    fn reasoning_renders_above_the_steps() {
        let steps = vec![step(
            "Create the order",
            StepOutcome::Succeeded(json!({"id": 7})),
        )];
        let mut messages = VecDeque::new();
        messages.push_back(
            Message::assistant_with_steps("Order booked.", steps)
                .with_reasoning("Geocode first so the order carries coordinates."),
        );

        let lines = build_display_lines(&messages);
        assert_eq!(
            line_text(&lines[0]),
            "Geocode first so the order carries coordinates."
        );
        assert_eq!(line_text(&lines[1]), "✓ Create the order");
        assert_eq!(line_text(&lines[2]), "Order booked.");
    }

    #[test]
    fn app_messages_are_split_per_line() {
        let mut messages = VecDeque::new();
        messages.push_back(Message::app_info("Available commands:\n  /help"));

        let lines = build_display_lines(&messages);
        assert_eq!(line_text(&lines[0]), "Available commands:");
        assert_eq!(line_text(&lines[1]), "  /help");
    }

    #[test]
    fn short_lines_do_not_wrap() {
        let lines = vec![Line::from("hello world")];
        assert_eq!(calculate_wrapped_line_count(&lines, 80), 1);
    }

    #[test]
    fn long_lines_wrap_at_word_boundaries() {
        let lines = vec![Line::from("alpha beta gamma delta")];
        // Width 11 fits "alpha beta" on one line, then "gamma delta".
        assert_eq!(calculate_wrapped_line_count(&lines, 11), 2);
    }

    #[test]
    fn overlong_words_break_mid_word() {
        let lines = vec![Line::from("abcdefghijklmnop")];
        assert_eq!(calculate_wrapped_line_count(&lines, 4), 4);
    }

    #[test]
    fn blank_lines_count_one_each() {
        let lines = vec![Line::from(""), Line::from("   ")];
        assert_eq!(calculate_wrapped_line_count(&lines, 80), 2);
    }

    #[test]
    fn scroll_to_bottom_is_zero_when_everything_fits() {
        let mut messages = VecDeque::new();
        messages.push_back(Message::user("hi"));
        assert_eq!(calculate_scroll_to_bottom(&messages, 80, 20), 0);
    }

    #[test]
    fn scroll_to_bottom_counts_lines_past_the_view() {
        let mut messages = VecDeque::new();
        for i in 0..6 {
            messages.push_back(Message::user(format!("request {i}")));
        }
        // Six messages render two lines each.
        assert_eq!(calculate_scroll_to_bottom(&messages, 80, 4), 8);
    }
}
