//! Prompt assembly for plan generation and history condensation.
//!
//! Each turn sends two messages: a fixed system instruction pinning the
//! JSON plan shape, and one user message carrying everything situational
//! (tool catalog, summary, preferences, recent turns, time context, the new
//! request).

use chrono::{DateTime, Duration, TimeZone};

use crate::core::plan::StepOutcome;
use crate::core::session::SessionState;

/// The two message bodies of a plan-generation request.
pub struct PromptParts {
    pub system: String,
    pub context: String,
}

pub fn system_instruction(max_steps: usize) -> String {
    format!(
        r#"You are a dispatch assistant for a delivery fleet. You coordinate orders, drivers, and assignments by calling the tools listed in the context.

Respond with exactly one JSON object and nothing else:
{{
  "reasoning": "why you chose these steps",
  "steps": [
    {{"action": "what this step does", "tool": "tool_name or null", "arguments": {{"field": "value"}}}}
  ],
  "reply": "the message shown to the user"
}}

Rules:
- Use only tools listed under Available Tools, with their declared parameters.
- Order steps so dependencies resolve first. Geocode an address before creating an order that needs its coordinates.
- Use at most {max_steps} steps. If nothing needs doing, return an empty steps list and answer in "reply".
- For steps that call no tool, set "tool" to null.
- Do not invent order, driver, or assignment ids. Look them up first."#
    )
}

/// Build the per-turn prompt from session state and the rendered tool
/// catalog. `now` is injected so callers and tests control the clock.
pub fn build_turn_prompt<Tz: TimeZone>(
    session: &SessionState,
    catalog_text: &str,
    user_text: &str,
    now: DateTime<Tz>,
) -> PromptParts
where
    Tz::Offset: std::fmt::Display,
{
    let mut context = String::new();

    context.push_str("Available Tools:\n");
    if catalog_text.is_empty() {
        context.push_str("(no tool server connected; answer from conversation only)\n");
    } else {
        context.push_str(catalog_text);
        if !catalog_text.ends_with('\n') {
            context.push('\n');
        }
    }

    if let Some(summary) = session.summary() {
        context.push_str(&format!("\nPrevious conversation summary: {summary}\n"));
    }

    if !session.preferences().is_empty() {
        context.push_str("\nKnown preferences:\n");
        for (key, value) in session.preferences() {
            context.push_str(&format!("- {key}: {value}\n"));
        }
    }

    let recent = session.recent_turns();
    if !recent.is_empty() {
        context.push_str("\nRecent conversation:\n");
        for turn in recent {
            context.push_str(&format!("{}: {}\n", turn.role.as_str(), turn.content));
            for step in &turn.steps {
                let marker = match &step.outcome {
                    StepOutcome::Pending => "pending",
                    StepOutcome::Succeeded(_) => "done",
                    StepOutcome::Failed(_) => "failed",
                };
                context.push_str(&format!("  - [{marker}] {}\n", step.action));
            }
        }
    }

    let default_delivery = now.clone() + Duration::hours(2);
    context.push_str(&format!(
        "\nCurrent date/time: {}\nDefault delivery time if none given: {}\n",
        now.format("%Y-%m-%d %H:%M:%S"),
        default_delivery.to_rfc3339()
    ));

    context.push_str(&format!("\nNew request: {user_text}\n"));

    PromptParts {
        system: system_instruction(session.limits().max_steps_per_turn),
        context,
    }
}

/// System line for summarization calls; the detail rides in the request.
pub const SUMMARIZER_INSTRUCTION: &str =
    "You maintain running summaries of delivery dispatch conversations.";

/// The request sent to condense older history into a rolling summary.
pub fn condense_request(condense_input: &str) -> String {
    format!(
        "Summarize this delivery dispatch conversation concisely. Keep customer names, \
         addresses, order and driver ids, and anything still unresolved. Reply with the \
         summary text only.\n\n{condense_input}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::message::Message;
    use crate::core::plan::{PlanStep, StepOutcome};
    use crate::core::session::SessionState;
    use chrono::Utc;

    fn test_session() -> SessionState {
        let settings = Config::default().into_settings();
        SessionState::new(settings.limits, settings.preference_triggers)
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 23, 14, 0, 0).unwrap()
    }

    #[test]
    fn context_carries_catalog_request_and_times() {
        let session = test_session();
        let parts = build_turn_prompt(
            &session,
            "**geocode_address**: Convert an address to coordinates\n",
            "Send a parcel to 1 Main St",
            fixed_now(),
        );

        assert!(parts.context.contains("**geocode_address**"));
        assert!(parts.context.contains("New request: Send a parcel to 1 Main St"));
        assert!(parts.context.contains("Current date/time: 2026-08-23 14:00:00"));
        assert!(parts.context.contains("Default delivery time if none given: 2026-08-23T16:00:00+00:00"));
        assert!(parts.system.contains("\"steps\""));
        assert!(parts.system.contains("at most 5 steps"));
    }

    #[test]
    fn context_without_catalog_says_so() {
        let session = test_session();
        let parts = build_turn_prompt(&session, "", "hello", fixed_now());
        assert!(parts.context.contains("no tool server connected"));
    }

    #[test]
    fn summary_and_preferences_render_when_present() {
        let mut session = test_session();
        session.extract_preferences("urgent and fragile cargo");
        for i in 0..25 {
            session.push_turn(Message::user(format!("request {i}")));
        }
        session.apply_summary("Many deliveries arranged.".to_string());

        let parts = build_turn_prompt(&session, "", "next", fixed_now());

        assert!(parts
            .context
            .contains("Previous conversation summary: Many deliveries arranged."));
        assert!(parts.context.contains("- handles_fragile: true"));
        assert!(parts.context.contains("- prefers_urgent: true"));
        // Only the keep window of raw turns appears.
        assert!(parts.context.contains("request 24"));
        assert!(parts.context.contains("request 19"));
        assert!(!parts.context.contains("request 18"));
        assert!(!parts.context.contains("request 0\n"));
    }

    #[test]
    fn step_outcomes_fold_into_recent_turns() {
        let mut session = test_session();
        session.push_turn(Message::user("ship it".to_string()));
        session.push_turn(Message::assistant_with_steps(
            "Done.",
            vec![
                PlanStep {
                    action: "Geocode the destination".into(),
                    tool: Some("geocode_address".into()),
                    arguments: serde_json::Map::new(),
                    outcome: StepOutcome::Succeeded(serde_json::json!({"lat": 1.0})),
                },
                PlanStep {
                    action: "Create the order (failed: timeout)".into(),
                    tool: Some("create_order".into()),
                    arguments: serde_json::Map::new(),
                    outcome: StepOutcome::Failed("timeout".into()),
                },
            ],
        ));

        let parts = build_turn_prompt(&session, "", "status?", fixed_now());
        assert!(parts.context.contains("  - [done] Geocode the destination"));
        assert!(parts.context.contains("  - [failed] Create the order (failed: timeout)"));
    }

    #[test]
    fn condense_request_wraps_input() {
        let request = condense_request("user: hi\nassistant: hello");
        assert!(request.starts_with("Summarize this delivery dispatch conversation"));
        assert!(request.ends_with("user: hi\nassistant: hello"));
    }
}
