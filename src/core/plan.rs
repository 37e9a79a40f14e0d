//! Plan structures parsed from model responses.
//!
//! A turn's model response is expected to contain one JSON object with a
//! reasoning string, an ordered step list, and a final reply. Models wrap
//! that object in prose or code fences often enough that parsing is a
//! ladder of attempts rather than a single `from_str`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// An ordered list of dispatch steps plus the reply to show the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, alias = "thought")]
    pub reasoning: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default, alias = "message")]
    pub reply: String,
}

/// One step of a plan. `tool` is `None` for purely descriptive steps that
/// invoke nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default, alias = "args")]
    pub arguments: serde_json::Map<String, Value>,
    #[serde(default)]
    pub outcome: StepOutcome,
}

/// Execution state of a step, recorded in order during plan execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum StepOutcome {
    #[default]
    Pending,
    Succeeded(Value),
    Failed(String),
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded(_))
    }
}

impl PlanStep {
    pub fn invokes_tool(&self) -> bool {
        self.tool.is_some()
    }
}

impl Plan {
    /// Fallback plan for responses that carried no parsable structure: the
    /// raw text becomes the reply and no steps are executed.
    pub fn from_raw_reply(text: impl Into<String>) -> Self {
        Plan {
            reasoning: String::new(),
            steps: Vec::new(),
            reply: text.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("model response did not contain a structured plan: {detail}")]
pub struct PlanParseError {
    pub detail: String,
}

/// Parse a model response into a [`Plan`].
///
/// Attempts, in order: the whole response as JSON, the contents of a
/// ```` ```json ```` fence, and the outermost `{...}` span. Callers treat a
/// failure as recoverable by degrading to [`Plan::from_raw_reply`].
pub fn parse_plan(response: &str) -> Result<Plan, PlanParseError> {
    let trimmed = response.trim();

    let mut last_err = match serde_json::from_str::<Plan>(trimmed) {
        Ok(plan) => return Ok(plan),
        Err(err) => err.to_string(),
    };

    if let Some(candidate) = fenced_json_block(trimmed) {
        match serde_json::from_str::<Plan>(candidate) {
            Ok(plan) => return Ok(plan),
            Err(err) => last_err = err.to_string(),
        }
    }

    if let Some(candidate) = outermost_object_span(trimmed) {
        match serde_json::from_str::<Plan>(candidate) {
            Ok(plan) => return Ok(plan),
            Err(err) => last_err = err.to_string(),
        }
    }

    Err(PlanParseError { detail: last_err })
}

/// The contents of the first ```` ```json ```` fence, if the response has one.
fn fenced_json_block(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// The span from the first `{` to the last `}`, if both are present in order.
fn outermost_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_direct_json() {
        let plan = parse_plan(
            r#"{"reasoning": "geocode first", "steps": [{"action": "Geocode the address", "tool": "geocode_address", "arguments": {"address": "1 Main St"}}], "reply": "On it."}"#,
        )
        .unwrap();
        assert_eq!(plan.reasoning, "geocode first");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tool.as_deref(), Some("geocode_address"));
        assert_eq!(plan.steps[0].outcome, StepOutcome::Pending);
        assert_eq!(plan.reply, "On it.");
    }

    #[test]
    fn parses_fenced_block() {
        let response = "Here is the plan:\n```json\n{\"reasoning\": \"\", \"steps\": [], \"reply\": \"Nothing to do.\"}\n```\nLet me know!";
        let plan = parse_plan(response).unwrap();
        assert_eq!(plan.reply, "Nothing to do.");
    }

    #[test]
    fn parses_embedded_object() {
        let response = "Sure. {\"reply\": \"Dispatched.\", \"steps\": []} Anything else?";
        let plan = parse_plan(response).unwrap();
        assert_eq!(plan.reply, "Dispatched.");
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn accepts_alias_field_names() {
        let plan = parse_plan(
            r#"{"thought": "simple", "steps": [{"action": "do it", "tool": null, "args": {}}], "message": "Done."}"#,
        )
        .unwrap();
        assert_eq!(plan.reasoning, "simple");
        assert_eq!(plan.reply, "Done.");
        assert!(!plan.steps[0].invokes_tool());
    }

    #[test]
    fn rejects_plain_prose() {
        let err = parse_plan("I could not produce a plan for that request.").unwrap_err();
        assert!(!err.detail.is_empty());
    }

    #[test]
    fn rejects_two_disjoint_objects() {
        // The outermost span covers both objects and is not valid JSON.
        assert!(parse_plan("{\"reply\": \"a\"} and {\"reply\": \"b\"}").is_err());
    }

    #[test]
    fn missing_fields_default() {
        let plan = parse_plan(r#"{"steps": [{"action": "look"}]}"#).unwrap();
        assert!(plan.reasoning.is_empty());
        assert!(plan.reply.is_empty());
        assert!(plan.steps[0].arguments.is_empty());
        assert!(plan.steps[0].tool.is_none());
    }

    #[test]
    fn outcome_serde_round_trip() {
        let step = PlanStep {
            action: "create order".into(),
            tool: Some("create_order".into()),
            arguments: serde_json::Map::new(),
            outcome: StepOutcome::Failed("timed out".into()),
        };
        let json = serde_json::to_string(&step).unwrap();
        let back: PlanStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back.outcome, StepOutcome::Failed("timed out".into()));
    }
}
