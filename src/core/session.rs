//! Per-session conversational state.
//!
//! One session owns its turn history, a rolling summary of turns that have
//! been condensed away, and a preference map learned from keyword triggers
//! in user text. The state is mutated only by the turn-processing loop and
//! dies with the session.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::config::{PreferenceTrigger, TurnLimits};
use crate::core::message::Message;

/// A learned preference. Triggers record flags; free-text values are kept
/// for anything richer a future extractor might set.
#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceValue {
    Flag(bool),
    Text(String),
}

impl fmt::Display for PreferenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreferenceValue::Flag(value) => write!(f, "{value}"),
            PreferenceValue::Text(value) => write!(f, "{value}"),
        }
    }
}

pub struct SessionState {
    turns: Vec<Message>,
    summary: Option<String>,
    preferences: BTreeMap<String, PreferenceValue>,
    limits: TurnLimits,
    triggers: Vec<PreferenceTrigger>,
}

impl SessionState {
    pub fn new(limits: TurnLimits, triggers: Vec<PreferenceTrigger>) -> Self {
        SessionState {
            turns: Vec::new(),
            summary: None,
            preferences: BTreeMap::new(),
            limits,
            triggers,
        }
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn preferences(&self) -> &BTreeMap<String, PreferenceValue> {
        &self.preferences
    }

    pub fn limits(&self) -> TurnLimits {
        self.limits
    }

    /// The most recent turns presented raw in the prompt context. The same
    /// window summarization keeps, so context after a summary pass is
    /// exactly one summary entry plus these turns.
    pub fn recent_turns(&self) -> &[Message] {
        let start = self.turns.len().saturating_sub(self.limits.keep_window);
        &self.turns[start..]
    }

    pub fn push_turn(&mut self, message: Message) {
        self.turns.push(message);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.summary = None;
        self.preferences.clear();
    }

    /// Scan user text for configured trigger words and record preference
    /// flags. Substring match, case-insensitive; best-effort by design.
    pub fn extract_preferences(&mut self, user_text: &str) {
        let lowered = user_text.to_lowercase();
        for trigger in &self.triggers {
            if lowered.contains(trigger.word.as_str()) {
                self.preferences
                    .insert(trigger.key.clone(), PreferenceValue::Flag(true));
            }
        }
    }

    /// Whether the turn count has exceeded the summarization threshold.
    pub fn needs_summarization(&self) -> bool {
        self.turns.len() > self.limits.summarize_threshold
    }

    /// Text the summarizer is asked to condense: the existing summary (so
    /// nothing already condensed is lost) plus every turn older than the
    /// keep window.
    pub fn condense_input(&self) -> String {
        let mut lines = Vec::new();
        if let Some(summary) = &self.summary {
            lines.push(format!("Previous summary: {summary}"));
        }
        for turn in self.turns_to_condense() {
            lines.push(format!("{}: {}", turn.role.as_str(), turn.content));
        }
        lines.join("\n")
    }

    fn turns_to_condense(&self) -> &[Message] {
        let keep = self.limits.keep_window.min(self.turns.len());
        &self.turns[..self.turns.len() - keep]
    }

    /// Replace all turns older than the keep window with the given summary.
    /// The most recent window survives verbatim.
    pub fn apply_summary(&mut self, summary: String) {
        let keep = self.limits.keep_window.min(self.turns.len());
        let cut = self.turns.len() - keep;
        self.turns.drain(..cut);
        self.summary = Some(summary);
    }

    /// Fallback when the summarizer fails: keep raw history, truncated from
    /// the front to the hard cap, rather than losing context silently.
    pub fn truncate_to_hard_cap(&mut self) {
        if self.turns.len() > self.limits.history_hard_cap {
            let cut = self.turns.len() - self.limits.history_hard_cap;
            self.turns.drain(..cut);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;

    fn test_session() -> SessionState {
        let settings = Config::default().into_settings();
        SessionState::new(settings.limits, settings.preference_triggers)
    }

    fn fill_turns(session: &mut SessionState, count: usize) {
        for i in 0..count {
            if i % 2 == 0 {
                session.push_turn(Message::user(format!("request {i}")));
            } else {
                session.push_turn(Message::assistant(format!("reply {i}")));
            }
        }
    }

    #[test]
    fn urgency_and_fragility_triggers_set_flags() {
        let mut session = test_session();
        session.extract_preferences("This is urgent, the crate is fragile. Please hurry.");

        assert_eq!(
            session.preferences().get("prefers_urgent"),
            Some(&PreferenceValue::Flag(true))
        );
        assert_eq!(
            session.preferences().get("handles_fragile"),
            Some(&PreferenceValue::Flag(true))
        );
    }

    #[test]
    fn triggers_match_case_insensitively() {
        let mut session = test_session();
        session.extract_preferences("URGENT: move the pallet ASAP");
        assert_eq!(
            session.preferences().get("prefers_urgent"),
            Some(&PreferenceValue::Flag(true))
        );
        assert!(session.preferences().get("handles_fragile").is_none());
    }

    #[test]
    fn extraction_never_fails_on_odd_input() {
        let mut session = test_session();
        session.extract_preferences("");
        session.extract_preferences("🚚 🚚 🚚");
        assert!(session.preferences().is_empty());
    }

    #[test]
    fn below_threshold_needs_no_summary() {
        let mut session = test_session();
        fill_turns(&mut session, 20);
        assert!(!session.needs_summarization());
    }

    #[test]
    fn summary_preserves_most_recent_window() {
        let mut session = test_session();
        fill_turns(&mut session, 25);
        assert!(session.needs_summarization());

        // The condense input covers everything outside the keep window.
        let input = session.condense_input();
        assert!(input.contains("request 0"));
        assert!(input.contains("request 18"));
        assert!(!input.contains("reply 19"));

        session.apply_summary("Customer arranged several deliveries.".to_string());

        assert_eq!(session.turn_count(), 6);
        assert_eq!(session.summary(), Some("Customer arranged several deliveries."));
        // Exactly the last six turns survive, verbatim and in order.
        let contents: Vec<&str> = session
            .recent_turns()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            contents,
            vec![
                "reply 19",
                "request 20",
                "reply 21",
                "request 22",
                "reply 23",
                "request 24"
            ]
        );
    }

    #[test]
    fn condense_input_carries_prior_summary() {
        let mut session = test_session();
        fill_turns(&mut session, 25);
        session.apply_summary("First summary.".to_string());
        fill_turns(&mut session, 20);

        assert!(session.needs_summarization());
        assert!(session.condense_input().starts_with("Previous summary: First summary."));
    }

    #[test]
    fn hard_cap_truncation_keeps_newest_turns() {
        let mut session = test_session();
        fill_turns(&mut session, 50);

        session.truncate_to_hard_cap();

        assert_eq!(session.turn_count(), 40);
        assert_eq!(session.turns[0].content, "request 10");
        assert_eq!(session.turns[39].content, "reply 49");
    }

    #[test]
    fn clear_resets_everything() {
        let mut session = test_session();
        fill_turns(&mut session, 3);
        session.extract_preferences("urgent");
        session.apply_summary("s".to_string());

        session.clear();

        assert_eq!(session.turn_count(), 0);
        assert!(session.summary().is_none());
        assert!(session.preferences().is_empty());
    }
}
