//! The per-session turn engine.
//!
//! One `process_turn` call runs the whole pipeline: history upkeep,
//! preference extraction, prompt assembly, plan generation, sequential
//! step execution, and persistence. Step failures are recorded on the
//! steps themselves; only a model transport failure aborts the turn, and
//! it leaves history exactly as it was before the turn started.

use chrono::Local;
use tracing::debug;

use crate::core::message::Message;
use crate::core::model::{ModelApi, ModelError};
use crate::core::plan::{parse_plan, Plan, PlanStep, StepOutcome};
use crate::core::prompt::{build_turn_prompt, condense_request, SUMMARIZER_INSTRUCTION};
use crate::core::session::SessionState;
use crate::mcp::{InvokeOutcome, ToolRunner};

/// What one completed turn hands back to the UI.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub reasoning: String,
    pub steps: Vec<PlanStep>,
}

pub struct DispatchAgent<M> {
    model: M,
    session: SessionState,
}

impl<M: ModelApi> DispatchAgent<M> {
    pub fn new(model: M, session: SessionState) -> Self {
        DispatchAgent { model, session }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Forget history, summary, and learned preferences.
    pub fn clear_session(&mut self) {
        self.session.clear();
    }

    /// Run one user request through the turn pipeline against the given
    /// tool runner. Returns `Err` only when the plan-generation call
    /// itself fails; step failures come back recorded on the steps.
    pub async fn process_turn<T>(
        &mut self,
        tools: &mut T,
        user_text: &str,
    ) -> Result<TurnOutcome, ModelError>
    where
        T: ToolRunner + ?Sized,
    {
        self.maintain_history().await;
        self.session.extract_preferences(user_text);

        let catalog_text = tools.catalog_text();
        let parts = build_turn_prompt(&self.session, &catalog_text, user_text, Local::now());
        let raw = self.model.complete(&parts.system, &parts.context).await?;

        let mut plan = match parse_plan(&raw) {
            Ok(plan) => plan,
            Err(err) => {
                debug!(error = %err, "using raw model reply");
                Plan::from_raw_reply(raw)
            }
        };

        self.execute_steps(tools, &mut plan.steps).await;

        self.session.push_turn(Message::user(user_text));
        self.session.push_turn(Message::assistant_with_steps(
            plan.reply.clone(),
            plan.steps.clone(),
        ));

        Ok(TurnOutcome {
            reply: plan.reply,
            reasoning: plan.reasoning,
            steps: plan.steps,
        })
    }

    /// Condense history past the threshold into a rolling summary. A
    /// summarizer failure never blocks the turn: the history is clamped to
    /// the hard cap instead and the turn proceeds on raw turns.
    async fn maintain_history(&mut self) {
        if !self.session.needs_summarization() {
            return;
        }

        let request = condense_request(&self.session.condense_input());
        match self.model.complete(SUMMARIZER_INSTRUCTION, &request).await {
            Ok(summary) => self.session.apply_summary(summary),
            Err(err) => {
                debug!(error = %err, "summarization failed, clamping history");
                self.session.truncate_to_hard_cap();
            }
        }
    }

    /// Execute plan steps in order. Only the first `max_steps_per_turn`
    /// steps are considered; the rest stay `Pending`. A failed step does
    /// not stop the walk, and its failure text is folded into the action
    /// so later prompts carry it.
    async fn execute_steps<T>(&mut self, tools: &mut T, steps: &mut [PlanStep])
    where
        T: ToolRunner + ?Sized,
    {
        let max_steps = self.session.limits().max_steps_per_turn;
        for step in steps.iter_mut().take(max_steps) {
            let Some(operation) = step.tool.clone() else {
                continue;
            };

            match tools.invoke(&operation, step.arguments.clone()).await {
                InvokeOutcome::Success(payload) => {
                    step.outcome = StepOutcome::Succeeded(payload);
                }
                InvokeOutcome::Failure { message, .. } => {
                    debug!(operation = %operation, error = %message, "step failed");
                    step.action = format!("{} (failed: {message})", step.action);
                    step.outcome = StepOutcome::Failed(message);
                }
            }
        }
    }
}
