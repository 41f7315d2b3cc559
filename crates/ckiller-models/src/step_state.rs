//! Step state machine for generation jobs.
//!
//! A [`StepState`] is the observable progress record of one job instance.
//! It only changes through [`StepState::advance`], [`StepState::report_progress`]
//! and [`StepState::fail`], which keep these invariants:
//!
//! - `completed_steps` never contains `current_step`
//! - `error` is set exactly when `current_step` is `ERROR`
//! - `COMPLETED` implies every plan step is in `completed_steps`, in order
//! - `progress` never decreases while the job stays in one step

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::step::{DescriptionStep, JobStep, VideoStep};

/// Invalid state transition. Drivers treat this as a bug, not a job outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Cannot advance from terminal step {from} to {to}")]
    FromTerminal { from: &'static str, to: &'static str },

    #[error("Step {to} does not immediately follow {from}")]
    OutOfOrder { from: &'static str, to: &'static str },
}

/// Concrete ordered steps of one job instance.
///
/// Excludes `IDLE`, `COMPLETED` and `ERROR`; `COMPLETED` implicitly follows
/// the last step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan<S: JobStep> {
    steps: Vec<S>,
}

impl<S: JobStep> StepPlan<S> {
    /// Build a plan from an explicit step list.
    pub fn new(steps: Vec<S>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[S] {
        &self.steps
    }

    pub fn contains(&self, step: S) -> bool {
        self.steps.contains(&step)
    }

    /// Step that must follow `current`, if any.
    pub fn next_after(&self, current: S) -> Option<S> {
        if current == S::IDLE {
            return Some(self.steps.first().copied().unwrap_or(S::COMPLETED));
        }
        let index = self.steps.iter().position(|s| *s == current)?;
        Some(self.steps.get(index + 1).copied().unwrap_or(S::COMPLETED))
    }
}

impl StepPlan<DescriptionStep> {
    pub fn description() -> Self {
        Self::new(DescriptionStep::SEQUENCE.to_vec())
    }
}

impl StepPlan<VideoStep> {
    /// Video plan; `TRANSCRIBING` only runs when subtitles are burned in.
    pub fn video(subtitles_enabled: bool) -> Self {
        Self::new(
            VideoStep::SEQUENCE
                .into_iter()
                .filter(|s| subtitles_enabled || *s != VideoStep::Transcribing)
                .collect(),
        )
    }
}

/// Failure attribution: which step failed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure<S> {
    pub step: S,
    pub message: String,
}

/// Observable progress of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState<S> {
    current_step: S,
    #[serde(default)]
    completed_steps: Vec<S>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<StepFailure<S>>,
}

impl<S: JobStep> Default for StepState<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: JobStep> StepState<S> {
    /// A job that has not started.
    pub fn new() -> Self {
        Self {
            current_step: S::IDLE,
            completed_steps: Vec::new(),
            progress: None,
            error: None,
        }
    }

    pub fn current_step(&self) -> S {
        self.current_step
    }

    pub fn completed_steps(&self) -> &[S] {
        &self.completed_steps
    }

    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    pub fn error(&self) -> Option<&StepFailure<S>> {
        self.error.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.current_step == S::IDLE
    }

    pub fn is_terminal(&self) -> bool {
        self.current_step.is_terminal()
    }

    pub fn is_completed(&self) -> bool {
        self.current_step == S::COMPLETED
    }

    pub fn is_failed(&self) -> bool {
        self.current_step == S::ERROR
    }

    /// Whether the job sits in a step whose updates are pushed to clients.
    pub fn in_push_phase(&self) -> bool {
        !self.is_terminal() && self.current_step.supports_progress()
    }

    pub fn has_completed(&self, step: S) -> bool {
        self.completed_steps.contains(&step)
    }

    /// Move to the step that immediately follows the current one in `plan`.
    ///
    /// `ERROR` is reachable from any non-terminal step and records a generic
    /// failure of the current step. On error the state is left untouched.
    pub fn advance(&mut self, plan: &StepPlan<S>, next: S) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::FromTerminal {
                from: self.current_step.as_str(),
                to: next.as_str(),
            });
        }

        if next == S::ERROR {
            let at = self.current_step;
            self.fail(at, "step failed");
            return Ok(());
        }

        if plan.next_after(self.current_step) != Some(next) {
            return Err(TransitionError::OutOfOrder {
                from: self.current_step.as_str(),
                to: next.as_str(),
            });
        }

        if self.current_step != S::IDLE {
            self.completed_steps.push(self.current_step);
        }
        self.current_step = next;
        self.progress = None;
        Ok(())
    }

    /// Record fine-grained progress for the current step.
    ///
    /// Keeps the maximum observed value so duplicated or reordered updates
    /// never move the bar backwards. Returns `true` when the observable value
    /// changed; updates for terminal or non-progress steps are ignored.
    pub fn report_progress(&mut self, value: u8) -> bool {
        if self.is_terminal() || !self.current_step.supports_progress() {
            return false;
        }
        let value = value.min(100);
        let next = self.progress.unwrap_or(0).max(value);
        if self.progress == Some(next) {
            return false;
        }
        self.progress = Some(next);
        true
    }

    /// Mark the job failed at `at`. Returns `false` if it already ended.
    pub fn fail(&mut self, at: S, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.current_step = S::ERROR;
        self.progress = None;
        self.error = Some(StepFailure {
            step: at,
            message: message.into(),
        });
        true
    }
}
