//! Step list rendering for terminal output.

use std::fmt::Write;

use ckiller_models::{JobSnapshot, JobStep, StepPlan, StepState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepView {
    Pending,
    Active { progress: Option<u8> },
    Done,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRow {
    pub step: &'static str,
    pub label: &'static str,
    pub view: StepView,
}

/// One row per planned step of the job. The video plan depends on whether
/// subtitles are enabled.
pub fn step_rows(snapshot: &JobSnapshot, subtitles_enabled: bool) -> Vec<StepRow> {
    match snapshot {
        JobSnapshot::Description(state) => rows(&StepPlan::description(), state),
        JobSnapshot::Video(state) => rows(&StepPlan::video(subtitles_enabled), state),
    }
}

fn rows<S: JobStep>(plan: &StepPlan<S>, state: &StepState<S>) -> Vec<StepRow> {
    plan.steps()
        .iter()
        .map(|step| {
            let view = if state.has_completed(*step) {
                StepView::Done
            } else if let Some(failure) = state.error().filter(|f| f.step == *step) {
                StepView::Failed {
                    message: failure.message.clone(),
                }
            } else if state.current_step() == *step {
                StepView::Active {
                    progress: state.progress(),
                }
            } else {
                StepView::Pending
            };
            StepRow {
                step: step.as_str(),
                label: step.label(),
                view,
            }
        })
        .collect()
}

/// Render the step list, one line per step.
pub fn render(snapshot: &JobSnapshot, subtitles_enabled: bool) -> String {
    let mut out = String::new();
    for row in step_rows(snapshot, subtitles_enabled) {
        let _ = match &row.view {
            StepView::Done => writeln!(out, "[x] {}", row.label),
            StepView::Active { progress: Some(p) } => writeln!(out, "[>] {} {}%", row.label, p),
            StepView::Active { progress: None } => writeln!(out, "[>] {}", row.label),
            StepView::Pending => writeln!(out, "[ ] {}", row.label),
            StepView::Failed { message } => writeln!(out, "[!] {}: {}", row.label, message),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use ckiller_models::{DescriptionStep, VideoStep};

    use super::*;

    #[test]
    fn test_active_step_shows_progress() {
        let plan = StepPlan::description();
        let mut state = StepState::new();
        state.advance(&plan, DescriptionStep::Preparing).unwrap();
        state.advance(&plan, DescriptionStep::Downloading).unwrap();
        state.report_progress(40);

        let rows = step_rows(&JobSnapshot::Description(state.clone()), true);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].view, StepView::Done);
        assert_eq!(rows[1].view, StepView::Active { progress: Some(40) });
        assert_eq!(rows[2].view, StepView::Pending);

        let text = render(&JobSnapshot::Description(state), true);
        assert!(text.contains("[>] Downloading video 40%"));
    }

    #[test]
    fn test_video_rows_follow_subtitle_setting() {
        let snapshot = JobSnapshot::Video(StepState::new());
        let with = step_rows(&snapshot, true);
        let without = step_rows(&snapshot, false);
        assert_eq!(with.len(), 7);
        assert_eq!(without.len(), 6);
        assert!(without.iter().all(|r| r.step != "TRANSCRIBING"));
        assert!(with.iter().all(|r| r.view == StepView::Pending));
    }

    #[test]
    fn test_failed_step_carries_message() {
        let plan = StepPlan::video(false);
        let mut state = StepState::new();
        state.advance(&plan, VideoStep::Preparing).unwrap();
        state.advance(&plan, VideoStep::GeneratingAudio).unwrap();
        state.fail(VideoStep::GeneratingAudio, "voice unavailable");

        let rows = step_rows(&JobSnapshot::Video(state), false);
        assert_eq!(rows[0].view, StepView::Done);
        assert_eq!(
            rows[1].view,
            StepView::Failed {
                message: "voice unavailable".to_string()
            }
        );
        assert_eq!(rows[2].view, StepView::Pending);
    }
}
