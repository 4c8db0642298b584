//! Toggle sequencing
//!
//! Owns the enabled/disabled state and, per toggle, runs the command
//! sequence for the new state one step at a time. Failures are aggregated
//! into a single event; the state is never rolled back.

use std::str::FromStr;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::commands::{self, CommandStep};
use super::runner::{CommandError, CommandRunner};
use crate::events::StateEvent;
use crate::state::TouchBarState;

/// What to do with the remaining steps once one fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Attempt every step regardless
    #[default]
    ContinueOnError,
    /// Skip the rest of the sequence
    FailFast,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" | "continue-on-error" => Ok(Self::ContinueOnError),
            "fail-fast" | "failfast" => Ok(Self::FailFast),
            other => Err(format!(
                "unknown failure policy '{other}' (expected 'continue' or 'fail-fast')"
            )),
        }
    }
}

/// A step that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: CommandStep,
    pub error: CommandError,
}

/// Result of one toggle attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    /// State after the toggle (the attempted state, even on failure)
    pub state: TouchBarState,
    /// Number of steps actually started
    pub attempted: usize,
    pub failures: Vec<StepFailure>,
}

impl ToggleOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Flips the Touch Bar state and drives the matching command sequence
pub struct ToggleSequencer<R> {
    state: TouchBarState,
    runner: R,
    policy: FailurePolicy,
    event_tx: broadcast::Sender<StateEvent>,
}

impl<R: CommandRunner> ToggleSequencer<R> {
    /// Starts in `Enabled`: the Touch Bar is assumed to be in its stock mode
    pub fn new(runner: R, policy: FailurePolicy, event_tx: broadcast::Sender<StateEvent>) -> Self {
        Self {
            state: TouchBarState::Enabled,
            runner,
            policy,
            event_tx,
        }
    }

    pub fn state(&self) -> TouchBarState {
        self.state
    }

    /// Flip the state and run the sequence for it
    pub async fn toggle(&mut self) -> ToggleOutcome {
        let target = self.state.toggled();
        info!(from = %self.state, to = %target, "toggling touch bar");
        self.state = target;

        let steps = commands::sequence_for(target);
        let mut failures = Vec::new();
        let mut attempted = 0;

        for step in steps {
            attempted += 1;
            match self.runner.run(&step).await {
                Ok(()) => debug!(cmd = %step, "step succeeded"),
                Err(CommandError::Exited { code, .. }) if step.tolerates(code) => {
                    debug!(cmd = %step, code, "step exited non-zero, tolerated");
                }
                Err(error) => {
                    warn!(cmd = %step, %error, "step failed");
                    failures.push(StepFailure { step, error });
                    if self.policy == FailurePolicy::FailFast {
                        break;
                    }
                }
            }
        }

        let outcome = ToggleOutcome {
            state: target,
            attempted,
            failures,
        };
        self.report(&outcome);
        outcome
    }

    fn report(&self, outcome: &ToggleOutcome) {
        let event = if outcome.is_success() {
            info!(state = %outcome.state, steps = outcome.attempted, "toggle complete");
            StateEvent::toggled(outcome.state)
        } else {
            warn!(
                state = %outcome.state,
                failed = outcome.failures.len(),
                attempted = outcome.attempted,
                "toggle finished with failures, state not rolled back"
            );
            StateEvent::ToggleFailed {
                state: outcome.state,
                failed_steps: outcome
                    .failures
                    .iter()
                    .map(|f| format!("{}: {}", f.step, f.error))
                    .collect(),
            }
        };

        let _ = self.event_tx.send(event);
    }
}

/// Test double shared with the controller tests
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::toggle::commands::CommandStep;
    use crate::toggle::runner::{CommandError, CommandRunner};

    /// Records every step and fails the ones whose rendering contains
    /// one of the configured needles
    #[derive(Clone, Default)]
    pub struct RecordingRunner {
        pub calls: Arc<Mutex<Vec<CommandStep>>>,
        failing: Vec<(String, CommandError)>,
    }

    impl RecordingRunner {
        pub fn failing_on(mut self, needle: &str, error: CommandError) -> Self {
            self.failing.push((needle.to_string(), error));
            self
        }

        pub fn calls(&self) -> Vec<CommandStep> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, step: &CommandStep) -> Result<(), CommandError> {
            self.calls.lock().unwrap().push(step.clone());
            let rendered = step.to_string();
            match self.failing.iter().find(|(needle, _)| rendered.contains(needle)) {
                Some((_, error)) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingRunner;
    use super::*;
    use crate::toggle::commands::{disable_sequence, enable_sequence};

    fn sequencer(
        runner: RecordingRunner,
        policy: FailurePolicy,
    ) -> (ToggleSequencer<RecordingRunner>, broadcast::Receiver<StateEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (ToggleSequencer::new(runner, policy, tx), rx)
    }

    fn exit(code: i32) -> CommandError {
        CommandError::Exited {
            code,
            stderr: String::new(),
        }
    }

    #[test]
    fn test_initial_state_is_enabled() {
        let (seq, _) = sequencer(RecordingRunner::default(), FailurePolicy::default());
        assert_eq!(seq.state(), TouchBarState::Enabled);
    }

    #[tokio::test]
    async fn test_first_toggle_disables() {
        let runner = RecordingRunner::default();
        let (mut seq, mut rx) = sequencer(runner.clone(), FailurePolicy::default());

        let outcome = seq.toggle().await;

        assert!(outcome.is_success());
        assert_eq!(outcome.state, TouchBarState::Disabled);
        assert_eq!(outcome.attempted, 7);
        assert_eq!(seq.state(), TouchBarState::Disabled);
        assert_eq!(runner.calls(), disable_sequence());
        assert_eq!(rx.recv().await.unwrap(), StateEvent::TouchBarDisabled);
    }

    #[tokio::test]
    async fn test_round_trip_issues_sequences_in_order() {
        let runner = RecordingRunner::default();
        let (mut seq, _rx) = sequencer(runner.clone(), FailurePolicy::default());

        seq.toggle().await;
        seq.toggle().await;
        seq.toggle().await;
        seq.toggle().await;

        assert_eq!(seq.state(), TouchBarState::Enabled);
        let expected: Vec<_> = [
            disable_sequence(),
            enable_sequence(),
            disable_sequence(),
            enable_sequence(),
        ]
        .concat();
        assert_eq!(runner.calls(), expected);
    }

    #[tokio::test]
    async fn test_absent_key_delete_is_not_fatal() {
        let runner = RecordingRunner::default().failing_on("delete", exit(1));
        let (mut seq, mut rx) = sequencer(runner.clone(), FailurePolicy::FailFast);

        seq.toggle().await; // -> Disabled
        let _ = rx.recv().await;
        let outcome = seq.toggle().await; // -> Enabled, runs the delete

        assert!(outcome.is_success());
        assert_eq!(outcome.attempted, 8);
        assert_eq!(rx.recv().await.unwrap(), StateEvent::TouchBarEnabled);
    }

    #[tokio::test]
    async fn test_tolerant_step_still_fails_on_launch_error() {
        let spawn_error = CommandError::Spawn {
            program: "/usr/bin/pkill".to_string(),
            reason: "No such file or directory".to_string(),
        };
        let runner = RecordingRunner::default().failing_on("pkill Dock", spawn_error.clone());
        let (mut seq, _rx) = sequencer(runner, FailurePolicy::default());

        let outcome = seq.toggle().await;

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].error, spawn_error);
    }

    #[tokio::test]
    async fn test_tolerant_step_fails_on_unexpected_exit_code() {
        let runner = RecordingRunner::default().failing_on("pkill Dock", exit(3));
        let (mut seq, mut rx) = sequencer(runner, FailurePolicy::default());

        let outcome = seq.toggle().await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempted, 7);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].step.args, ["Dock"]);
        match rx.recv().await.unwrap() {
            StateEvent::ToggleFailed { state, failed_steps } => {
                assert_eq!(state, TouchBarState::Disabled);
                assert!(failed_steps[0].contains("pkill Dock"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unmatched_pkill_is_not_fatal() {
        let runner = RecordingRunner::default().failing_on("pkill", exit(1));
        let (mut seq, mut rx) = sequencer(runner, FailurePolicy::FailFast);

        let outcome = seq.toggle().await;

        assert!(outcome.is_success());
        assert_eq!(rx.recv().await.unwrap(), StateEvent::TouchBarDisabled);
    }

    #[tokio::test]
    async fn test_continue_on_error_attempts_every_step() {
        let runner = RecordingRunner::default().failing_on("controlstrip.plist", exit(5));
        let (mut seq, mut rx) = sequencer(runner.clone(), FailurePolicy::ContinueOnError);

        let outcome = seq.toggle().await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempted, 7);
        assert_eq!(runner.calls(), disable_sequence());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].step.args[0], "unload");

        // state stays at the attempted value
        assert_eq!(seq.state(), TouchBarState::Disabled);
        match rx.recv().await.unwrap() {
            StateEvent::ToggleFailed {
                state,
                failed_steps,
            } => {
                assert_eq!(state, TouchBarState::Disabled);
                assert_eq!(failed_steps.len(), 1);
                assert!(failed_steps[0].contains("controlstrip.plist"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fail_fast_skips_remaining_steps() {
        let runner = RecordingRunner::default().failing_on("controlstrip.plist", exit(5));
        let (mut seq, _rx) = sequencer(runner.clone(), FailurePolicy::FailFast);

        let outcome = seq.toggle().await;

        assert_eq!(outcome.attempted, 2);
        assert_eq!(runner.calls(), disable_sequence()[..2].to_vec());
        assert_eq!(seq.state(), TouchBarState::Disabled);
    }

    #[tokio::test]
    async fn test_next_toggle_after_failure_uses_optimistic_state() {
        let runner = RecordingRunner::default().failing_on("defaults write", exit(1));
        let (mut seq, _rx) = sequencer(runner.clone(), FailurePolicy::default());

        assert!(!seq.toggle().await.is_success());
        let second = seq.toggle().await;

        assert_eq!(second.state, TouchBarState::Enabled);
        assert_eq!(runner.calls()[7..].to_vec(), enable_sequence());
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("continue".parse::<FailurePolicy>(), Ok(FailurePolicy::ContinueOnError));
        assert_eq!("Fail-Fast".parse::<FailurePolicy>(), Ok(FailurePolicy::FailFast));
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }
}
