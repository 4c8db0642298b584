//! Core toggle controller
//!
//! The explicit context for the whole core: owns the double-press detector
//! (press timestamp) and the sequencer (enabled state). A single task feeds
//! it hotkey events and manual requests one at a time, so neither piece of
//! state needs a lock.

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::events::StateEvent;
use crate::hotkey::{DoublePressDetector, HotkeyEvent};
use crate::toggle::{CommandRunner, ToggleOutcome, ToggleSequencer};

/// The two presentation states of the Touch Bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchBarState {
    /// Stock mode: app strip with a collapsed Control Strip
    Enabled,
    /// Full Control Strip pinned
    Disabled,
}

impl TouchBarState {
    pub fn toggled(self) -> Self {
        match self {
            TouchBarState::Enabled => TouchBarState::Disabled,
            TouchBarState::Disabled => TouchBarState::Enabled,
        }
    }

    /// SF Symbol name for the status item
    pub fn icon_name(self) -> &'static str {
        match self {
            TouchBarState::Enabled => "command",
            TouchBarState::Disabled => "command.circle.fill",
        }
    }
}

impl Default for TouchBarState {
    fn default() -> Self {
        Self::Enabled
    }
}

impl std::fmt::Display for TouchBarState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TouchBarState::Enabled => write!(f, "Enabled"),
            TouchBarState::Disabled => write!(f, "Disabled"),
        }
    }
}

/// Requests that bypass the gesture, e.g. the "Toggle Touch Bar" action
#[derive(Debug)]
pub enum ControlRequest {
    Toggle { reply: oneshot::Sender<ToggleOutcome> },
}

/// Routes modifier events through the detector into the sequencer
pub struct Controller<R> {
    detector: DoublePressDetector,
    sequencer: ToggleSequencer<R>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl<R: CommandRunner> Controller<R> {
    pub fn new(
        detector: DoublePressDetector,
        sequencer: ToggleSequencer<R>,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        Self {
            detector,
            sequencer,
            event_tx,
        }
    }

    /// Get the current (last attempted) state
    pub fn state(&self) -> TouchBarState {
        self.sequencer.state()
    }

    /// Run until both input channels close
    pub async fn run(
        &mut self,
        mut hotkey_rx: mpsc::Receiver<HotkeyEvent>,
        mut request_rx: mpsc::Receiver<ControlRequest>,
    ) {
        info!(
            state = %self.state(),
            threshold_ms = self.detector.threshold().as_millis() as u64,
            "controller started"
        );

        let mut hotkeys_open = true;
        let mut requests_open = true;

        loop {
            tokio::select! {
                event = hotkey_rx.recv(), if hotkeys_open => match event {
                    Some(event) => {
                        self.handle_hotkey_event(event).await;
                    }
                    None => {
                        debug!("hotkey channel closed");
                        hotkeys_open = false;
                    }
                },
                request = request_rx.recv(), if requests_open => match request {
                    Some(request) => self.handle_request(request).await,
                    None => {
                        debug!("request channel closed");
                        requests_open = false;
                    }
                },
                else => break,
            }
        }

        info!("controller stopped");
    }

    /// Feed one hotkey event; returns the outcome if it completed a
    /// double-press
    pub async fn handle_hotkey_event(&mut self, event: HotkeyEvent) -> Option<ToggleOutcome> {
        match event {
            HotkeyEvent::ModifierChanged { at, modifiers } => {
                if !self.detector.observe(at, &modifiers) {
                    return None;
                }
                let _ = self.event_tx.send(StateEvent::DoublePressDetected);
                Some(self.sequencer.toggle().await)
            }
            HotkeyEvent::TapDisabled => {
                warn!("hotkey tap disabled, events may be missed");
                None
            }
        }
    }

    async fn handle_request(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Toggle { reply } => {
                info!("manual toggle requested");
                let outcome = self.sequencer.toggle().await;
                if reply.send(outcome).is_err() {
                    debug!("toggle requester went away");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::hotkey::ModifierState;
    use crate::toggle::commands::{disable_sequence, enable_sequence};
    use crate::toggle::testing::RecordingRunner;
    use crate::toggle::FailurePolicy;

    fn create_controller() -> (
        Controller<RecordingRunner>,
        RecordingRunner,
        broadcast::Receiver<StateEvent>,
    ) {
        let (tx, rx) = broadcast::channel(64);
        let runner = RecordingRunner::default();
        let sequencer = ToggleSequencer::new(runner.clone(), FailurePolicy::default(), tx.clone());
        let controller = Controller::new(DoublePressDetector::default(), sequencer, tx);
        (controller, runner, rx)
    }

    fn command_at(t0: Instant, offset_ms: u64) -> HotkeyEvent {
        HotkeyEvent::ModifierChanged {
            at: t0 + Duration::from_millis(offset_ms),
            modifiers: ModifierState::command_only(),
        }
    }

    #[test]
    fn test_state_helpers() {
        assert_eq!(TouchBarState::default(), TouchBarState::Enabled);
        assert_eq!(TouchBarState::Enabled.toggled(), TouchBarState::Disabled);
        assert_eq!(TouchBarState::Disabled.toggled(), TouchBarState::Enabled);
        assert_eq!(TouchBarState::Enabled.icon_name(), "command");
        assert_eq!(TouchBarState::Disabled.icon_name(), "command.circle.fill");
    }

    #[test]
    fn test_initial_state() {
        let (controller, _, _) = create_controller();
        assert_eq!(controller.state(), TouchBarState::Enabled);
    }

    #[tokio::test]
    async fn test_double_press_disables() {
        let (mut controller, runner, mut rx) = create_controller();
        let t0 = Instant::now();

        assert!(controller.handle_hotkey_event(command_at(t0, 0)).await.is_none());
        let outcome = controller
            .handle_hotkey_event(command_at(t0, 200))
            .await
            .expect("double-press should toggle");

        assert!(outcome.is_success());
        assert_eq!(controller.state(), TouchBarState::Disabled);
        assert_eq!(runner.calls(), disable_sequence());
        assert_eq!(rx.recv().await.unwrap(), StateEvent::DoublePressDetected);
        assert_eq!(rx.recv().await.unwrap(), StateEvent::TouchBarDisabled);
    }

    #[tokio::test]
    async fn test_slow_presses_do_nothing() {
        let (mut controller, runner, _rx) = create_controller();
        let t0 = Instant::now();

        assert!(controller.handle_hotkey_event(command_at(t0, 0)).await.is_none());
        assert!(controller.handle_hotkey_event(command_at(t0, 500)).await.is_none());

        assert_eq!(controller.state(), TouchBarState::Enabled);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_processes_events_in_order() {
        let (mut controller, runner, _rx) = create_controller();
        let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
        let (request_tx, request_rx) = mpsc::channel(8);
        let t0 = Instant::now();

        // three rapid presses toggle once, then a fresh pair toggles again
        for offset in [0, 100, 200, 1000, 1100] {
            hotkey_tx.send(command_at(t0, offset)).await.unwrap();
        }
        hotkey_tx.send(HotkeyEvent::TapDisabled).await.unwrap();
        drop(hotkey_tx);
        drop(request_tx);

        controller.run(hotkey_rx, request_rx).await;

        assert_eq!(controller.state(), TouchBarState::Enabled);
        assert_eq!(runner.calls(), [disable_sequence(), enable_sequence()].concat());
    }

    #[tokio::test]
    async fn test_manual_toggle_request() {
        let (mut controller, runner, _rx) = create_controller();
        let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
        let (request_tx, request_rx) = mpsc::channel(8);

        let (reply_tx, reply_rx) = oneshot::channel();
        request_tx
            .send(ControlRequest::Toggle { reply: reply_tx })
            .await
            .unwrap();
        drop(request_tx);
        drop(hotkey_tx);

        controller.run(hotkey_rx, request_rx).await;

        let outcome = reply_rx.await.unwrap();
        assert_eq!(outcome.state, TouchBarState::Disabled);
        assert_eq!(runner.calls(), disable_sequence());
    }

    #[tokio::test]
    async fn test_manual_toggle_does_not_consume_pending_press() {
        let (mut controller, runner, _rx) = create_controller();
        let t0 = Instant::now();

        controller.handle_hotkey_event(command_at(t0, 0)).await;
        let (reply_tx, _reply_rx) = oneshot::channel();
        controller
            .handle_request(ControlRequest::Toggle { reply: reply_tx })
            .await;
        assert!(controller.handle_hotkey_event(command_at(t0, 100)).await.is_some());

        assert_eq!(controller.state(), TouchBarState::Enabled);
        assert_eq!(runner.calls(), [disable_sequence(), enable_sequence()].concat());
    }
}
