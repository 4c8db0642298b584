//! Notification surface
//!
//! Turns state events into status-icon updates and user-facing alerts.
//! Alerts may block (modal dialogs), so notifiers run on their own task and
//! never hold up the controller.

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::events::StateEvent;
use crate::state::TouchBarState;

/// A user-facing alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn sip_enabled() -> Self {
        Self {
            title: "System Integrity Protection Enabled".to_string(),
            message: "This app requires System Integrity Protection to be disabled to function \
                      properly. Please disable SIP in Recovery Mode:\n\n\
                      1. Restart your Mac\n\
                      2. Hold Power button during startup\n\
                      3. Open Terminal from Utilities menu\n\
                      4. Run: csrutil disable\n\
                      5. Restart your Mac"
                .to_string(),
        }
    }

    pub fn toggle_failed(failed_steps: &[String]) -> Self {
        let mut message = String::from(
            "Make sure System Integrity Protection is disabled and try again.",
        );
        if !failed_steps.is_empty() {
            message.push_str("\n\nFailed steps:");
            for step in failed_steps {
                message.push_str("\n• ");
                message.push_str(step);
            }
        }
        Self {
            title: "Error Toggling Touch Bar".to_string(),
            message,
        }
    }
}

/// What the surface should show for an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Status(TouchBarState),
    Alert(Alert),
}

/// Map a state event to what the user sees. Failed toggles leave the icon
/// alone and raise an alert instead.
pub fn notification_for(event: &StateEvent) -> Option<Notification> {
    match event {
        StateEvent::DoublePressDetected => None,
        StateEvent::TouchBarEnabled => Some(Notification::Status(TouchBarState::Enabled)),
        StateEvent::TouchBarDisabled => Some(Notification::Status(TouchBarState::Disabled)),
        StateEvent::ToggleFailed { failed_steps, .. } => {
            Some(Notification::Alert(Alert::toggle_failed(failed_steps)))
        }
        StateEvent::SipEnabled => Some(Notification::Alert(Alert::sip_enabled())),
    }
}

/// Something that can present notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn status_changed(&self, state: TouchBarState);
    async fn alert(&self, alert: &Alert);
}

/// Writes notifications to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn status_changed(&self, state: TouchBarState) {
        info!(%state, icon = state.icon_name(), "status updated");
    }

    async fn alert(&self, alert: &Alert) {
        warn!(title = %alert.title, message = %alert.message, "alert");
    }
}

/// Shows alerts as modal dialogs through `osascript`
#[derive(Debug, Default)]
pub struct DialogNotifier;

impl DialogNotifier {
    fn script(alert: &Alert) -> String {
        format!(
            "display alert \"{}\" message \"{}\" as warning buttons {{\"OK\"}} default button \"OK\"",
            escape_applescript(&alert.title),
            escape_applescript(&alert.message)
        )
    }
}

#[async_trait]
impl Notifier for DialogNotifier {
    async fn status_changed(&self, _state: TouchBarState) {}

    async fn alert(&self, alert: &Alert) {
        let result = Command::new("/usr/bin/osascript")
            .args(["-e", &Self::script(alert)])
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => debug!("alert dismissed"),
            Ok(output) => warn!(
                code = output.status.code().unwrap_or(-1),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "alert dialog failed"
            ),
            Err(e) => error!(?e, "failed to launch osascript"),
        }
    }
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Deliver events to every notifier until the channel closes
pub async fn run_notifier(
    notifiers: Vec<Box<dyn Notifier>>,
    mut event_rx: broadcast::Receiver<StateEvent>,
) {
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                let Some(notification) = notification_for(&event) else {
                    continue;
                };
                for notifier in &notifiers {
                    match &notification {
                        Notification::Status(state) => notifier.status_changed(*state).await,
                        Notification::Alert(alert) => notifier.alert(alert).await,
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "notifier lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
