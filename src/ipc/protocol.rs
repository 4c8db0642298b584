//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::StateEvent;
use crate::state::TouchBarState;
use crate::toggle::ToggleOutcome;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from a client to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Toggle the Touch Bar now, without the gesture
    Toggle,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to state event notifications
    Subscribe,
}

/// Responses from the daemon to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Result of a manual toggle
    Toggled {
        state: TouchBarState,
        success: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failed_steps: Vec<String>,
    },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<ToggleOutcome> for Response {
    fn from(outcome: ToggleOutcome) -> Self {
        Response::Toggled {
            state: outcome.state,
            success: outcome.is_success(),
            failed_steps: outcome
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.step, f.error))
                .collect(),
        }
    }
}

/// Push notification to subscribed clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A state event occurred
    Event { event: StateEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Last attempted state
    pub state: TouchBarState,

    /// Status icon; only follows successful toggles
    pub icon: String,

    /// Whether the global modifier listener is running
    pub hotkey_registered: bool,

    /// Whether the startup check found SIP enabled
    pub sip_enabled: bool,

    /// Failed steps of the most recent toggle, if it failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_failure: Vec<String>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        let state = TouchBarState::default();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state,
            icon: state.icon_name().to_string(),
            hotkey_registered: false,
            sip_enabled: false,
            last_failure: Vec::new(),
            uptime_secs: 0,
        }
    }
}

impl DaemonStatus {
    /// Fold a state event into the snapshot
    pub fn apply(&mut self, event: &StateEvent) {
        match event {
            StateEvent::TouchBarEnabled | StateEvent::TouchBarDisabled => {
                if let Some(state) = event.touch_bar_state() {
                    self.state = state;
                    self.icon = state.icon_name().to_string();
                }
                self.last_failure.clear();
            }
            StateEvent::ToggleFailed {
                state,
                failed_steps,
            } => {
                self.state = *state;
                self.last_failure = failed_steps.clone();
            }
            StateEvent::SipEnabled => self.sip_enabled = true,
            StateEvent::DoublePressDetected => {}
        }
    }
}
