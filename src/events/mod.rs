//! Events module for toggle notifications
//!
//! Structured events broadcast by the controller and consumed by the
//! notification surface and subscribed IPC clients.

use serde::{Deserialize, Serialize};

use crate::state::TouchBarState;

/// Events emitted while detecting and performing toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Two Command presses landed inside the window
    DoublePressDetected,

    /// Enable sequence completed; the app strip is back
    TouchBarEnabled,

    /// Disable sequence completed; the full Control Strip is pinned
    TouchBarDisabled,

    /// One or more steps failed. `state` is the state that was attempted
    /// and is kept even though the OS may not match it.
    ToggleFailed {
        state: TouchBarState,
        failed_steps: Vec<String>,
    },

    /// System Integrity Protection is on, so toggles will likely fail
    SipEnabled,
}

impl StateEvent {
    /// Success event for a completed toggle into `state`
    pub fn toggled(state: TouchBarState) -> Self {
        match state {
            TouchBarState::Enabled => StateEvent::TouchBarEnabled,
            TouchBarState::Disabled => StateEvent::TouchBarDisabled,
        }
    }

    /// The state this event reports, if it reports one
    pub fn touch_bar_state(&self) -> Option<TouchBarState> {
        match self {
            StateEvent::TouchBarEnabled => Some(TouchBarState::Enabled),
            StateEvent::TouchBarDisabled => Some(TouchBarState::Disabled),
            StateEvent::ToggleFailed { state, .. } => Some(*state),
            StateEvent::DoublePressDetected | StateEvent::SipEnabled => None,
        }
    }
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::DoublePressDetected => write!(f, "DOUBLE_PRESS_DETECTED"),
            StateEvent::TouchBarEnabled => write!(f, "TOUCH_BAR_ENABLED"),
            StateEvent::TouchBarDisabled => write!(f, "TOUCH_BAR_DISABLED"),
            StateEvent::ToggleFailed { state, failed_steps } => {
                write!(f, "TOGGLE_FAILED ({}, {} steps)", state, failed_steps.len())
            }
            StateEvent::SipEnabled => write!(f, "SIP_ENABLED"),
        }
    }
}
