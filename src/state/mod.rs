//! State module for the Touch Bar toggle
//!
//! Two states, flipped once per toggle:
//! - Enabled: stock app strip (initial)
//! - Disabled: full Control Strip pinned

mod machine;

pub use machine::{ControlRequest, Controller, TouchBarState};
