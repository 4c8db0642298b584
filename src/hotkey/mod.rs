//! Hotkey module for global keyboard event listening
//!
//! Uses macOS CGEventTap to observe modifier flag changes and a timing
//! filter to turn them into double-press signals.

mod detector;
mod keys;
mod listener;

pub use detector::{DoublePressDetector, DEFAULT_THRESHOLD};
pub use keys::ModifierState;
pub use listener::{HotkeyEvent, HotkeyListener};
