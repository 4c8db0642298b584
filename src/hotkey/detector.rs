//! Double-press detection for the Command key
//!
//! A single-slot timing filter: remembers the instant of the last qualifying
//! Command event and reports a double-press when the next one arrives inside
//! the window. Release events are ignored.

use std::time::{Duration, Instant};

use tracing::debug;

use super::keys::ModifierState;

/// Default double-press window
pub const DEFAULT_THRESHOLD: Duration = Duration::from_millis(300);

/// Detects two Command-present events closer together than `threshold`
#[derive(Debug, Clone)]
pub struct DoublePressDetector {
    threshold: Duration,
    last_press: Option<Instant>,
}

impl DoublePressDetector {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last_press: None,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Instant of the pending first press, if any
    #[cfg(test)]
    pub fn last_press(&self) -> Option<Instant> {
        self.last_press
    }

    /// Feed one modifier event. Returns true exactly when a double-press
    /// completes; the window is cleared so a third press starts over.
    pub fn observe(&mut self, at: Instant, modifiers: &ModifierState) -> bool {
        if !modifiers.command {
            return false;
        }

        if let Some(prior) = self.last_press {
            // saturating: an out-of-order timestamp counts as zero elapsed
            let elapsed = at.saturating_duration_since(prior);
            if elapsed < self.threshold {
                debug!(elapsed_ms = elapsed.as_millis() as u64, "double-press detected");
                self.last_press = None;
                return true;
            }
        }

        self.last_press = Some(at);
        false
    }

    /// Forget any pending first press
    #[cfg(test)]
    pub fn reset(&mut self) {
        self.last_press = None;
    }
}

impl Default for DoublePressDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}
