//! Global modifier listener using macOS CGEventTap
//!
//! Observes system-wide flags-changed events. The tap runs on a dedicated
//! thread with its own CFRunLoop; each event is timestamped inside the tap
//! callback so that queueing downstream does not distort press timing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, warn};

use super::keys::ModifierState;

/// Events sent from the hotkey listener to the controller
#[derive(Debug, Clone)]
pub enum HotkeyEvent {
    /// A flags-changed event, with the active modifiers at that instant
    ModifierChanged {
        at: Instant,
        modifiers: ModifierState,
    },
    /// Event tap was disabled by macOS (timeout or user input)
    TapDisabled,
}

/// Global listener that forwards every modifier change
pub struct HotkeyListener {
    event_tx: mpsc::Sender<HotkeyEvent>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new hotkey listener
    pub fn new(event_tx: mpsc::Sender<HotkeyEvent>) -> Self {
        Self {
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the hotkey listener
    ///
    /// Spawns a dedicated thread that runs a CFRunLoop to receive
    /// CGEventTap callbacks. The listener runs until `stop()` is called
    /// or the program exits.
    #[cfg(target_os = "macos")]
    pub fn start(&self) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);

        std::thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                tracing::info!("hotkey listener thread started");

                if let Err(e) = tap::run_event_loop(event_tx, running.clone()) {
                    error!(?e, "hotkey listener error");
                }

                running.store(false, Ordering::SeqCst);
                tracing::info!("hotkey listener thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                HotkeyError::ThreadSpawn(e.to_string())
            })?;

        Ok(())
    }

    /// Global event taps only exist on macOS
    #[cfg(not(target_os = "macos"))]
    pub fn start(&self) -> Result<(), HotkeyError> {
        let _ = &self.event_tx;
        error!("global modifier monitoring requires macOS");
        Err(HotkeyError::Unsupported)
    }

    /// Stop the hotkey listener; the run loop exits on its next iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Hand an event to the controller without blocking the run loop.
/// A full queue drops the event; returns false once the receiver is gone.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn forward_event(event_tx: &mpsc::Sender<HotkeyEvent>, event: HotkeyEvent) -> bool {
    match event_tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!(?event, "controller busy, dropping modifier event");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to create run loop source for event tap")]
    RunLoopSource,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("global modifier monitoring is not supported on this platform")]
    Unsupported,
}

#[cfg(target_os = "macos")]
mod tap {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
    use core_graphics::event::{
        CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
        CGEventTapProxy, CGEventType,
    };
    use tokio::sync::mpsc;
    use tracing::{debug, error, info, warn};

    use super::{forward_event, HotkeyError, HotkeyEvent};
    use crate::hotkey::keys::ModifierState;

    /// Run the CFRunLoop with the event tap until `running` is cleared
    pub(super) fn run_event_loop(
        event_tx: mpsc::Sender<HotkeyEvent>,
        running: Arc<AtomicBool>,
    ) -> Result<(), HotkeyError> {
        let (callback_tx, callback_rx) = std::sync::mpsc::channel::<HotkeyEvent>();

        // CGEventTap callback - must be fast and non-blocking
        let callback = move |_proxy: CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
              -> Option<CGEvent> {
            match event_type {
                CGEventType::FlagsChanged => {
                    let _ = callback_tx.send(HotkeyEvent::ModifierChanged {
                        at: Instant::now(),
                        modifiers: ModifierState::from_flags(event.get_flags()),
                    });
                }
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    let _ = callback_tx.send(HotkeyEvent::TapDisabled);
                }
                _ => {}
            }
            Some(event.clone())
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![CGEventType::FlagsChanged],
            callback,
        )
        .map_err(|_| {
            error!("failed to create event tap - is Accessibility permission granted?");
            HotkeyError::EventTapCreation
        })?;

        tap.enable();

        let run_loop_source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HotkeyError::RunLoopSource)?;
        let run_loop = CFRunLoop::get_current();

        unsafe {
            run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
        }

        info!("event tap created and enabled");

        while running.load(Ordering::SeqCst) {
            unsafe {
                CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
            }

            while let Ok(event) = callback_rx.try_recv() {
                match &event {
                    HotkeyEvent::ModifierChanged { modifiers, .. } => {
                        debug!(?modifiers, "modifier flags changed");
                    }
                    HotkeyEvent::TapDisabled => {
                        warn!("event tap disabled by the system, re-enabling");
                        tap.enable();
                    }
                }

                if !forward_event(&event_tx, event) {
                    warn!("modifier event channel closed");
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = HotkeyListener::new(tx);
        assert!(!listener.is_running());
    }

    #[test]
    fn test_forward_drops_when_full_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let at = Instant::now();
        let press = |at| HotkeyEvent::ModifierChanged {
            at,
            modifiers: ModifierState::command_only(),
        };

        assert!(forward_event(&tx, press(at)));
        assert!(forward_event(&tx, HotkeyEvent::TapDisabled));

        assert!(matches!(
            rx.try_recv(),
            Ok(HotkeyEvent::ModifierChanged { at: queued, .. }) if queued == at
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_forward_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(!forward_event(&tx, HotkeyEvent::TapDisabled));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_start_unsupported_off_macos() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = HotkeyListener::new(tx);
        assert!(matches!(listener.start(), Err(HotkeyError::Unsupported)));
        assert!(!listener.is_running());
    }
}
