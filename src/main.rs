//! touchbar-toggler: background daemon that flips the Touch Bar between the
//! app strip and the full Control Strip on a double Command press
//!
//! Components:
//! - Global modifier monitoring via CGEventTap
//! - Double-press detection and toggle sequencing (`defaults`, `launchctl`, `pkill`)
//! - Notification surface (log, optional modal alerts)
//! - IPC server for status queries, manual toggles and event subscription

mod config;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod notify;
mod security;
mod state;
mod toggle;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::StateEvent;
use crate::hotkey::{DoublePressDetector, HotkeyListener};
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::notify::{DialogNotifier, LogNotifier, Notifier};
use crate::state::Controller;
use crate::toggle::{SystemRunner, ToggleSequencer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "touchbar-toggler starting");

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        socket_path = ?config.socket_path,
        threshold_ms = config.double_press_threshold.as_millis() as u64,
        command_timeout = ?config.command_timeout,
        failure_policy = ?config.failure_policy,
        "configuration loaded"
    );

    let shutdown = ShutdownSignal::new();

    // Hotkey listener -> controller
    let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
    // IPC server -> controller (manual toggles)
    let (control_tx, control_rx) = mpsc::channel(8);
    // Controller -> notifier, IPC server
    let (event_tx, _event_rx) = broadcast::channel::<StateEvent>(64);

    let runner = SystemRunner::new(config.command_timeout);
    let sequencer = ToggleSequencer::new(runner, config.failure_policy, event_tx.clone());
    let detector = DoublePressDetector::new(config.double_press_threshold);
    let mut controller = Controller::new(detector, sequencer, event_tx.clone());

    let mut notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
    if config.dialogs && cfg!(target_os = "macos") {
        notifiers.push(Box::new(DialogNotifier));
    }
    let notifier_task = tokio::spawn(notify::run_notifier(notifiers, event_tx.subscribe()));

    let hotkey_listener = HotkeyListener::new(hotkey_tx);
    let hotkey_registered = match hotkey_listener.start() {
        Ok(()) => {
            info!("hotkey listener started");
            true
        }
        Err(e) => {
            error!(%e, "failed to start hotkey listener");
            warn!("continuing without the double-press gesture - manual toggles still work over IPC");
            false
        }
    };

    let server = Server::with_events(&config.socket_path, control_tx, event_tx.clone())?;
    server.set_hotkey_registered(hotkey_registered).await;

    let mut ipc_event_rx = event_tx.subscribe();

    if config.sip_check {
        let sip_tx = event_tx.clone();
        tokio::spawn(async move {
            security::check_sip(&sip_tx).await;
        });
    }

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Detect double-presses and run toggles
        _ = controller.run(hotkey_rx, control_rx) => {
            info!("controller exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC status in step with the controller
        _ = async {
            loop {
                match ipc_event_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "state event");
                        server.record_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "state event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("state event handler exited");
        }

        reason = async {
            match shutdown.wait().await {
                Ok(reason) => reason,
                Err(e) => {
                    error!(?e, "failed to register signal handlers");
                    std::future::pending().await
                }
            }
        } => {
            info!(%reason, "shutdown signal received");
        }
    }

    info!("shutting down...");

    hotkey_listener.stop();
    server.shutdown().await;
    notifier_task.abort();

    info!("touchbar-toggler stopped");

    Ok(())
}
