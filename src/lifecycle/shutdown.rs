//! Signal handling for graceful shutdown

use std::fmt;
use std::io;

use tokio::signal::unix::{signal, SignalKind};

/// Which signal asked the daemon to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// launchd unloading the agent, or `kill`
    Terminate,
    /// Ctrl-C in a terminal
    Interrupt,
    /// Controlling terminal closed
    Hangup,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Terminate => write!(f, "SIGTERM"),
            ShutdownReason::Interrupt => write!(f, "SIGINT"),
            ShutdownReason::Hangup => write!(f, "SIGHUP"),
        }
    }
}

/// Waits for SIGTERM, SIGINT or SIGHUP
#[derive(Debug, Default)]
pub struct ShutdownSignal;

impl ShutdownSignal {
    pub fn new() -> Self {
        Self
    }

    /// Register the handlers and wait for the first signal
    pub async fn wait(&self) -> io::Result<ShutdownReason> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let reason = tokio::select! {
            _ = sigterm.recv() => ShutdownReason::Terminate,
            _ = sigint.recv() => ShutdownReason::Interrupt,
            _ = sighup.recv() => ShutdownReason::Hangup,
        };

        Ok(reason)
    }
}
