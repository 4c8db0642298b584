//! `csrutil status` probe

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::events::StateEvent;

const CSRUTIL: &str = "/usr/bin/csrutil";

/// System Integrity Protection posture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SipStatus {
    Enabled,
    Disabled,
}

/// Interpret `csrutil status` output. Any mention of "enabled" counts as
/// protective, including custom configurations that keep some protections.
pub fn parse_csrutil_status(output: &str) -> SipStatus {
    if output.to_ascii_lowercase().contains("enabled") {
        SipStatus::Enabled
    } else {
        SipStatus::Disabled
    }
}

async fn query_status() -> Result<SipStatus> {
    let output = Command::new(CSRUTIL)
        .arg("status")
        .output()
        .await
        .context("failed to run csrutil")?;

    Ok(parse_csrutil_status(&String::from_utf8_lossy(&output.stdout)))
}

/// Run the one-time check and emit `SipEnabled` if protection is on.
/// Failures are logged; the daemon keeps running either way.
pub async fn check_sip(event_tx: &broadcast::Sender<StateEvent>) -> Option<SipStatus> {
    report_sip(query_status().await, event_tx)
}

fn report_sip(
    status: Result<SipStatus>,
    event_tx: &broadcast::Sender<StateEvent>,
) -> Option<SipStatus> {
    match status {
        Ok(SipStatus::Enabled) => {
            warn!("System Integrity Protection is enabled, toggles will likely fail");
            let _ = event_tx.send(StateEvent::SipEnabled);
            Some(SipStatus::Enabled)
        }
        Ok(SipStatus::Disabled) => {
            info!("System Integrity Protection is disabled");
            Some(SipStatus::Disabled)
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "could not determine SIP status");
            None
        }
    }
}
