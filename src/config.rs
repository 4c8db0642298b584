//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::hotkey::DEFAULT_THRESHOLD;
use crate::toggle::FailurePolicy;

const ENV_PREFIX: &str = "TOUCHBAR_TOGGLER_";
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Maximum gap between two Command presses
    pub double_press_threshold: Duration,

    /// Per-step limit for external commands; `None` waits forever
    pub command_timeout: Option<Duration>,

    pub failure_policy: FailurePolicy,

    /// Show modal alert dialogs in addition to logging
    pub dialogs: bool,

    /// Run the System Integrity Protection check at startup
    pub sip_check: bool,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("touchbar-toggler");

        let socket_path = var("SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let double_press_threshold = match var("THRESHOLD_MS") {
            Some(raw) => {
                let ms = parse_u64("THRESHOLD_MS", &raw)?;
                if ms == 0 {
                    return Err(anyhow!("{ENV_PREFIX}THRESHOLD_MS must be greater than zero"));
                }
                Duration::from_millis(ms)
            }
            None => DEFAULT_THRESHOLD,
        };

        let command_timeout = match var("COMMAND_TIMEOUT_SECS") {
            Some(raw) => match parse_u64("COMMAND_TIMEOUT_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => Some(DEFAULT_COMMAND_TIMEOUT),
        };

        let failure_policy = match var("FAILURE_POLICY") {
            Some(raw) => raw
                .parse::<FailurePolicy>()
                .map_err(|e: String| anyhow!(e))
                .context(format!("invalid {ENV_PREFIX}FAILURE_POLICY"))?,
            None => FailurePolicy::default(),
        };

        let dialogs = var("DIALOGS")
            .map(|raw| parse_bool("DIALOGS", &raw))
            .transpose()?
            .unwrap_or(true);

        let sip_check = var("SIP_CHECK")
            .map(|raw| parse_bool("SIP_CHECK", &raw))
            .transpose()?
            .unwrap_or(true);

        Ok(Self {
            socket_path,
            data_dir,
            double_press_threshold,
            command_timeout,
            failure_policy,
            dialogs,
            sip_check,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn parse_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("invalid {ENV_PREFIX}{name}: '{raw}'"))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("invalid {ENV_PREFIX}{name}: '{raw}'")),
    }
}
