//! Touch Bar command sequences
//!
//! The exact `defaults`, `launchctl` and `pkill` invocations that switch the
//! Touch Bar between the app strip and the full Control Strip. Order matters:
//! the service reloads and restarts assume the preference writes before them.

use std::fmt;

use crate::state::TouchBarState;

const DEFAULTS: &str = "/usr/bin/defaults";
const LAUNCHCTL: &str = "/bin/launchctl";
const PKILL: &str = "/usr/bin/pkill";

/// Preference domain of the Touch Bar agent
pub const TOUCHBAR_DOMAIN: &str = "com.apple.touchbar.agent";

/// Dictionary written to `PresentationModeFnModes` when re-enabling
pub const PRESENTATION_FN_MODES: &str = "<dict><key>app</key><string>fullControlStrip</string><key>appWithControlStrip</key><string>fullControlStrip</string><key>fullControlStrip</key><string>app</string></dict>";

/// Service descriptors reloaded on every toggle
pub const SERVICE_DESCRIPTORS: [&str; 3] = [
    "/System/Library/LaunchAgents/com.apple.controlstrip.plist",
    "/System/Library/LaunchAgents/com.apple.touchbar.agent.plist",
    "/System/Library/LaunchDaemons/com.apple.touchbar.user-device.plist",
];

/// Processes terminated so the OS relaunches them with new settings
pub const RESTARTED_PROCESSES: [&str; 3] = ["ControlStrip", "Touch Bar agent", "Dock"];

/// Exit status of `defaults delete` for an absent key and of `pkill` when
/// nothing matched
const ALREADY_IN_PLACE: i32 = 1;

/// One external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStep {
    pub program: String,
    pub args: Vec<String>,
    /// Exit code that means the target is already in place; any other
    /// non-zero exit is still a failure
    pub tolerated_exit: Option<i32>,
}

impl CommandStep {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            tolerated_exit: None,
        }
    }

    pub fn tolerating(mut self, code: i32) -> Self {
        self.tolerated_exit = Some(code);
        self
    }

    pub fn tolerates(&self, code: i32) -> bool {
        self.tolerated_exit == Some(code)
    }
}

impl fmt::Display for CommandStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Steps that bring the Touch Bar into `target`
pub fn sequence_for(target: TouchBarState) -> Vec<CommandStep> {
    match target {
        TouchBarState::Enabled => enable_sequence(),
        TouchBarState::Disabled => disable_sequence(),
    }
}

/// Restore the app strip: drop the global override, reset the fn modes,
/// load the services and restart them
pub fn enable_sequence() -> Vec<CommandStep> {
    let mut steps = vec![
        CommandStep::new(
            DEFAULTS,
            &["delete", TOUCHBAR_DOMAIN, "PresentationModeGlobal"],
        )
        .tolerating(ALREADY_IN_PLACE),
        CommandStep::new(
            DEFAULTS,
            &[
                "write",
                TOUCHBAR_DOMAIN,
                "PresentationModeFnModes",
                PRESENTATION_FN_MODES,
            ],
        ),
    ];
    steps.extend(service_steps("load"));
    steps.extend(restart_steps());
    steps
}

/// Pin the full Control Strip and unload the services
pub fn disable_sequence() -> Vec<CommandStep> {
    let mut steps = vec![CommandStep::new(
        DEFAULTS,
        &[
            "write",
            TOUCHBAR_DOMAIN,
            "PresentationModeGlobal",
            "-string",
            "fullControlStrip",
        ],
    )];
    steps.extend(service_steps("unload"));
    steps.extend(restart_steps());
    steps
}

fn service_steps(verb: &str) -> impl Iterator<Item = CommandStep> + '_ {
    SERVICE_DESCRIPTORS
        .into_iter()
        .map(move |path| CommandStep::new(LAUNCHCTL, &[verb, path]))
}

fn restart_steps() -> impl Iterator<Item = CommandStep> {
    RESTARTED_PROCESSES
        .into_iter()
        .map(|name| CommandStep::new(PKILL, &[name]).tolerating(ALREADY_IN_PLACE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_sequence_order() {
        let steps = enable_sequence();
        assert_eq!(steps.len(), 8);

        assert_eq!(steps[0].program, DEFAULTS);
        assert_eq!(steps[0].args, ["delete", TOUCHBAR_DOMAIN, "PresentationModeGlobal"]);
        assert_eq!(steps[0].tolerated_exit, Some(1));

        assert_eq!(steps[1].args[0], "write");
        assert_eq!(steps[1].args[2], "PresentationModeFnModes");
        assert_eq!(steps[1].args[3], PRESENTATION_FN_MODES);
        assert_eq!(steps[1].tolerated_exit, None);

        for (step, path) in steps[2..5].iter().zip(SERVICE_DESCRIPTORS) {
            assert_eq!(step.program, LAUNCHCTL);
            assert_eq!(step.args, ["load", path]);
        }
        for (step, name) in steps[5..].iter().zip(RESTARTED_PROCESSES) {
            assert_eq!(step.program, PKILL);
            assert_eq!(step.args, [name]);
            assert!(step.tolerates(1));
            assert!(!step.tolerates(3));
        }
    }

    #[test]
    fn test_disable_sequence_order() {
        let steps = disable_sequence();
        assert_eq!(steps.len(), 7);

        assert_eq!(
            steps[0].args,
            ["write", TOUCHBAR_DOMAIN, "PresentationModeGlobal", "-string", "fullControlStrip"]
        );
        for (step, path) in steps[1..4].iter().zip(SERVICE_DESCRIPTORS) {
            assert_eq!(step.args, ["unload", path]);
        }
        let restarted: Vec<_> = steps[4..].iter().map(|s| s.args[0].as_str()).collect();
        assert_eq!(restarted, RESTARTED_PROCESSES);
    }

    #[test]
    fn test_sequence_for_target() {
        assert_eq!(sequence_for(TouchBarState::Enabled), enable_sequence());
        assert_eq!(sequence_for(TouchBarState::Disabled), disable_sequence());
    }

    #[test]
    fn test_display_quotes_spaced_args() {
        let step = CommandStep::new(PKILL, &["Touch Bar agent"]);
        assert_eq!(step.to_string(), "/usr/bin/pkill \"Touch Bar agent\"");
    }
}
