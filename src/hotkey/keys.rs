//! Modifier key definitions and state tracking
//!
//! Provides the macOS modifier flag masks and a struct describing which
//! modifiers are active in a single flags-changed event.

/// Modifier key flag masks, matching the `kCGEventFlagMask*` values
pub mod flags {
    /// Shift key modifier flag
    pub const SHIFT: u64 = 0x0002_0000;
    /// Control key modifier flag
    pub const CONTROL: u64 = 0x0004_0000;
    /// Option/Alt key modifier flag
    pub const OPTION: u64 = 0x0008_0000;
    /// Command key modifier flag
    pub const COMMAND: u64 = 0x0010_0000;
}

/// Which modifier keys are active in an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    /// Control key is held
    pub control: bool,
    /// Option/Alt key is held
    pub option: bool,
    /// Command key is held
    pub command: bool,
    /// Shift key is held
    pub shift: bool,
}

impl ModifierState {
    /// Build a ModifierState from a raw event flag word
    pub fn from_bits(bits: u64) -> Self {
        Self {
            control: bits & flags::CONTROL != 0,
            option: bits & flags::OPTION != 0,
            command: bits & flags::COMMAND != 0,
            shift: bits & flags::SHIFT != 0,
        }
    }

    /// Build a ModifierState from CGEventFlags
    #[cfg(target_os = "macos")]
    pub fn from_flags(flags: core_graphics::event::CGEventFlags) -> Self {
        Self::from_bits(flags.bits())
    }

    /// State with only Command held
    #[cfg(test)]
    pub fn command_only() -> Self {
        Self {
            command: true,
            ..Self::default()
        }
    }
}
