//! Toggle module: command sequences and their execution

pub mod commands;
mod runner;
mod sequencer;

pub use runner::{CommandRunner, SystemRunner};
pub use sequencer::{FailurePolicy, ToggleOutcome, ToggleSequencer};

#[cfg(test)]
pub(crate) use sequencer::testing;
