//! Startup protection advisory
//!
//! Toggling needs to unload system launch agents, which System Integrity
//! Protection forbids. The daemon checks once at startup and warns.

mod sip;

pub use sip::check_sip;
