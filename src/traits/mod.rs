//! Trait definitions for the hardware the command station talks to.
//!
//! The core consumes exactly two things from its environment:
//!
//! - [`SerialPort`]: byte-level link to the track controller
//! - [`Clock`]: monotonic milliseconds plus a blocking sleep
//!
//! Everything else (entity tables, events, framing) is owned by the core.

pub mod hardware;

pub use hardware::*;
