//! # dcc-station
//!
//! Host-side core of a DCC model-railway command station: it turns intents
//! ("run locomotive 3 at speed 40", "turn F2 off in two seconds") into framed
//! binary commands for a track controller on a serial link, and decodes the
//! controller's telemetry back into state.
//!
//! ## Features
//!
//! - **Packet scheduling**: every locomotive cycles through a 10-step sequence
//!   interleaving speed and function-group refreshes; add-ons run at a
//!   quarter of the rate
//! - **Speed ramps**: linear, tick-rate independent, never passing the
//!   emergency-stop step
//! - **Deferred events**: a fixed table of de-duplicated actions fired after a
//!   delay, including a non-blocking wait-for-free-detector
//! - **Framed transport**: escaped frames with STOP/CONTINUE flow control that
//!   can delay, but never stall, the sender
//! - **Telemetry**: current, RailCom, S88 occupancy, CV results, debug text
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Serial port and clock abstractions
//! - `codec` / `transport` - Wire framing and flow control
//! - `commands` - Downstream command set and payload encoding
//! - `entity` / `scheduler` - Locomotives, add-ons and packet selection
//! - `events` - Deferred action table
//! - `telemetry` - Upstream parsing and dispatch
//! - `station` - Main loop that ties everything together
//! - `hal` - Concrete implementations (mocks, system clock, channel bridge)
//!
//! ## Example
//!
//! ```rust
//! use dcc_station::{CommandStation, Direction, EventAction};
//! use dcc_station::commands::SpeedSteps;
//! use dcc_station::hal::{MockClock, MockSerial};
//! use dcc_station::traits::Clock;
//!
//! let clock = MockClock::new();
//! let mut station = CommandStation::new(MockSerial::new(), clock.clone());
//!
//! let loco = station.add_locomotive(3, SpeedSteps::Steps128).unwrap();
//! station.set_speed(loco, 20).unwrap();
//!
//! // Reverse in half a second
//! station
//!     .add_event(5, EventAction::LocoDirection { loco, direction: Direction::Reverse })
//!     .unwrap();
//!
//! // Main loop
//! while clock.now_ms() < 1000 {
//!     station.tick().unwrap();
//!     clock.advance(5);
//! }
//! assert_eq!(station.get_direction(loco), Some(Direction::Reverse));
//! assert_eq!(station.get_speed(loco), Some(0));
//! ```

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Downstream command set and payload encoding.
pub mod commands;
/// Frame encoder and byte-at-a-time decoder.
pub mod codec;
/// Station configuration with builder methods.
pub mod config;
/// Locomotives, add-ons and their function state.
pub mod entity;
/// Error types.
pub mod error;
/// Deferred, de-duplicated action table.
pub mod events;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Log verbosity and optional subscriber setup.
pub mod logging;
/// Wire constants and message tags.
pub mod protocol;
/// Transactional locomotive renumbering.
pub mod reindex;
/// Per-entity packet selection and round fairness.
pub mod scheduler;
/// The command station main loop and API.
pub mod station;
/// Upstream telemetry parsing and state.
pub mod telemetry;
/// Core traits for hardware abstraction.
pub mod traits;
/// Serial link with flow control.
pub mod transport;

pub use commands::{DccCommand, FunctionGroup, SpeedSteps, TrackMode};
pub use config::StationConfig;
pub use entity::{AddonId, FunctionMeta, LocoId};
pub use error::{CodecError, EventError, StationError, TelemetryError};
pub use events::{EventAction, EventKey, SpeedBound};
pub use station::{CommandStation, ExternalAction};
pub use traits::{Clock, Direction, SerialPort};
