//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `mock`: Test implementations for desktop development
//! - `system`: Wall-clock time source (requires `std`)
//! - `channel`: Serial port bridged over tokio channels (requires `bridge`)

pub mod mock;

#[cfg(feature = "std")]
pub mod system;

#[cfg(feature = "bridge")]
pub mod channel;

pub use mock::*;

#[cfg(feature = "std")]
pub use system::*;

#[cfg(feature = "bridge")]
pub use channel::*;
