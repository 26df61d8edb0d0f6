//! Hardware abstraction traits for the serial link and the time source.
//!
//! This module defines the two primitives the command station core consumes
//! from its environment, so the same scheduling code runs against a real
//! UART, a channel bridge, or the desktop mocks.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`SerialPort`] | Non-blocking byte poll, blocking write |
//! | [`Clock`] | Monotonic milliseconds and a blocking sleep |
//!
//! # Implementation
//!
//! For testing and desktop development, use the mock implementations
//! from [`crate::hal::mock`].
//!
//! # Example
//!
//! ```rust
//! use dcc_station::traits::{Clock, SerialPort};
//! use dcc_station::hal::{MockClock, MockSerial};
//!
//! let mut port = MockSerial::new();
//! port.queue_inbound(&[0xFC]);
//! assert_eq!(port.read_byte().unwrap(), Some(0xFC));
//! assert_eq!(port.read_byte().unwrap(), None);
//!
//! let clock = MockClock::new();
//! clock.sleep_ms(5);
//! assert_eq!(clock.now_ms(), 5);
//! ```

/// Direction of locomotive travel as carried in DCC speed packets.
///
/// # Default
///
/// Defaults to [`Forward`](Self::Forward), matching a freshly reset decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// Moving forward (direction bit set).
    #[default]
    Forward,
    /// Moving in reverse (direction bit clear).
    Reverse,
}

impl Direction {
    /// Returns the direction as a lowercase string.
    ///
    /// # Examples
    ///
    /// ```
    /// use dcc_station::Direction;
    ///
    /// assert_eq!(Direction::Forward.as_str(), "forward");
    /// assert_eq!(Direction::Reverse.as_str(), "reverse");
    /// ```
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }

    /// Parse direction from text input.
    ///
    /// Accepts `"forward"`/`"fwd"`/`"1"` and `"reverse"`/`"rev"`/`"0"`.
    /// Input is trimmed and case-insensitive.
    ///
    /// # Examples
    ///
    /// ```
    /// use dcc_station::Direction;
    ///
    /// assert_eq!(Direction::from_text("fwd"), Some(Direction::Forward));
    /// assert_eq!(Direction::from_text("  REV "), Some(Direction::Reverse));
    /// assert_eq!(Direction::from_text("sideways"), None);
    /// ```
    pub fn from_text(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("forward") || s.eq_ignore_ascii_case("fwd") || s == "1" {
            Some(Direction::Forward)
        } else if s.eq_ignore_ascii_case("reverse") || s.eq_ignore_ascii_case("rev") || s == "0" {
            Some(Direction::Reverse)
        } else {
            None
        }
    }

    /// The DCC direction bit (1 = forward).
    #[inline]
    pub const fn bit(&self) -> u8 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => 0,
        }
    }

    /// The opposite direction.
    #[inline]
    pub const fn reversed(&self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// Byte-level serial link to the track controller.
///
/// Implement this for your UART driver. Reads must never block: the core
/// polls from its single control loop and relies on `Ok(None)` to move on.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use dcc_station::traits::SerialPort;
///
/// struct Uart { /* driver handle */ }
///
/// impl SerialPort for Uart {
///     type Error = UartError;
///
///     fn read_byte(&mut self) -> Result<Option<u8>, UartError> {
///         // Check the RX FIFO without waiting...
///         Ok(None)
///     }
///
///     fn write_all(&mut self, bytes: &[u8]) -> Result<(), UartError> {
///         // Push into the TX FIFO, blocking until accepted...
///         Ok(())
///     }
/// }
/// ```
pub trait SerialPort {
    /// Error type for port operations.
    type Error: core::fmt::Debug;

    /// Returns the next received byte, or `Ok(None)` if nothing is waiting.
    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error>;

    /// Writes every byte, blocking until the port has accepted them.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Monotonic time source with a blocking sleep.
///
/// The sleep is only used by the two bounded waits in the core (flow-control
/// wait and CV read polling), both of which have explicit deadlines.
///
/// # Example
///
/// ```rust
/// use dcc_station::traits::Clock;
/// use dcc_station::hal::MockClock;
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.advance(100);
/// assert_eq!(clock.now_ms(), 100);
/// ```
pub trait Clock {
    /// Returns current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;

    /// Blocks the caller for roughly `ms` milliseconds.
    fn sleep_ms(&self, ms: u32);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn sleep_ms(&self, ms: u32) {
        (**self).sleep_ms(ms)
    }
}
