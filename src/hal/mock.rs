//! Mock implementations for testing without hardware.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockClock`] | [`Clock`] | Controllable time; `sleep_ms` advances it |
//! | [`MockSerial`] | [`SerialPort`] | Scripted inbound bytes, captured outbound bytes |
//!
//! Clones of a [`MockClock`] share the same time, so a [`MockSerial`] built
//! with [`MockSerial::with_clock`] can release bytes at a given instant while
//! the station sleeps on the same clock.
//!
//! # Example
//!
//! ```rust
//! use dcc_station::hal::{MockClock, MockSerial};
//! use dcc_station::traits::{Clock, SerialPort};
//!
//! let clock = MockClock::new();
//! let mut port = MockSerial::with_clock(clock.clone());
//! port.queue_inbound_at(50, &[0xFB]);
//!
//! assert_eq!(port.read_byte().unwrap(), None);
//! clock.sleep_ms(50);
//! assert_eq!(port.read_byte().unwrap(), Some(0xFB));
//! ```
//!
//! [`Clock`]: crate::traits::Clock
//! [`SerialPort`]: crate::traits::SerialPort

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::Cell;

use crate::codec::{DecodeEvent, FrameDecoder, Payload};
use crate::traits::{Clock, SerialPort};

// ============================================================================
// Clock
// ============================================================================

/// Mock clock for testing.
///
/// Time only moves when told to; [`Clock::sleep_ms`] advances it by the
/// requested amount, so bounded waits finish instantly in tests.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    current_ms: Rc<Cell<u64>>,
}

impl MockClock {
    /// Creates a new mock clock starting at 0ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time in milliseconds.
    pub fn set(&self, ms: u64) {
        self.current_ms.set(ms);
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, ms: u64) {
        self.current_ms.set(self.current_ms.get() + ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms.get()
    }

    fn sleep_ms(&self, ms: u32) {
        self.advance(u64::from(ms));
    }
}

// ============================================================================
// Serial
// ============================================================================

/// Mock serial port.
///
/// Inbound bytes are queued by the test (optionally with a release time);
/// everything written is appended to [`written`](Self::written).
#[derive(Debug, Default)]
pub struct MockSerial {
    /// Every byte written by the station, in order.
    pub written: Vec<u8>,
    inbound: VecDeque<(u64, u8)>,
    clock: Option<MockClock>,
    /// When set, `write_all` fails with this error.
    pub fail_writes: bool,
}

/// Error produced by [`MockSerial`] when `fail_writes` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockSerialError;

impl MockSerial {
    /// A port with no clock: queued bytes are available immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// A port that releases timed bytes according to `clock`.
    pub fn with_clock(clock: MockClock) -> Self {
        Self {
            clock: Some(clock),
            ..Self::default()
        }
    }

    /// Queue bytes that are readable right away.
    pub fn queue_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().map(|&b| (0, b)));
    }

    /// Queue bytes that become readable at `at_ms`.
    pub fn queue_inbound_at(&mut self, at_ms: u64, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().map(|&b| (at_ms, b)));
    }

    /// Bytes still waiting to be read.
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Decode everything written so far into frame payloads.
    pub fn written_frames(&self) -> Vec<Payload> {
        let mut decoder = FrameDecoder::new();
        self.written
            .iter()
            .filter_map(|&b| match decoder.push(b) {
                Some(DecodeEvent::Frame(frame)) => Some(frame),
                _ => None,
            })
            .collect()
    }

    /// Forget everything written so far.
    pub fn clear_written(&mut self) {
        self.written.clear();
    }

    fn now_ms(&self) -> u64 {
        self.clock.as_ref().map_or(u64::MAX, Clock::now_ms)
    }
}

impl SerialPort for MockSerial {
    type Error = MockSerialError;

    fn read_byte(&mut self) -> Result<Option<u8>, MockSerialError> {
        let now = self.now_ms();
        match self.inbound.front() {
            Some(&(at, byte)) if at <= now => {
                self.inbound.pop_front();
                Ok(Some(byte))
            }
            _ => Ok(None),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), MockSerialError> {
        if self.fail_writes {
            return Err(MockSerialError);
        }
        self.written.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_frame;

    #[test]
    fn clock_clones_share_time() {
        let a = MockClock::new();
        let b = a.clone();
        a.advance(30);
        b.sleep_ms(20);
        assert_eq!(a.now_ms(), 50);
        a.set(7);
        assert_eq!(b.now_ms(), 7);
    }

    #[test]
    fn serial_without_clock_releases_everything() {
        let mut port = MockSerial::new();
        port.queue_inbound_at(1_000_000, &[1]);
        assert_eq!(port.read_byte().unwrap(), Some(1));
        assert_eq!(port.read_byte().unwrap(), None);
    }

    #[test]
    fn timed_bytes_wait_for_clock() {
        let clock = MockClock::new();
        let mut port = MockSerial::with_clock(clock.clone());
        port.queue_inbound(&[1]);
        port.queue_inbound_at(10, &[2]);
        assert_eq!(port.read_byte().unwrap(), Some(1));
        assert_eq!(port.read_byte().unwrap(), None);
        assert_eq!(port.inbound_len(), 1);
        clock.advance(10);
        assert_eq!(port.read_byte().unwrap(), Some(2));
        assert_eq!(port.inbound_len(), 0);
    }

    #[test]
    fn written_frames_decodes_output() {
        let mut port = MockSerial::new();
        port.write_all(&encode_frame(&[0x01]).unwrap()).unwrap();
        port.write_all(&encode_frame(&[0x22, 0xFD]).unwrap()).unwrap();
        let frames = port.written_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].as_slice(), &[0x22, 0xFD]);

        port.clear_written();
        assert!(port.written_frames().is_empty());
    }

    #[test]
    fn failing_writes() {
        let mut port = MockSerial::new();
        port.fail_writes = true;
        assert_eq!(port.write_all(&[1]), Err(MockSerialError));
        assert!(port.written.is_empty());
    }
}
