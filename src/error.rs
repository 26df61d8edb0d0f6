//! Error types for the command station core.
//!
//! Nothing here is fatal to the control loop: every variant describes a
//! dropped operation the caller may retry or ignore.

use core::fmt::Debug;

use thiserror::Error;

/// Framing errors on the outbound side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Frames must carry at least a tag byte.
    #[error("empty payload")]
    EmptyPayload,

    /// The payload does not fit in one frame.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Bytes offered.
        size: usize,
        /// Bytes allowed.
        max: usize,
    },
}

/// Problems parsing an inbound telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TelemetryError {
    /// Tag byte did not match any known message.
    #[error("unknown telemetry tag 0x{0:02X}")]
    UnknownTag(u8),

    /// Payload shorter than the message requires.
    #[error("truncated telemetry 0x{tag:02X}: need {needed} bytes, got {actual}")]
    Truncated {
        /// Message tag.
        tag: u8,
        /// Minimum payload length.
        needed: usize,
        /// Length received.
        actual: usize,
    },

    /// Debug text was not valid UTF-8.
    #[error("debug text is not valid utf-8")]
    InvalidText,
}

/// The event table has no free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EventError {
    /// All slots are occupied; the event was dropped.
    #[error("event table full ({capacity} slots)")]
    TableFull {
        /// Number of slots.
        capacity: usize,
    },
}

/// Errors surfaced by [`CommandStation`](crate::CommandStation) operations.
///
/// `E` is the serial port's associated error type.
#[derive(Debug, Error)]
pub enum StationError<E: Debug> {
    /// The serial port reported an error.
    #[error("serial port error: {0:?}")]
    Serial(E),

    /// A frame could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The event table could not take an event the operation depends on.
    #[error("{0}")]
    Event(#[from] EventError),

    /// An entity table is at capacity.
    #[error("{table} table full ({capacity} entries)")]
    CapacityExhausted {
        /// Which table.
        table: &'static str,
        /// Its capacity.
        capacity: usize,
    },

    /// No locomotive at this index.
    #[error("unknown locomotive {0}")]
    UnknownLocomotive(u16),

    /// No add-on at this index.
    #[error("unknown add-on {0}")]
    UnknownAddon(u16),

    /// Function index outside F0–F31.
    #[error("function index {0} out of range")]
    FunctionOutOfRange(u8),

    /// A reorder did not name every locomotive exactly once.
    #[error("invalid reorder: {0}")]
    InvalidReorder(&'static str),

    /// No CV result arrived before the deadline.
    #[error("cv {cv} read timed out after {timeout_ms} ms")]
    CvTimeout {
        /// CV number.
        cv: u16,
        /// Deadline that expired.
        timeout_ms: u64,
    },

    /// The decoder answered but did not acknowledge the CV.
    #[error("cv {cv} not acknowledged by decoder")]
    CvNotAcknowledged {
        /// CV number.
        cv: u16,
    },

    /// A verified write read back a different value.
    #[error("cv {cv} verify mismatch: wrote {written}, read {read}")]
    CvVerifyMismatch {
        /// CV number.
        cv: u16,
        /// Value written.
        written: u8,
        /// Value read back.
        read: u8,
    },
}

impl<E: Debug> StationError<E> {
    /// True for errors that describe caller misuse rather than the link.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            StationError::UnknownLocomotive(_)
                | StationError::UnknownAddon(_)
                | StationError::FunctionOutOfRange(_)
                | StationError::InvalidReorder(_)
        )
    }
}
