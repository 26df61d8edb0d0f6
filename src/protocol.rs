//! Wire-level constants shared by the codec, command encoder, and dispatcher.
//!
//! A frame on the wire is `START, length, escaped payload…, END`. The length
//! byte counts payload bytes *before* escaping and is never itself escaped;
//! it is bounded by [`MAX_PAYLOAD`], which keeps it below every reserved byte.
//!
//! Flow-control bytes ([`STOP`], [`CONTINUE`]) travel outside frames only.

/// Start-of-frame marker.
pub const START: u8 = 0xFF;
/// End-of-frame marker.
pub const END: u8 = 0xFE;
/// Escape marker: the next byte encodes `original - ESCAPE_OFFSET`.
pub const ESCAPE: u8 = 0xFD;
/// Offset subtracted from reserved bytes when escaping.
pub const ESCAPE_OFFSET: u8 = 0xF0;
/// Peer asks us to stop sending frames.
pub const STOP: u8 = 0xFC;
/// Peer allows frames again.
pub const CONTINUE: u8 = 0xFB;

/// Largest payload (tag included) a single frame may carry.
pub const MAX_PAYLOAD: usize = 128;

/// Worst-case size of an encoded frame: every payload byte escaped.
pub const MAX_ENCODED_FRAME: usize = 3 + 2 * MAX_PAYLOAD;

/// Returns true for bytes that must be escaped inside a frame.
#[inline]
pub const fn is_reserved(byte: u8) -> bool {
    matches!(byte, START | END | ESCAPE)
}

/// Command tags, host to controller (payload byte 0).
pub mod command {
    /// Enable track power.
    pub const BOOSTER_ON: u8 = 0x01;
    /// Disable track power.
    pub const BOOSTER_OFF: u8 = 0x02;
    /// Select operations or programming-track mode.
    pub const SET_MODE: u8 = 0x03;
    /// Tell the controller how many S88 contacts to scan.
    pub const S88_CONTACT_COUNT: u8 = 0x04;

    /// Read a CV on the programming track.
    pub const PGM_READ_CV: u8 = 0x10;
    /// Write a CV on the programming track.
    pub const PGM_WRITE_CV: u8 = 0x11;
    /// Read a CV on the main track (RailCom answer).
    pub const POM_READ_CV: u8 = 0x12;
    /// Write a CV on the main track.
    pub const POM_WRITE_CV: u8 = 0x13;

    /// 14-step speed and direction.
    pub const SPEED_14: u8 = 0x20;
    /// 28-step speed and direction.
    pub const SPEED_28: u8 = 0x21;
    /// 128-step speed and direction.
    pub const SPEED_128: u8 = 0x22;
    /// One function group.
    pub const FUNCTION_GROUP: u8 = 0x23;

    /// Decoder reset packet to all decoders.
    pub const RESET: u8 = 0x30;
    /// Broadcast stop.
    pub const STOP_ALL: u8 = 0x31;
    /// Broadcast emergency stop.
    pub const ESTOP_ALL: u8 = 0x32;

    /// Basic accessory output on.
    pub const BASE_ACCESSORY_SET: u8 = 0x40;
    /// Basic accessory output off.
    pub const BASE_ACCESSORY_RESET: u8 = 0x41;
}

/// Telemetry tags, controller to host (payload byte 0).
pub mod telemetry {
    /// Track current and voltage sample.
    pub const ADC: u8 = 0x80;
    /// RailCom channel 1 address broadcast.
    pub const RAILCOM_CH1: u8 = 0x81;
    /// RailCom channel 2 per-locomotive online bitmap.
    pub const RAILCOM_CH2_BITMAP: u8 = 0x82;
    /// CV read result from the main track.
    pub const POM_CV_RESULT: u8 = 0x83;
    /// CV read result from the programming track.
    pub const PGM_CV_RESULT: u8 = 0x84;
    /// Per-locomotive RailCom channel 2 answer rate.
    pub const RC2_RATE: u8 = 0x85;
    /// S88 occupancy bytes.
    pub const S88_STATUS: u8 = 0x86;
    /// RailCom-local detector hits for one track.
    pub const RCL_DETECTIONS: u8 = 0x87;
    /// Free-text debug line.
    pub const DEBUG_TEXT: u8 = 0x88;
}
