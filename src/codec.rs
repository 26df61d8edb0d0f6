//! Byte-stream framing with escaping.
//!
//! [`encode_frame`] turns a payload into `START, len, escaped…, END`;
//! [`FrameDecoder`] is the inverse, fed one byte at a time.
//!
//! The decoder never fails hard. A byte that violates the expected state
//! produces a [`DecodeEvent::Desync`] and the decoder restarts frame
//! acquisition, so a single dropped or corrupted byte costs at most the
//! frame it landed in.
//!
//! # Example
//!
//! ```rust
//! use dcc_station::codec::{encode_frame, DecodeEvent, FrameDecoder};
//!
//! let wire = encode_frame(&[0x22, 0xFF, 0x03]).unwrap();
//!
//! let mut decoder = FrameDecoder::new();
//! let mut frames = Vec::new();
//! for &byte in wire.iter() {
//!     if let Some(DecodeEvent::Frame(payload)) = decoder.push(byte) {
//!         frames.push(payload);
//!     }
//! }
//! assert_eq!(frames[0].as_slice(), &[0x22, 0xFF, 0x03]);
//! ```

use heapless::Vec;

use crate::error::CodecError;
use crate::protocol::{
    is_reserved, CONTINUE, END, ESCAPE, ESCAPE_OFFSET, MAX_ENCODED_FRAME, MAX_PAYLOAD, START, STOP,
};

/// A de-escaped frame payload; byte 0 is the message tag.
pub type Payload = Vec<u8, MAX_PAYLOAD>;

/// An encoded frame ready for the wire.
pub type EncodedFrame = Vec<u8, MAX_ENCODED_FRAME>;

/// Encode a payload into a complete wire frame.
///
/// Reserved bytes inside the payload are sent as `(ESCAPE, byte - OFFSET)`.
pub fn encode_frame(payload: &[u8]) -> Result<EncodedFrame, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(CodecError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    // Capacity covers the all-escaped worst case, so the pushes cannot fail.
    let mut out = EncodedFrame::new();
    let _ = out.push(START);
    let _ = out.push(payload.len() as u8);
    for &byte in payload {
        if is_reserved(byte) {
            let _ = out.push(ESCAPE);
            let _ = out.push(byte - ESCAPE_OFFSET);
        } else {
            let _ = out.push(byte);
        }
    }
    let _ = out.push(END);
    Ok(out)
}

/// Why the decoder dropped what it had and started over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Desync {
    /// `START` arrived while a frame was still open.
    UnexpectedStart,
    /// Length byte was zero or larger than [`MAX_PAYLOAD`].
    BadLength(u8),
    /// `END` arrived before `length` payload bytes.
    ShortFrame,
    /// A non-`END` byte arrived after the last payload byte.
    MissingEnd(u8),
    /// The byte after `ESCAPE` does not decode to a reserved byte.
    BadEscape(u8),
}

/// Output of [`FrameDecoder::push`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A complete, de-escaped payload.
    Frame(Payload),
    /// Out-of-frame `STOP`: the peer wants us to hold off.
    Stop,
    /// Out-of-frame `CONTINUE`: the peer is ready again.
    Continue,
    /// The stream broke framing; acquisition restarted.
    Desync(Desync),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    WaitStart,
    WaitLen,
    WaitEnd { expected: usize },
}

/// Inbound frame state machine: `WaitStart → WaitLen → WaitEnd`.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
    buffer: Payload,
    escape_pending: bool,
}

impl FrameDecoder {
    /// Creates a decoder waiting for `START`.
    pub const fn new() -> Self {
        Self {
            state: State::WaitStart,
            buffer: Vec::new(),
            escape_pending: false,
        }
    }

    /// Drop any partial frame and wait for the next `START`.
    pub fn reset(&mut self) {
        self.state = State::WaitStart;
        self.buffer.clear();
        self.escape_pending = false;
    }

    /// True while a frame is partially received.
    pub fn in_frame(&self) -> bool {
        self.state != State::WaitStart
    }

    /// Feed one raw byte.
    pub fn push(&mut self, byte: u8) -> Option<DecodeEvent> {
        match self.state {
            State::WaitStart => match byte {
                START => {
                    self.begin_frame();
                    None
                }
                STOP => Some(DecodeEvent::Stop),
                CONTINUE => Some(DecodeEvent::Continue),
                // Line noise between frames.
                _ => None,
            },

            State::WaitLen => {
                if byte == START {
                    self.begin_frame();
                    return Some(DecodeEvent::Desync(Desync::UnexpectedStart));
                }
                let len = byte as usize;
                if len == 0 || len > MAX_PAYLOAD {
                    self.reset();
                    return Some(DecodeEvent::Desync(Desync::BadLength(byte)));
                }
                self.state = State::WaitEnd { expected: len };
                None
            }

            State::WaitEnd { expected } => {
                if byte == START {
                    self.begin_frame();
                    return Some(DecodeEvent::Desync(Desync::UnexpectedStart));
                }

                if self.buffer.len() == expected {
                    if byte == END {
                        let frame = core::mem::take(&mut self.buffer);
                        self.reset();
                        return Some(DecodeEvent::Frame(frame));
                    }
                    self.reset();
                    return Some(DecodeEvent::Desync(Desync::MissingEnd(byte)));
                }

                match byte {
                    END => {
                        self.reset();
                        Some(DecodeEvent::Desync(Desync::ShortFrame))
                    }
                    ESCAPE if !self.escape_pending => {
                        self.escape_pending = true;
                        None
                    }
                    _ if self.escape_pending => {
                        self.escape_pending = false;
                        match byte.checked_add(ESCAPE_OFFSET) {
                            Some(decoded) if is_reserved(decoded) => {
                                // Length was validated, room is guaranteed.
                                let _ = self.buffer.push(decoded);
                                None
                            }
                            _ => {
                                self.reset();
                                Some(DecodeEvent::Desync(Desync::BadEscape(byte)))
                            }
                        }
                    }
                    _ => {
                        let _ = self.buffer.push(byte);
                        None
                    }
                }
            }
        }
    }

    fn begin_frame(&mut self) {
        self.buffer.clear();
        self.escape_pending = false;
        self.state = State::WaitLen;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
