//! Serial transport: framing, flow control, and inbound buffering.
//!
//! [`Transport`] owns the serial port, the inbound [`FrameDecoder`] and the
//! `channel_stopped` flag toggled by out-of-frame `STOP`/`CONTINUE` bytes.
//!
//! # Flow control
//!
//! While stopped, [`Transport::send_frame`] polls the decoder for a
//! `CONTINUE`, sleeping between polls. If none arrives within the configured
//! number of polls it clears the flag itself, logs a warning, and sends
//! anyway: a silent peer can delay the sender but never stall it.
//!
//! Frames decoded during that wait are kept in a bounded queue and returned
//! by later [`Transport::poll`] calls. When the queue is full the newest
//! frame is dropped.
//!
//! # Example
//!
//! ```rust
//! use dcc_station::hal::{MockClock, MockSerial};
//! use dcc_station::transport::{SendOutcome, Transport};
//! use dcc_station::protocol::STOP;
//! use dcc_station::traits::Clock;
//!
//! let mut port = MockSerial::new();
//! port.queue_inbound(&[STOP]);
//! let mut transport = Transport::new(port);
//! let clock = MockClock::new();
//!
//! transport.poll().unwrap();
//! assert!(transport.is_stopped());
//!
//! // Nobody sends CONTINUE: the frame goes out after ~100 ms anyway.
//! let outcome = transport.send_frame(&[0x01], &clock).unwrap();
//! assert_eq!(outcome, SendOutcome::ForcedContinue);
//! assert_eq!(clock.now_ms(), 100);
//! ```

use heapless::Deque;

use crate::codec::{encode_frame, DecodeEvent, FrameDecoder, Payload};
use crate::commands::DccCommand;
use crate::error::StationError;
use crate::traits::{Clock, SerialPort};

/// Decoded frames buffered while waiting on flow control.
pub const PENDING_FRAMES: usize = 16;

/// Upper bound on bytes read per pump, so a chatty peer cannot starve the loop.
pub const MAX_BYTES_PER_PUMP: usize = 512;

/// Counters for link health.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Frames written.
    pub frames_sent: u32,
    /// Complete frames decoded.
    pub frames_received: u32,
    /// Decoder resynchronisations.
    pub desyncs: u32,
    /// Flow-control waits that timed out.
    pub forced_continues: u32,
    /// Inbound frames dropped because the pending queue was full.
    pub dropped_frames: u32,
}

/// How a frame left the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Sent normally (possibly after a CONTINUE).
    Sent,
    /// The peer stayed stopped; sent after the wait expired.
    ForcedContinue,
}

/// Framed serial link with flow control.
pub struct Transport<P: SerialPort> {
    port: P,
    decoder: FrameDecoder,
    channel_stopped: bool,
    pending: Deque<Payload, PENDING_FRAMES>,
    stats: TransportStats,
    flow_control_polls: u32,
    poll_interval_ms: u32,
}

impl<P: SerialPort> Transport<P> {
    /// Wrap a port with the default flow-control wait (100 × 1 ms).
    pub fn new(port: P) -> Self {
        Self {
            port,
            decoder: FrameDecoder::new(),
            channel_stopped: false,
            pending: Deque::new(),
            stats: TransportStats::default(),
            flow_control_polls: 100,
            poll_interval_ms: 1,
        }
    }

    /// Set how long a send waits for `CONTINUE`.
    pub fn with_flow_control(mut self, polls: u32, poll_interval_ms: u32) -> Self {
        self.flow_control_polls = polls;
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// True while the peer has asked us to stop.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.channel_stopped
    }

    /// Link counters.
    #[inline]
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// The underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// The underlying port, mutably.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Read what the port has and return the next decoded frame, if any.
    pub fn poll(&mut self) -> Result<Option<Payload>, P::Error> {
        if self.pending.is_empty() {
            self.pump()?;
        }
        Ok(self.pending.pop_front())
    }

    /// Frame and send `payload`, honouring flow control.
    pub fn send_frame<C: Clock>(
        &mut self,
        payload: &[u8],
        clock: &C,
    ) -> Result<SendOutcome, StationError<P::Error>> {
        let frame = encode_frame(payload)?;

        let outcome = if self.channel_stopped && self.wait_for_continue(clock)? {
            SendOutcome::ForcedContinue
        } else {
            SendOutcome::Sent
        };

        self.port.write_all(&frame).map_err(StationError::Serial)?;
        self.stats.frames_sent = self.stats.frames_sent.wrapping_add(1);
        tracing::trace!(tag = payload[0], len = payload.len(), "frame sent");
        Ok(outcome)
    }

    /// Encode and send one command.
    pub fn send_command<C: Clock>(
        &mut self,
        command: &DccCommand,
        clock: &C,
    ) -> Result<SendOutcome, StationError<P::Error>> {
        tracing::debug!(?command, "send");
        self.send_frame(&command.encode(), clock)
    }

    /// Poll for `CONTINUE`; returns true if the wait expired and was forced.
    fn wait_for_continue<C: Clock>(&mut self, clock: &C) -> Result<bool, StationError<P::Error>> {
        let started = clock.now_ms();
        for _ in 0..self.flow_control_polls {
            self.pump().map_err(StationError::Serial)?;
            if !self.channel_stopped {
                return Ok(false);
            }
            clock.sleep_ms(self.poll_interval_ms);
        }
        self.pump().map_err(StationError::Serial)?;
        if !self.channel_stopped {
            return Ok(false);
        }

        tracing::warn!(
            waited_ms = clock.now_ms().saturating_sub(started),
            "no CONTINUE from controller, resuming transmission"
        );
        self.channel_stopped = false;
        self.stats.forced_continues = self.stats.forced_continues.wrapping_add(1);
        Ok(true)
    }

    /// Feed available bytes through the decoder.
    fn pump(&mut self) -> Result<(), P::Error> {
        for _ in 0..MAX_BYTES_PER_PUMP {
            let Some(byte) = self.port.read_byte()? else {
                break;
            };
            match self.decoder.push(byte) {
                None => {}
                Some(DecodeEvent::Stop) => self.channel_stopped = true,
                Some(DecodeEvent::Continue) => self.channel_stopped = false,
                Some(DecodeEvent::Desync(reason)) => {
                    self.stats.desyncs = self.stats.desyncs.wrapping_add(1);
                    tracing::warn!(?reason, "frame desync, resynchronising");
                }
                Some(DecodeEvent::Frame(frame)) => {
                    self.stats.frames_received = self.stats.frames_received.wrapping_add(1);
                    if self.pending.push_back(frame).is_err() {
                        self.stats.dropped_frames = self.stats.dropped_frames.wrapping_add(1);
                        tracing::warn!(
                            capacity = PENDING_FRAMES,
                            "inbound frame queue full, dropping frame"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}
