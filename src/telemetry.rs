//! Upstream telemetry: parsing and dispatch.
//!
//! [`Telemetry::parse`] turns a decoded frame payload into a typed message
//! keyed on its first byte. [`TelemetryState::dispatch`] applies a message to
//! the station's tables. Dispatch never performs I/O.
//!
//! # Payload layouts
//!
//! Multi-byte numbers are big-endian `u16`.
//!
//! | Tag | Layout after tag |
//! |-----|------------------|
//! | `ADC` | `current_ma, voltage_mv` |
//! | `RAILCOM_CH1` | `address` |
//! | `RAILCOM_CH2_BITMAP` | bitmap bytes, bit *i* = locomotive index *i* |
//! | `POM_CV_RESULT` | `address, cv, ok, value` |
//! | `PGM_CV_RESULT` | `cv, ok, value` |
//! | `RC2_RATE` | `loco index, rate` |
//! | `S88_STATUS` | occupancy bytes, bit *n % 8* of byte *n / 8* = contact *n* |
//! | `RCL_DETECTIONS` | `track`, then detected addresses |
//! | `DEBUG_TEXT` | UTF-8 text |

use heapless::{Deque, String, Vec};

use crate::codec::Payload;
use crate::entity::{EntityTable, LocoId, Locomotive, Schedulable};
use crate::error::TelemetryError;
use crate::protocol::{telemetry as tag, MAX_PAYLOAD};

/// Number of RailCom-local tracks tracked.
pub const MAX_RCL_TRACKS: usize = 32;

/// Addresses carried by one RCL detection message.
pub const MAX_RCL_ADDRESSES: usize = 16;

/// Debug lines kept for inspection.
pub const DEBUG_HISTORY: usize = 8;

/// Bytes of raw frame data following the tag.
pub type Body = Vec<u8, MAX_PAYLOAD>;

/// A debug line from the controller.
pub type DebugLine = String<MAX_PAYLOAD>;

/// Where a CV result came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CvSource {
    /// Programming track.
    Pgm,
    /// Main track, answered by the decoder at `address`.
    Pom {
        /// Decoder address.
        address: u16,
    },
}

/// Result of a CV read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CvResult {
    /// Track the read ran on.
    pub source: CvSource,
    /// CV number (1-based).
    pub cv: u16,
    /// Value, or `None` if the decoder did not acknowledge.
    pub value: Option<u8>,
}

/// One parsed upstream message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Telemetry {
    /// Track current and voltage.
    Adc {
        /// Current in milliamps.
        current_ma: u16,
        /// Voltage in millivolts.
        voltage_mv: u16,
    },
    /// RailCom channel 1 address broadcast.
    RailcomCh1 {
        /// Decoder address heard.
        address: u16,
    },
    /// RailCom channel 2 online bitmap.
    RailcomCh2Online {
        /// Bit *i* set = locomotive index *i* answered.
        bitmap: Body,
    },
    /// RailCom-local detections for one track.
    RclDetections {
        /// Track index.
        track: u8,
        /// Addresses detected on the track.
        addresses: Vec<u16, MAX_RCL_ADDRESSES>,
    },
    /// CV read result.
    Cv(CvResult),
    /// RailCom channel 2 answer rate for one locomotive.
    Rc2Rate {
        /// Locomotive index.
        loco: LocoId,
        /// Rate.
        rate: u8,
    },
    /// S88 occupancy bytes.
    S88Status {
        /// Raw bytes.
        bytes: Body,
    },
    /// Free-text debug line.
    Debug(DebugLine),
}

fn need(payload: &[u8], needed: usize) -> Result<(), TelemetryError> {
    if payload.len() < needed {
        return Err(TelemetryError::Truncated {
            tag: payload.first().copied().unwrap_or(0),
            needed,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn be16(payload: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([payload[at], payload[at + 1]])
}

fn body(payload: &[u8]) -> Body {
    Body::from_slice(&payload[1..]).unwrap_or_default()
}

impl Telemetry {
    /// Parse a frame payload.
    pub fn parse(payload: &[u8]) -> Result<Self, TelemetryError> {
        need(payload, 1)?;
        match payload[0] {
            tag::ADC => {
                need(payload, 5)?;
                Ok(Telemetry::Adc {
                    current_ma: be16(payload, 1),
                    voltage_mv: be16(payload, 3),
                })
            }
            tag::RAILCOM_CH1 => {
                need(payload, 3)?;
                Ok(Telemetry::RailcomCh1 {
                    address: be16(payload, 1),
                })
            }
            tag::RAILCOM_CH2_BITMAP => Ok(Telemetry::RailcomCh2Online {
                bitmap: body(payload),
            }),
            tag::POM_CV_RESULT => {
                need(payload, 7)?;
                Ok(Telemetry::Cv(CvResult {
                    source: CvSource::Pom {
                        address: be16(payload, 1),
                    },
                    cv: be16(payload, 3),
                    value: (payload[5] != 0).then_some(payload[6]),
                }))
            }
            tag::PGM_CV_RESULT => {
                need(payload, 5)?;
                Ok(Telemetry::Cv(CvResult {
                    source: CvSource::Pgm,
                    cv: be16(payload, 1),
                    value: (payload[3] != 0).then_some(payload[4]),
                }))
            }
            tag::RC2_RATE => {
                need(payload, 4)?;
                Ok(Telemetry::Rc2Rate {
                    loco: LocoId(be16(payload, 1)),
                    rate: payload[3],
                })
            }
            tag::S88_STATUS => Ok(Telemetry::S88Status {
                bytes: body(payload),
            }),
            tag::RCL_DETECTIONS => {
                need(payload, 2)?;
                let addresses = payload[2..]
                    .chunks_exact(2)
                    .take(MAX_RCL_ADDRESSES)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Ok(Telemetry::RclDetections {
                    track: payload[1],
                    addresses,
                })
            }
            tag::DEBUG_TEXT => {
                let text =
                    core::str::from_utf8(&payload[1..]).map_err(|_| TelemetryError::InvalidText)?;
                let mut line = DebugLine::new();
                // Body is at most MAX_PAYLOAD - 1 bytes.
                let _ = line.push_str(text.trim_end());
                Ok(Telemetry::Debug(line))
            }
            other => Err(TelemetryError::UnknownTag(other)),
        }
    }
}

/// Telemetry-derived state that does not live on an entity.
#[derive(Debug)]
pub struct TelemetryState {
    current_ma: u16,
    voltage_mv: u16,
    last_ch1_address: Option<u16>,
    s88: Body,
    rcl_tracks: [Option<LocoId>; MAX_RCL_TRACKS],
    last_cv: Option<CvResult>,
    debug_lines: Deque<DebugLine, DEBUG_HISTORY>,
}

impl TelemetryState {
    /// Empty state: no current, nothing occupied.
    pub const fn new() -> Self {
        Self {
            current_ma: 0,
            voltage_mv: 0,
            last_ch1_address: None,
            s88: Vec::new(),
            rcl_tracks: [None; MAX_RCL_TRACKS],
            last_cv: None,
            debug_lines: Deque::new(),
        }
    }

    /// Last track current sample in milliamps.
    pub fn current_ma(&self) -> u16 {
        self.current_ma
    }

    /// Last track voltage sample in millivolts.
    pub fn voltage_mv(&self) -> u16 {
        self.voltage_mv
    }

    /// Last address heard on RailCom channel 1.
    pub fn last_ch1_address(&self) -> Option<u16> {
        self.last_ch1_address
    }

    /// Whether S88 contact `contact` reports occupied.
    pub fn is_occupied(&self, contact: u16) -> bool {
        self.s88
            .get(usize::from(contact / 8))
            .is_some_and(|byte| byte & (1 << (contact % 8)) != 0)
    }

    /// Locomotive last detected on an RCL track.
    pub fn rcl_track(&self, track: u8) -> Option<LocoId> {
        self.rcl_tracks.get(usize::from(track)).copied().flatten()
    }

    /// Most recent CV result.
    pub fn last_cv(&self) -> Option<&CvResult> {
        self.last_cv.as_ref()
    }

    /// Recent debug lines, oldest first.
    pub fn debug_lines(&self) -> impl Iterator<Item = &DebugLine> {
        self.debug_lines.iter()
    }

    pub(crate) fn rcl_tracks_mut(&mut self) -> &mut [Option<LocoId>; MAX_RCL_TRACKS] {
        &mut self.rcl_tracks
    }

    /// Apply one message to the state and the locomotive table.
    pub fn dispatch<const L: usize>(
        &mut self,
        locos: &mut EntityTable<Locomotive, L>,
        message: &Telemetry,
    ) {
        match message {
            Telemetry::Adc {
                current_ma,
                voltage_mv,
            } => {
                self.current_ma = *current_ma;
                self.voltage_mv = *voltage_mv;
            }

            Telemetry::RailcomCh1 { address } => {
                self.last_ch1_address = Some(*address);
            }

            Telemetry::RailcomCh2Online { bitmap } => {
                for (i, loco) in locos.iter_mut().enumerate() {
                    let online = bitmap
                        .get(i / 8)
                        .is_some_and(|byte| byte & (1 << (i % 8)) != 0);
                    loco.set_online(online);
                }
            }

            Telemetry::RclDetections { track, addresses } => {
                let Some(slot) = self.rcl_tracks.get_mut(usize::from(*track)) else {
                    tracing::warn!(track, "rcl detection for unknown track");
                    return;
                };
                *slot = addresses.iter().find_map(|&address| {
                    locos
                        .iter()
                        .position(|loco| loco.address() == address)
                        .map(|i| LocoId(i as u16))
                });
            }

            Telemetry::Cv(result) => {
                tracing::debug!(cv = result.cv, value = ?result.value, "cv result");
                self.last_cv = Some(*result);
            }

            Telemetry::Rc2Rate { loco, rate } => match locos.get_mut(loco.0) {
                Some(entry) => entry.set_rc2_rate(*rate),
                None => tracing::warn!(loco = loco.0, "rc2 rate for unknown locomotive"),
            },

            Telemetry::S88Status { bytes } => {
                self.s88.clone_from(bytes);
            }

            Telemetry::Debug(line) => {
                tracing::info!(target: "controller", "{}", line.as_str());
                if self.debug_lines.is_full() {
                    self.debug_lines.pop_front();
                }
                let _ = self.debug_lines.push_back(line.clone());
            }
        }
    }
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse and apply a frame, logging and dropping anything unparseable.
///
/// Returns the parsed message so callers waiting on a reply can inspect it.
pub fn dispatch_frame<const L: usize>(
    state: &mut TelemetryState,
    locos: &mut EntityTable<Locomotive, L>,
    payload: &Payload,
) -> Option<Telemetry> {
    match Telemetry::parse(payload) {
        Ok(message) => {
            state.dispatch(locos, &message);
            Some(message)
        }
        Err(err) => {
            tracing::warn!(error = %err, "dropping telemetry frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::SpeedSteps;

    fn locos() -> EntityTable<Locomotive, 8> {
        let mut table = EntityTable::new();
        table.add(Locomotive::new(3, SpeedSteps::Steps128));
        table.add(Locomotive::new(1200, SpeedSteps::Steps28));
        table.add(Locomotive::new(44, SpeedSteps::Steps14));
        table
    }

    // =========================================================================
    // Parse Tests
    // =========================================================================

    #[test]
    fn parse_adc() {
        let msg = Telemetry::parse(&[tag::ADC, 0x01, 0xF4, 0x3A, 0x98]).unwrap();
        assert_eq!(
            msg,
            Telemetry::Adc {
                current_ma: 500,
                voltage_mv: 15000
            }
        );
    }

    #[test]
    fn parse_cv_results() {
        let pgm = Telemetry::parse(&[tag::PGM_CV_RESULT, 0, 29, 1, 6]).unwrap();
        assert_eq!(
            pgm,
            Telemetry::Cv(CvResult {
                source: CvSource::Pgm,
                cv: 29,
                value: Some(6)
            })
        );

        let pom = Telemetry::parse(&[tag::POM_CV_RESULT, 0, 3, 0, 1, 0, 0]).unwrap();
        assert_eq!(
            pom,
            Telemetry::Cv(CvResult {
                source: CvSource::Pom { address: 3 },
                cv: 1,
                value: None
            })
        );
    }

    #[test]
    fn parse_truncated() {
        assert_eq!(
            Telemetry::parse(&[tag::ADC, 1]),
            Err(TelemetryError::Truncated {
                tag: tag::ADC,
                needed: 5,
                actual: 2
            })
        );
    }

    #[test]
    fn parse_unknown_tag() {
        assert_eq!(
            Telemetry::parse(&[0x7F]),
            Err(TelemetryError::UnknownTag(0x7F))
        );
    }

    #[test]
    fn parse_debug_text() {
        let mut payload = std::vec![tag::DEBUG_TEXT];
        payload.extend_from_slice(b"boot ok\n");
        match Telemetry::parse(&payload).unwrap() {
            Telemetry::Debug(line) => assert_eq!(line.as_str(), "boot ok"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            Telemetry::parse(&[tag::DEBUG_TEXT, 0xC3]),
            Err(TelemetryError::InvalidText)
        );
    }

    // =========================================================================
    // Dispatch Tests
    // =========================================================================

    #[test]
    fn ch2_bitmap_sets_online_flags() {
        let mut table = locos();
        let mut state = TelemetryState::new();
        let msg = Telemetry::parse(&[tag::RAILCOM_CH2_BITMAP, 0b101]).unwrap();
        state.dispatch(&mut table, &msg);
        assert!(table.get(0).unwrap().is_online());
        assert!(!table.get(1).unwrap().is_online());
        assert!(table.get(2).unwrap().is_online());
    }

    #[test]
    fn s88_occupancy_bits() {
        let mut table = locos();
        let mut state = TelemetryState::new();
        let msg = Telemetry::parse(&[tag::S88_STATUS, 0b0000_0010, 0b1000_0000]).unwrap();
        state.dispatch(&mut table, &msg);
        assert!(state.is_occupied(1));
        assert!(state.is_occupied(15));
        assert!(!state.is_occupied(0));
        assert!(!state.is_occupied(200));
    }

    #[test]
    fn rcl_detection_resolves_address() {
        let mut table = locos();
        let mut state = TelemetryState::new();
        let msg = Telemetry::parse(&[tag::RCL_DETECTIONS, 4, 0x04, 0xB0]).unwrap();
        state.dispatch(&mut table, &msg);
        assert_eq!(state.rcl_track(4), Some(LocoId(1)));

        let empty = Telemetry::parse(&[tag::RCL_DETECTIONS, 4]).unwrap();
        state.dispatch(&mut table, &empty);
        assert_eq!(state.rcl_track(4), None);
    }

    #[test]
    fn rc2_rate_updates_locomotive() {
        let mut table = locos();
        let mut state = TelemetryState::new();
        let msg = Telemetry::parse(&[tag::RC2_RATE, 0, 2, 87]).unwrap();
        state.dispatch(&mut table, &msg);
        assert_eq!(table.get(2).unwrap().rc2_rate(), 87);
    }

    #[test]
    fn debug_history_drops_oldest() {
        let mut table = locos();
        let mut state = TelemetryState::new();
        for i in 0..(DEBUG_HISTORY as u8 + 2) {
            let mut line = DebugLine::new();
            line.push(char::from(b'a' + i)).unwrap();
            state.dispatch(&mut table, &Telemetry::Debug(line));
        }
        let first = state.debug_lines().next().unwrap();
        assert_eq!(first.as_str(), "c");
        assert_eq!(state.debug_lines().count(), DEBUG_HISTORY);
    }

    #[test]
    fn dispatch_frame_drops_unknown() {
        let mut table = locos();
        let mut state = TelemetryState::new();
        let payload = Payload::from_slice(&[0x7F, 1, 2]).unwrap();
        assert!(dispatch_frame(&mut state, &mut table, &payload).is_none());
    }
}
