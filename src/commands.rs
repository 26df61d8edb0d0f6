//! Command types and payload encoding for the track controller.
//!
//! Every downstream message is a [`DccCommand`]. [`DccCommand::encode`]
//! produces the frame payload (tag byte first); the transport adds framing.
//!
//! # Payload layouts
//!
//! Addresses and CV numbers are big-endian `u16`. CV numbers are 1-based.
//!
//! | Command | Layout after tag |
//! |---------|------------------|
//! | `SetMode` | `mode` |
//! | `S88ContactCount` | `count_hi, count_lo` |
//! | `PgmReadCv` | `cv` |
//! | `PgmWriteCv` | `cv, value` |
//! | `PomReadCv` | `address, cv` |
//! | `PomWriteCv` | `address, cv, value` |
//! | `Speed` | `address, dir << 7 \| speed` |
//! | `Functions` | `address, group, bits` |
//! | `AccessorySet/Reset` | `address, output` |
//!
//! # Example
//!
//! ```rust
//! use dcc_station::commands::{DccCommand, SpeedSteps};
//! use dcc_station::protocol::command;
//! use dcc_station::Direction;
//!
//! let cmd = DccCommand::Speed {
//!     address: 3,
//!     steps: SpeedSteps::Steps128,
//!     direction: Direction::Forward,
//!     speed: 40,
//! };
//! assert_eq!(cmd.encode().as_slice(), &[command::SPEED_128, 0, 3, 0x80 | 40]);
//! ```

use crate::codec::Payload;
use crate::protocol::command;
use crate::traits::Direction;

// ============================================================================
// Speed Steps
// ============================================================================

/// Decoder speed-step mode.
///
/// Speeds are stored in the decoder's native range with `0` = stop and
/// `1` = emergency stop; `2..=max_speed()` are the running steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpeedSteps {
    /// 14 running steps.
    Steps14,
    /// 28 running steps.
    Steps28,
    /// 126 running steps.
    #[default]
    Steps128,
}

impl SpeedSteps {
    /// Highest speed value in this mode.
    ///
    /// ```
    /// use dcc_station::commands::SpeedSteps;
    ///
    /// assert_eq!(SpeedSteps::Steps14.max_speed(), 15);
    /// assert_eq!(SpeedSteps::Steps28.max_speed(), 29);
    /// assert_eq!(SpeedSteps::Steps128.max_speed(), 127);
    /// ```
    #[inline]
    pub const fn max_speed(&self) -> u8 {
        match self {
            SpeedSteps::Steps14 => 15,
            SpeedSteps::Steps28 => 29,
            SpeedSteps::Steps128 => 127,
        }
    }

    /// Parse the configured step count (14, 28, 126 or 128).
    pub const fn from_count(count: u8) -> Option<Self> {
        match count {
            14 => Some(SpeedSteps::Steps14),
            28 => Some(SpeedSteps::Steps28),
            126 | 128 => Some(SpeedSteps::Steps128),
            _ => None,
        }
    }

    const fn tag(&self) -> u8 {
        match self {
            SpeedSteps::Steps14 => command::SPEED_14,
            SpeedSteps::Steps28 => command::SPEED_28,
            SpeedSteps::Steps128 => command::SPEED_128,
        }
    }
}

// ============================================================================
// Function Groups
// ============================================================================

/// DCC function group, the unit a single function packet refreshes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionGroup {
    /// F0 (headlight) and F1–F4.
    F0F4,
    /// F5–F8.
    F5F8,
    /// F9–F12.
    F9F12,
    /// F13–F20.
    F13F20,
    /// F21–F28.
    F21F28,
}

impl FunctionGroup {
    /// All groups in refresh order.
    pub const ALL: [FunctionGroup; 5] = [
        FunctionGroup::F0F4,
        FunctionGroup::F5F8,
        FunctionGroup::F9F12,
        FunctionGroup::F13F20,
        FunctionGroup::F21F28,
    ];

    /// Wire identifier of the group.
    #[inline]
    pub const fn id(&self) -> u8 {
        match self {
            FunctionGroup::F0F4 => 0,
            FunctionGroup::F5F8 => 1,
            FunctionGroup::F9F12 => 2,
            FunctionGroup::F13F20 => 3,
            FunctionGroup::F21F28 => 4,
        }
    }

    /// Lowest function number in the group.
    #[inline]
    pub const fn first(&self) -> u8 {
        match self {
            FunctionGroup::F0F4 => 0,
            FunctionGroup::F5F8 => 5,
            FunctionGroup::F9F12 => 9,
            FunctionGroup::F13F20 => 13,
            FunctionGroup::F21F28 => 21,
        }
    }

    /// Group containing function `index`, if it is F0–F28.
    pub const fn containing(index: u8) -> Option<Self> {
        match index {
            0..=4 => Some(FunctionGroup::F0F4),
            5..=8 => Some(FunctionGroup::F5F8),
            9..=12 => Some(FunctionGroup::F9F12),
            13..=20 => Some(FunctionGroup::F13F20),
            21..=28 => Some(FunctionGroup::F21F28),
            _ => None,
        }
    }

    /// Extract this group's packet bits from a 32-bit function mask.
    ///
    /// F0F4 uses the DCC layout: F0 at bit 4, F1–F4 at bits 0–3.
    ///
    /// ```
    /// use dcc_station::commands::FunctionGroup;
    ///
    /// // F0 and F2 on
    /// assert_eq!(FunctionGroup::F0F4.bits(0b101), 0b1_0010);
    /// // F13 and F20 on
    /// assert_eq!(FunctionGroup::F13F20.bits((1 << 13) | (1 << 20)), 0b1000_0001);
    /// ```
    pub const fn bits(&self, mask: u32) -> u8 {
        match self {
            FunctionGroup::F0F4 => (((mask >> 1) & 0x0F) | ((mask & 1) << 4)) as u8,
            FunctionGroup::F5F8 => ((mask >> 5) & 0x0F) as u8,
            FunctionGroup::F9F12 => ((mask >> 9) & 0x0F) as u8,
            FunctionGroup::F13F20 => ((mask >> 13) & 0xFF) as u8,
            FunctionGroup::F21F28 => ((mask >> 21) & 0xFF) as u8,
        }
    }
}

// ============================================================================
// Track Mode
// ============================================================================

/// Output mode of the track controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackMode {
    /// Normal operations on the main track.
    #[default]
    Operations,
    /// Service mode on the programming track.
    Programming,
}

// ============================================================================
// Commands
// ============================================================================

/// One downstream command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DccCommand {
    /// Enable track power.
    BoosterOn,
    /// Disable track power.
    BoosterOff,
    /// Switch between main and programming track.
    SetMode(TrackMode),
    /// Number of S88 contacts the controller should scan.
    S88ContactCount(u16),
    /// Read a CV on the programming track.
    PgmReadCv {
        /// CV number (1-based).
        cv: u16,
    },
    /// Write a CV on the programming track.
    PgmWriteCv {
        /// CV number (1-based).
        cv: u16,
        /// Value to write.
        value: u8,
    },
    /// Read a CV on the main track.
    PomReadCv {
        /// Decoder address.
        address: u16,
        /// CV number (1-based).
        cv: u16,
    },
    /// Write a CV on the main track.
    PomWriteCv {
        /// Decoder address.
        address: u16,
        /// CV number (1-based).
        cv: u16,
        /// Value to write.
        value: u8,
    },
    /// Speed and direction for one decoder.
    Speed {
        /// Decoder address.
        address: u16,
        /// Step mode, selects the packet format.
        steps: SpeedSteps,
        /// Travel direction.
        direction: Direction,
        /// Speed in the mode's native range.
        speed: u8,
    },
    /// One function group for one decoder.
    Functions {
        /// Decoder address.
        address: u16,
        /// Which group.
        group: FunctionGroup,
        /// Group bits as produced by [`FunctionGroup::bits`].
        bits: u8,
    },
    /// Decoder reset packets.
    Reset,
    /// Broadcast stop.
    StopAll,
    /// Broadcast emergency stop.
    EStopAll,
    /// Basic accessory output on.
    AccessorySet {
        /// Accessory address.
        address: u16,
        /// Output (0 or 1 on most decoders).
        output: u8,
    },
    /// Basic accessory output off.
    AccessoryReset {
        /// Accessory address.
        address: u16,
        /// Output.
        output: u8,
    },
}

impl DccCommand {
    /// Wire tag (payload byte 0).
    pub const fn tag(&self) -> u8 {
        match self {
            DccCommand::BoosterOn => command::BOOSTER_ON,
            DccCommand::BoosterOff => command::BOOSTER_OFF,
            DccCommand::SetMode(_) => command::SET_MODE,
            DccCommand::S88ContactCount(_) => command::S88_CONTACT_COUNT,
            DccCommand::PgmReadCv { .. } => command::PGM_READ_CV,
            DccCommand::PgmWriteCv { .. } => command::PGM_WRITE_CV,
            DccCommand::PomReadCv { .. } => command::POM_READ_CV,
            DccCommand::PomWriteCv { .. } => command::POM_WRITE_CV,
            DccCommand::Speed { steps, .. } => steps.tag(),
            DccCommand::Functions { .. } => command::FUNCTION_GROUP,
            DccCommand::Reset => command::RESET,
            DccCommand::StopAll => command::STOP_ALL,
            DccCommand::EStopAll => command::ESTOP_ALL,
            DccCommand::AccessorySet { .. } => command::BASE_ACCESSORY_SET,
            DccCommand::AccessoryReset { .. } => command::BASE_ACCESSORY_RESET,
        }
    }

    /// Build the frame payload.
    pub fn encode(&self) -> Payload {
        let mut buf = [0u8; 8];
        buf[0] = self.tag();
        let len = match *self {
            DccCommand::BoosterOn
            | DccCommand::BoosterOff
            | DccCommand::Reset
            | DccCommand::StopAll
            | DccCommand::EStopAll => 1,

            DccCommand::SetMode(mode) => {
                buf[1] = match mode {
                    TrackMode::Operations => 0,
                    TrackMode::Programming => 1,
                };
                2
            }

            DccCommand::S88ContactCount(count) => {
                buf[1..3].copy_from_slice(&count.to_be_bytes());
                3
            }

            DccCommand::PgmReadCv { cv } => {
                buf[1..3].copy_from_slice(&cv.to_be_bytes());
                3
            }

            DccCommand::PgmWriteCv { cv, value } => {
                buf[1..3].copy_from_slice(&cv.to_be_bytes());
                buf[3] = value;
                4
            }

            DccCommand::PomReadCv { address, cv } => {
                buf[1..3].copy_from_slice(&address.to_be_bytes());
                buf[3..5].copy_from_slice(&cv.to_be_bytes());
                5
            }

            DccCommand::PomWriteCv { address, cv, value } => {
                buf[1..3].copy_from_slice(&address.to_be_bytes());
                buf[3..5].copy_from_slice(&cv.to_be_bytes());
                buf[5] = value;
                6
            }

            DccCommand::Speed {
                address,
                steps,
                direction,
                speed,
            } => {
                buf[1..3].copy_from_slice(&address.to_be_bytes());
                buf[3] = (direction.bit() << 7) | speed.min(steps.max_speed());
                4
            }

            DccCommand::Functions {
                address,
                group,
                bits,
            } => {
                buf[1..3].copy_from_slice(&address.to_be_bytes());
                buf[3] = group.id();
                buf[4] = bits;
                5
            }

            DccCommand::AccessorySet { address, output }
            | DccCommand::AccessoryReset { address, output } => {
                buf[1..3].copy_from_slice(&address.to_be_bytes());
                buf[3] = output;
                4
            }
        };
        // Every layout above is far below MAX_PAYLOAD.
        Payload::from_slice(&buf[..len]).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // SpeedSteps Tests
    // =========================================================================

    #[test]
    fn speed_steps_from_count() {
        assert_eq!(SpeedSteps::from_count(14), Some(SpeedSteps::Steps14));
        assert_eq!(SpeedSteps::from_count(28), Some(SpeedSteps::Steps28));
        assert_eq!(SpeedSteps::from_count(126), Some(SpeedSteps::Steps128));
        assert_eq!(SpeedSteps::from_count(128), Some(SpeedSteps::Steps128));
        assert_eq!(SpeedSteps::from_count(27), None);
    }

    // =========================================================================
    // FunctionGroup Tests
    // =========================================================================

    #[test]
    fn function_group_containing() {
        assert_eq!(FunctionGroup::containing(0), Some(FunctionGroup::F0F4));
        assert_eq!(FunctionGroup::containing(8), Some(FunctionGroup::F5F8));
        assert_eq!(FunctionGroup::containing(9), Some(FunctionGroup::F9F12));
        assert_eq!(FunctionGroup::containing(20), Some(FunctionGroup::F13F20));
        assert_eq!(FunctionGroup::containing(28), Some(FunctionGroup::F21F28));
        assert_eq!(FunctionGroup::containing(29), None);
    }

    #[test]
    fn function_group_bits() {
        let all = u32::MAX;
        assert_eq!(FunctionGroup::F0F4.bits(all), 0x1F);
        assert_eq!(FunctionGroup::F5F8.bits(all), 0x0F);
        assert_eq!(FunctionGroup::F9F12.bits(all), 0x0F);
        assert_eq!(FunctionGroup::F13F20.bits(all), 0xFF);
        assert_eq!(FunctionGroup::F21F28.bits(all), 0xFF);

        assert_eq!(FunctionGroup::F0F4.bits(1 << 4), 0b1000);
        assert_eq!(FunctionGroup::F5F8.bits(1 << 5), 0b0001);
        assert_eq!(FunctionGroup::F21F28.bits(1 << 28), 0b1000_0000);
    }

    #[test]
    fn function_group_first_matches_containing() {
        for group in FunctionGroup::ALL {
            assert_eq!(FunctionGroup::containing(group.first()), Some(group));
        }
    }

    // =========================================================================
    // Encoding Tests
    // =========================================================================

    #[test]
    fn encode_simple_commands() {
        assert_eq!(DccCommand::BoosterOn.encode().as_slice(), &[command::BOOSTER_ON]);
        assert_eq!(DccCommand::EStopAll.encode().as_slice(), &[command::ESTOP_ALL]);
        assert_eq!(
            DccCommand::SetMode(TrackMode::Programming).encode().as_slice(),
            &[command::SET_MODE, 1]
        );
    }

    #[test]
    fn encode_cv_commands() {
        assert_eq!(
            DccCommand::PgmReadCv { cv: 29 }.encode().as_slice(),
            &[command::PGM_READ_CV, 0, 29]
        );
        assert_eq!(
            DccCommand::PomWriteCv {
                address: 1234,
                cv: 300,
                value: 7
            }
            .encode()
            .as_slice(),
            &[command::POM_WRITE_CV, 0x04, 0xD2, 0x01, 0x2C, 7]
        );
    }

    #[test]
    fn encode_speed_by_step_mode() {
        let cmd = DccCommand::Speed {
            address: 3,
            steps: SpeedSteps::Steps28,
            direction: Direction::Reverse,
            speed: 12,
        };
        assert_eq!(cmd.encode().as_slice(), &[command::SPEED_28, 0, 3, 12]);
    }

    #[test]
    fn encode_speed_clamps_to_mode_range() {
        let cmd = DccCommand::Speed {
            address: 3,
            steps: SpeedSteps::Steps14,
            direction: Direction::Forward,
            speed: 100,
        };
        assert_eq!(cmd.encode()[3], 0x80 | 15);
    }

    #[test]
    fn encode_function_group() {
        let cmd = DccCommand::Functions {
            address: 10,
            group: FunctionGroup::F13F20,
            bits: 0xA5,
        };
        assert_eq!(
            cmd.encode().as_slice(),
            &[command::FUNCTION_GROUP, 0, 10, 3, 0xA5]
        );
    }

    #[test]
    fn encode_accessory() {
        let set = DccCommand::AccessorySet {
            address: 17,
            output: 1,
        };
        let reset = DccCommand::AccessoryReset {
            address: 17,
            output: 1,
        };
        assert_eq!(set.encode().as_slice(), &[command::BASE_ACCESSORY_SET, 0, 17, 1]);
        assert_eq!(reset.encode().as_slice(), &[command::BASE_ACCESSORY_RESET, 0, 17, 1]);
    }
}
