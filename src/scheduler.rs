//! Per-entity packet scheduling.
//!
//! Each entity walks a 10-position cycle. Even positions refresh speed and
//! direction; odd positions refresh one function group:
//!
//! | Position | Group | Sent when |
//! |----------|-------|-----------|
//! | 1 | F0–F4 | always |
//! | 3 | F5–F8 | any function ≥ 5 in use |
//! | 5 | F9–F12 | any function ≥ 9 in use |
//! | 7 | F13–F20 | any function ≥ 13 in use |
//! | 9 | F21–F28 | any function ≥ 21 in use |
//!
//! Speed is refreshed every other tick and the full function set at least
//! once every ten.
//!
//! # Fairness
//!
//! [`PacketScheduler::run_round`] gives every active locomotive one step,
//! then, on one round out of `addon_divider`, every active add-on one step.
//!
//! # Example
//!
//! ```rust
//! use dcc_station::commands::{DccCommand, SpeedSteps};
//! use dcc_station::entity::{Addon, EntityTable, Locomotive};
//! use dcc_station::scheduler::PacketScheduler;
//!
//! let mut locos: EntityTable<Locomotive, 4> = EntityTable::new();
//! let mut addons: EntityTable<Addon, 4> = EntityTable::new();
//! locos.add(Locomotive::new(3, SpeedSteps::Steps128));
//!
//! let mut scheduler = PacketScheduler::new(4);
//! let mut sent = Vec::new();
//! scheduler
//!     .run_round(&mut locos, &mut addons, 0, |cmd| {
//!         sent.push(cmd);
//!         Ok::<(), ()>(())
//!     })
//!     .unwrap();
//! assert!(matches!(sent[0], DccCommand::Speed { address: 3, .. }));
//! ```

use crate::commands::{DccCommand, FunctionGroup};
use crate::entity::{Addon, EntityTable, Locomotive, Schedulable};

/// Function group refreshed at an odd sequence position.
const fn group_for_position(position: u8) -> FunctionGroup {
    match position {
        1 => FunctionGroup::F0F4,
        3 => FunctionGroup::F5F8,
        5 => FunctionGroup::F9F12,
        7 => FunctionGroup::F13F20,
        _ => FunctionGroup::F21F28,
    }
}

/// Advance one entity by one sequence step and return what to send.
///
/// Inactive entities and address 0 are untouched and produce nothing.
/// A gated function slot (group not in use) still advances the sequence.
pub fn next_packet<S: Schedulable>(entity: &mut S) -> Option<DccCommand> {
    if !entity.is_active() || entity.address() == 0 {
        return None;
    }

    let sequence = entity.sequence_mut();
    let position = sequence.position();
    sequence.advance();

    if position % 2 == 0 {
        return entity.speed_command();
    }

    let group = group_for_position(position);
    let functions = entity.functions();
    if functions.max() < group.first() {
        return None;
    }
    Some(DccCommand::Functions {
        address: entity.address(),
        group,
        bits: group.bits(functions.mask()),
    })
}

/// Round-based scheduler over the locomotive and add-on tables.
#[derive(Debug, Clone)]
pub struct PacketScheduler {
    round: u32,
    addon_divider: u32,
}

impl PacketScheduler {
    /// Create a scheduler that ticks add-ons on one round in `addon_divider`.
    pub fn new(addon_divider: u32) -> Self {
        Self {
            round: 0,
            addon_divider: addon_divider.max(1),
        }
    }

    /// Number of completed rounds.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// True if the next round includes add-ons.
    pub fn addons_due(&self) -> bool {
        self.round % self.addon_divider == 0
    }

    /// Run one scheduling round.
    ///
    /// Ramps are advanced to `now_ms` before each locomotive's packet is
    /// chosen. Every produced command goes to `emit`; the first error aborts
    /// the round. Returns the number of commands emitted.
    pub fn run_round<const L: usize, const A: usize, E>(
        &mut self,
        locos: &mut EntityTable<Locomotive, L>,
        addons: &mut EntityTable<Addon, A>,
        now_ms: u64,
        mut emit: impl FnMut(DccCommand) -> Result<(), E>,
    ) -> Result<usize, E> {
        let mut emitted = 0;

        for loco in locos.iter_mut() {
            if !loco.is_active() || loco.address() == 0 {
                continue;
            }
            loco.advance_ramp(now_ms);
            if let Some(cmd) = next_packet(loco) {
                emit(cmd)?;
                emitted += 1;
            }
        }

        if self.addons_due() {
            for addon in addons.iter_mut() {
                if let Some(cmd) = next_packet(addon) {
                    emit(cmd)?;
                    emitted += 1;
                }
            }
        }

        self.round = self.round.wrapping_add(1);
        Ok(emitted)
    }
}

impl Default for PacketScheduler {
    fn default() -> Self {
        Self::new(4)
    }
}
