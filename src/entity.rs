//! Schedulable entities: locomotives and add-on function decoders.
//!
//! Both variants share the same shape (address, active flag, function set,
//! packet sequence); locomotives add direction, speed and an optional speed
//! ramp. The [`Schedulable`] trait is the seam the scheduler works through.
//!
//! # Speed values
//!
//! Speeds are stored in the decoder's native step range. `0` is stopped,
//! `1` is the emergency-stop marker and `2..` are running steps, so a ramp
//! never passes through `1`.
//!
//! # Example
//!
//! ```rust
//! use dcc_station::entity::Locomotive;
//! use dcc_station::commands::SpeedSteps;
//!
//! let mut loco = Locomotive::new(3, SpeedSteps::Steps128);
//! loco.set_speed(20, 0, 0);
//! assert_eq!(loco.speed(), 20);
//!
//! // Ramp 20 -> 30 over 5 seconds: one step every 500 ms
//! loco.set_speed(30, 50, 0);
//! assert_eq!(loco.ramp().unwrap().step_ms, 500);
//!
//! loco.advance_ramp(5000);
//! assert_eq!(loco.speed(), 30);
//! assert!(loco.ramp().is_none());
//! ```

use heapless::Vec;

use crate::commands::{DccCommand, SpeedSteps};
use crate::traits::Direction;

/// Number of function slots per entity (F0–F31).
pub const MAX_FUNCTIONS: u8 = 32;

/// Length of the packet sequence cycle.
pub const SEQUENCE_LEN: u8 = 10;

/// Stable index of a locomotive in its table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocoId(pub u16);

/// Stable index of an add-on in its table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddonId(pub u16);

// ============================================================================
// Functions
// ============================================================================

/// Per-function metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FunctionMeta {
    /// Momentary function: switched off again shortly after switching on.
    pub pulse: bool,
    /// Sound function.
    pub sound: bool,
    /// Index into the caller's function-name table.
    pub name: Option<u16>,
}

/// 32-bit function state plus metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSet {
    mask: u32,
    meta: [FunctionMeta; MAX_FUNCTIONS as usize],
    max: u8,
}

impl FunctionSet {
    /// All functions off, only F0–F4 in use.
    pub const fn new() -> Self {
        Self {
            mask: 0,
            meta: [FunctionMeta {
                pulse: false,
                sound: false,
                name: None,
            }; MAX_FUNCTIONS as usize],
            max: 0,
        }
    }

    /// Raw on/off mask (bit n = Fn).
    #[inline]
    pub const fn mask(&self) -> u32 {
        self.mask
    }

    /// Highest function index in use.
    #[inline]
    pub const fn max(&self) -> u8 {
        self.max
    }

    /// Whether function `index` is on. Out-of-range indices read as off.
    pub fn is_on(&self, index: u8) -> bool {
        index < MAX_FUNCTIONS && self.mask & (1 << index) != 0
    }

    /// Switch a function. Returns false for an out-of-range index.
    pub fn set(&mut self, index: u8, on: bool) -> bool {
        if index >= MAX_FUNCTIONS {
            return false;
        }
        if on {
            self.mask |= 1 << index;
        } else {
            self.mask &= !(1 << index);
        }
        self.max = self.max.max(index);
        true
    }

    /// Switch every function off, keeping metadata.
    pub fn clear(&mut self) {
        self.mask = 0;
    }

    /// Metadata for function `index`.
    pub fn meta(&self, index: u8) -> Option<&FunctionMeta> {
        self.meta.get(index as usize)
    }

    /// Replace metadata for function `index`; marks it in use.
    pub fn set_meta(&mut self, index: u8, meta: FunctionMeta) -> bool {
        match self.meta.get_mut(index as usize) {
            Some(slot) => {
                *slot = meta;
                self.max = self.max.max(index);
                true
            }
            None => false,
        }
    }
}

impl Default for FunctionSet {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Packet Sequence
// ============================================================================

/// Cyclic position in `0..SEQUENCE_LEN`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketSequence(u8);

impl PacketSequence {
    /// Current position.
    #[inline]
    pub const fn position(&self) -> u8 {
        self.0
    }

    /// Move to the next position, wrapping at [`SEQUENCE_LEN`].
    #[inline]
    pub fn advance(&mut self) {
        self.0 = (self.0 + 1) % SEQUENCE_LEN;
    }

    /// Restart the cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

// ============================================================================
// Ramp
// ============================================================================

/// In-flight speed ramp. Present only while `current != target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ramp {
    /// Speed the ramp ends at.
    pub target: u8,
    /// Milliseconds between single-step changes.
    pub step_ms: u64,
    /// When the next step is due.
    pub next_deadline_ms: u64,
}

/// One step from `current` toward `target`, skipping the estop value 1.
const fn step_toward(current: u8, target: u8) -> u8 {
    if target > current {
        if current == 0 {
            2
        } else {
            current + 1
        }
    } else if target < current {
        if current == 2 {
            0
        } else {
            current - 1
        }
    } else {
        current
    }
}

// ============================================================================
// Schedulable
// ============================================================================

/// Common shape of everything the packet scheduler refreshes.
pub trait Schedulable {
    /// Decoder address; 0 means unassigned and is never scheduled.
    fn address(&self) -> u16;

    /// Inactive entities are never ticked.
    fn is_active(&self) -> bool;

    /// Function state.
    fn functions(&self) -> &FunctionSet;

    /// Packet sequence counter.
    fn sequence_mut(&mut self) -> &mut PacketSequence;

    /// Command for even sequence positions, if the entity has one.
    fn speed_command(&self) -> Option<DccCommand>;
}

// ============================================================================
// Locomotive
// ============================================================================

/// A locomotive decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Locomotive {
    address: u16,
    active: bool,
    functions: FunctionSet,
    sequence: PacketSequence,
    direction: Direction,
    speed: u8,
    steps: SpeedSteps,
    ramp: Option<Ramp>,
    online: bool,
    rc2_rate: u8,
}

impl Locomotive {
    /// Create an active, stopped locomotive.
    pub fn new(address: u16, steps: SpeedSteps) -> Self {
        Self {
            address,
            active: true,
            functions: FunctionSet::new(),
            sequence: PacketSequence::default(),
            direction: Direction::Forward,
            speed: 0,
            steps,
            ramp: None,
            online: false,
            rc2_rate: 0,
        }
    }

    /// Current speed in native steps.
    #[inline]
    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Current direction.
    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Speed-step mode.
    #[inline]
    pub fn steps(&self) -> SpeedSteps {
        self.steps
    }

    /// In-flight ramp, if any.
    #[inline]
    pub fn ramp(&self) -> Option<&Ramp> {
        self.ramp.as_ref()
    }

    /// Whether RailCom channel 2 reports the decoder.
    #[inline]
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Last RailCom channel 2 answer rate.
    #[inline]
    pub fn rc2_rate(&self) -> u8 {
        self.rc2_rate
    }

    /// Mutable function state.
    pub fn functions_mut(&mut self) -> &mut FunctionSet {
        &mut self.functions
    }

    /// Enable or disable scheduling.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.ramp = None;
        }
    }

    /// Change speed-step mode, clamping the current speed into range.
    pub fn set_steps(&mut self, steps: SpeedSteps) {
        self.steps = steps;
        self.speed = self.speed.min(steps.max_speed());
        self.ramp = None;
    }

    /// Set speed, ramping over `tenths` of a second.
    ///
    /// `tenths == 0`, an estop target (1) or an unchanged target applies
    /// immediately and cancels any ramp. Otherwise the step interval is
    /// `100 * tenths / |target - current|` milliseconds.
    pub fn set_speed(&mut self, target: u8, tenths: u16, now_ms: u64) {
        let target = target.min(self.steps.max_speed());
        if tenths == 0 || target == 1 || target == self.speed {
            self.speed = target;
            self.ramp = None;
            return;
        }

        let distance = u64::from(target.abs_diff(self.speed));
        let step_ms = (100 * u64::from(tenths) / distance).max(1);
        self.ramp = Some(Ramp {
            target,
            step_ms,
            next_deadline_ms: now_ms + step_ms,
        });
    }

    /// Apply every ramp step that is due by `now_ms`.
    ///
    /// Returns true if the speed changed.
    pub fn advance_ramp(&mut self, now_ms: u64) -> bool {
        let Some(mut ramp) = self.ramp else {
            return false;
        };
        let before = self.speed;

        while now_ms >= ramp.next_deadline_ms && self.speed != ramp.target {
            self.speed = step_toward(self.speed, ramp.target);
            ramp.next_deadline_ms += ramp.step_ms;
        }

        self.ramp = if self.speed == ramp.target {
            None
        } else {
            Some(ramp)
        };
        self.speed != before
    }

    /// Set direction. A change stops the locomotive first.
    ///
    /// Returns true if the direction changed.
    pub fn set_direction(&mut self, direction: Direction) -> bool {
        if direction == self.direction {
            return false;
        }
        self.speed = 0;
        self.ramp = None;
        self.direction = direction;
        true
    }

    /// Stop with the emergency marker and cancel any ramp.
    pub fn emergency_stop(&mut self) {
        self.speed = 1;
        self.ramp = None;
    }

    pub(crate) fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub(crate) fn set_rc2_rate(&mut self, rate: u8) {
        self.rc2_rate = rate;
    }
}

impl Schedulable for Locomotive {
    fn address(&self) -> u16 {
        self.address
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn functions(&self) -> &FunctionSet {
        &self.functions
    }

    fn sequence_mut(&mut self) -> &mut PacketSequence {
        &mut self.sequence
    }

    fn speed_command(&self) -> Option<DccCommand> {
        Some(DccCommand::Speed {
            address: self.address,
            steps: self.steps,
            direction: self.direction,
            speed: self.speed,
        })
    }
}

// ============================================================================
// Add-on
// ============================================================================

/// A function-only decoder, optionally riding with a locomotive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Addon {
    address: u16,
    active: bool,
    functions: FunctionSet,
    sequence: PacketSequence,
    loco: Option<LocoId>,
}

impl Addon {
    /// Create an active add-on.
    pub fn new(address: u16) -> Self {
        Self {
            address,
            active: true,
            functions: FunctionSet::new(),
            sequence: PacketSequence::default(),
            loco: None,
        }
    }

    /// Locomotive this add-on is coupled to.
    pub fn loco(&self) -> Option<LocoId> {
        self.loco
    }

    /// Couple to (or uncouple from) a locomotive.
    pub fn set_loco(&mut self, loco: Option<LocoId>) {
        self.loco = loco;
    }

    /// Mutable function state.
    pub fn functions_mut(&mut self) -> &mut FunctionSet {
        &mut self.functions
    }

    /// Enable or disable scheduling.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

impl Schedulable for Addon {
    fn address(&self) -> u16 {
        self.address
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn functions(&self) -> &FunctionSet {
        &self.functions
    }

    fn sequence_mut(&mut self) -> &mut PacketSequence {
        &mut self.sequence
    }

    fn speed_command(&self) -> Option<DccCommand> {
        None
    }
}

// ============================================================================
// Entity Table
// ============================================================================

/// Capacity-bounded table; an entity's index is its stable identity.
#[derive(Clone, Debug)]
pub struct EntityTable<T, const N: usize> {
    entries: Vec<T, N>,
}

impl<T, const N: usize> EntityTable<T, N> {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an entity, returning its index, or `None` when full.
    pub fn add(&mut self, entity: T) -> Option<u16> {
        let index = self.entries.len() as u16;
        self.entries.push(entity).ok()?;
        Some(index)
    }

    /// Entity at `index`.
    pub fn get(&self, index: u16) -> Option<&T> {
        self.entries.get(index as usize)
    }

    /// Mutable entity at `index`.
    pub fn get_mut(&mut self, index: u16) -> Option<&mut T> {
        self.entries.get_mut(index as usize)
    }

    /// Iterate in index order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Iterate mutably in index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entities.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entities.
    pub const fn capacity(&self) -> usize {
        N
    }

    pub(crate) fn take_all(&mut self) -> Vec<T, N> {
        core::mem::take(&mut self.entries)
    }

    pub(crate) fn replace_all(&mut self, entries: Vec<T, N>) {
        self.entries = entries;
    }
}

impl<T, const N: usize> Default for EntityTable<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // FunctionSet Tests
    // =========================================================================

    #[test]
    fn function_set_tracks_max() {
        let mut f = FunctionSet::new();
        assert_eq!(f.max(), 0);
        f.set(12, true);
        assert_eq!(f.max(), 12);
        f.set(3, false);
        assert_eq!(f.max(), 12);
        assert!(f.is_on(12));
        assert!(!f.is_on(3));
    }

    #[test]
    fn function_set_rejects_out_of_range() {
        let mut f = FunctionSet::new();
        assert!(!f.set(32, true));
        assert_eq!(f.mask(), 0);
        assert!(!f.is_on(40));
        assert!(!f.set_meta(32, FunctionMeta::default()));
    }

    #[test]
    fn function_set_meta_marks_in_use() {
        let mut f = FunctionSet::new();
        let meta = FunctionMeta {
            pulse: true,
            sound: false,
            name: Some(7),
        };
        assert!(f.set_meta(21, meta));
        assert_eq!(f.max(), 21);
        assert_eq!(f.meta(21), Some(&meta));
    }

    #[test]
    fn function_set_clear_keeps_meta() {
        let mut f = FunctionSet::new();
        f.set(1, true);
        f.set_meta(
            1,
            FunctionMeta {
                sound: true,
                ..FunctionMeta::default()
            },
        );
        f.clear();
        assert_eq!(f.mask(), 0);
        assert!(f.meta(1).unwrap().sound);
    }

    // =========================================================================
    // Sequence Tests
    // =========================================================================

    #[test]
    fn sequence_wraps_at_ten() {
        let mut seq = PacketSequence::default();
        for expected in (0..SEQUENCE_LEN).chain(0..3) {
            assert_eq!(seq.position(), expected);
            seq.advance();
        }
    }

    // =========================================================================
    // Ramp Tests
    // =========================================================================

    #[test]
    fn ramp_step_interval() {
        let mut loco = Locomotive::new(3, SpeedSteps::Steps128);
        loco.set_speed(20, 0, 0);
        loco.set_speed(30, 50, 1000);
        let ramp = loco.ramp().unwrap();
        assert_eq!(ramp.step_ms, 500);
        assert_eq!(ramp.next_deadline_ms, 1500);
        assert_eq!(ramp.target, 30);
    }

    #[test]
    fn ramp_catches_up_on_late_tick() {
        let mut loco = Locomotive::new(3, SpeedSteps::Steps128);
        loco.set_speed(20, 0, 0);
        loco.set_speed(30, 50, 0);
        assert!(loco.advance_ramp(2600));
        assert_eq!(loco.speed(), 25);
        assert!(loco.ramp().is_some());
    }

    #[test]
    fn ramp_up_skips_estop_value() {
        let mut loco = Locomotive::new(3, SpeedSteps::Steps128);
        loco.set_speed(5, 10, 0);
        let mut seen = std::vec::Vec::new();
        for t in (0..=2000).step_by(5) {
            if loco.advance_ramp(t) {
                seen.push(loco.speed());
            }
        }
        assert_eq!(seen, vec![2, 3, 4, 5]);
        assert!(loco.ramp().is_none());
    }

    #[test]
    fn ramp_down_skips_estop_value() {
        let mut loco = Locomotive::new(3, SpeedSteps::Steps128);
        loco.set_speed(4, 0, 0);
        loco.set_speed(0, 4, 0);
        let mut seen = std::vec::Vec::new();
        for t in (0..=1000).step_by(5) {
            if loco.advance_ramp(t) {
                seen.push(loco.speed());
            }
        }
        assert_eq!(seen, vec![3, 2, 0]);
    }

    #[test]
    fn zero_tenths_applies_immediately_and_cancels_ramp() {
        let mut loco = Locomotive::new(3, SpeedSteps::Steps128);
        loco.set_speed(50, 100, 0);
        assert!(loco.ramp().is_some());
        loco.set_speed(10, 0, 10);
        assert_eq!(loco.speed(), 10);
        assert!(loco.ramp().is_none());
    }

    #[test]
    fn estop_target_is_immediate() {
        let mut loco = Locomotive::new(3, SpeedSteps::Steps128);
        loco.set_speed(40, 0, 0);
        loco.set_speed(1, 30, 0);
        assert_eq!(loco.speed(), 1);
        assert!(loco.ramp().is_none());
    }

    #[test]
    fn new_ramp_replaces_old() {
        let mut loco = Locomotive::new(3, SpeedSteps::Steps128);
        loco.set_speed(100, 10, 0);
        loco.set_speed(10, 10, 0);
        assert_eq!(loco.ramp().unwrap().target, 10);
    }

    #[test]
    fn speed_clamped_to_step_mode() {
        let mut loco = Locomotive::new(3, SpeedSteps::Steps28);
        loco.set_speed(100, 0, 0);
        assert_eq!(loco.speed(), 29);
        loco.set_steps(SpeedSteps::Steps14);
        assert_eq!(loco.speed(), 15);
    }

    // =========================================================================
    // Direction Tests
    // =========================================================================

    #[test]
    fn direction_change_stops_first() {
        let mut loco = Locomotive::new(3, SpeedSteps::Steps128);
        loco.set_speed(60, 0, 0);
        loco.set_speed(80, 20, 0);
        assert!(loco.set_direction(Direction::Reverse));
        assert_eq!(loco.speed(), 0);
        assert!(loco.ramp().is_none());
        assert_eq!(loco.direction(), Direction::Reverse);
    }

    #[test]
    fn same_direction_is_noop() {
        let mut loco = Locomotive::new(3, SpeedSteps::Steps128);
        loco.set_speed(60, 0, 0);
        assert!(!loco.set_direction(Direction::Forward));
        assert_eq!(loco.speed(), 60);
    }

    // =========================================================================
    // EntityTable Tests
    // =========================================================================

    #[test]
    fn table_add_until_full() {
        let mut table: EntityTable<Addon, 2> = EntityTable::new();
        assert_eq!(table.add(Addon::new(1)), Some(0));
        assert_eq!(table.add(Addon::new(2)), Some(1));
        assert_eq!(table.add(Addon::new(3)), None);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap().address(), 2);
    }
}
