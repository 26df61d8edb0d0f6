//! Deferred, de-duplicated actions.
//!
//! [`EventTable`] is a fixed-capacity slot table. An event is identified by
//! its delay and its full action (kind, target keys and payload); adding an
//! event whose identity is already pending reuses that slot instead of
//! taking a new one. Cancelling goes by [`EventKey`] alone. When every slot is taken, new events are dropped and
//! [`EventError::TableFull`] is returned with the table untouched.
//!
//! [`EventTable::sweep`] removes and returns every due event. Handlers run
//! on the returned batch, after the scan, so a handler that schedules more
//! events cannot disturb the sweep; anything it adds is first visited by
//! the next sweep.
//!
//! # Example
//!
//! ```rust
//! use dcc_station::entity::LocoId;
//! use dcc_station::events::{EventAction, EventTable};
//!
//! let mut table: EventTable<16> = EventTable::new();
//! let action = EventAction::LocoFunction { loco: LocoId(3), function: 5, on: false };
//!
//! table.add(0, 2, action).unwrap();
//! table.add(0, 2, action).unwrap();
//! assert_eq!(table.pending_count(), 1);
//!
//! assert!(table.sweep(100, 100, |_| false).is_empty());
//! let fired = table.sweep(200, 100, |_| false);
//! assert_eq!(fired.as_slice(), &[action]);
//! ```

use heapless::Vec;

use crate::entity::{AddonId, LocoId};
use crate::error::EventError;
use crate::traits::Direction;

/// Default number of concurrently pending events.
pub const EVENT_CAPACITY: usize = 256;

/// Milliseconds per delay unit.
pub const MS_PER_TENTH: u64 = 100;

/// Slot index of a pending event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventId(pub u16);

/// How a deferred speed change relates to the current speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpeedBound {
    /// Set the speed unconditionally.
    Exact,
    /// Raise to the speed if currently slower.
    Min,
    /// Lower to the speed if currently faster.
    Max,
}

impl SpeedBound {
    /// Whether a locomotive at `current` should move to `speed`.
    pub const fn applies(&self, current: u8, speed: u8) -> bool {
        match self {
            SpeedBound::Exact => true,
            SpeedBound::Min => current < speed,
            SpeedBound::Max => current > speed,
        }
    }
}

/// What a deferred event does when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventAction {
    /// Switch a locomotive function.
    LocoFunction {
        /// Target locomotive.
        loco: LocoId,
        /// Function index.
        function: u8,
        /// New state.
        on: bool,
    },
    /// Change a locomotive's speed.
    LocoSpeed {
        /// Target locomotive.
        loco: LocoId,
        /// Exact, at-least or at-most.
        bound: SpeedBound,
        /// Speed in native steps.
        speed: u8,
        /// Ramp duration; 0 is immediate.
        ramp_tenths: u16,
    },
    /// Change a locomotive's direction.
    LocoDirection {
        /// Target locomotive.
        loco: LocoId,
        /// New direction.
        direction: Direction,
    },
    /// Switch an add-on function.
    AddonFunction {
        /// Target add-on.
        addon: AddonId,
        /// Function index.
        function: u8,
        /// New state.
        on: bool,
    },
    /// Hold until an S88 contact is free, then start a locomotive.
    ///
    /// While the contact is occupied the event re-arms itself instead of
    /// firing.
    WaitForFreeDetector {
        /// S88 contact index to watch.
        contact: u16,
        /// Locomotive to start.
        loco: LocoId,
        /// Speed once free.
        speed: u8,
        /// Ramp duration for the start.
        ramp_tenths: u16,
    },
    /// Run a caller-defined macro.
    ExecuteMacro {
        /// Macro index.
        macro_id: u16,
    },
    /// Set an indicator LED.
    LedState {
        /// LED index.
        led: u16,
        /// On or off.
        on: bool,
    },
    /// Throw a switch (turnout).
    SwitchState {
        /// Switch index.
        switch: u16,
        /// Position.
        state: u8,
    },
    /// Show a signal aspect.
    SignalState {
        /// Signal index.
        signal: u16,
        /// Aspect.
        aspect: u8,
    },
}

/// Kind and target keys of an event, without the payload.
///
/// Fields mean the same as on the matching [`EventAction`] variant.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// See [`EventAction::LocoFunction`].
    LocoFunction { loco: LocoId, function: u8 },
    /// See [`EventAction::LocoSpeed`].
    LocoSpeed { loco: LocoId, bound: SpeedBound },
    /// See [`EventAction::LocoDirection`].
    LocoDirection { loco: LocoId },
    /// See [`EventAction::AddonFunction`].
    AddonFunction { addon: AddonId, function: u8 },
    /// See [`EventAction::WaitForFreeDetector`].
    WaitForFreeDetector { contact: u16, loco: LocoId },
    /// See [`EventAction::ExecuteMacro`].
    ExecuteMacro { macro_id: u16 },
    /// See [`EventAction::LedState`].
    LedState { led: u16 },
    /// See [`EventAction::SwitchState`].
    SwitchState { switch: u16 },
    /// See [`EventAction::SignalState`].
    SignalState { signal: u16 },
}

impl EventAction {
    /// De-duplication key.
    pub const fn key(&self) -> EventKey {
        match *self {
            EventAction::LocoFunction { loco, function, .. } => {
                EventKey::LocoFunction { loco, function }
            }
            EventAction::LocoSpeed { loco, bound, .. } => EventKey::LocoSpeed { loco, bound },
            EventAction::LocoDirection { loco, .. } => EventKey::LocoDirection { loco },
            EventAction::AddonFunction {
                addon, function, ..
            } => EventKey::AddonFunction { addon, function },
            EventAction::WaitForFreeDetector { contact, loco, .. } => {
                EventKey::WaitForFreeDetector { contact, loco }
            }
            EventAction::ExecuteMacro { macro_id } => EventKey::ExecuteMacro { macro_id },
            EventAction::LedState { led, .. } => EventKey::LedState { led },
            EventAction::SwitchState { switch, .. } => EventKey::SwitchState { switch },
            EventAction::SignalState { signal, .. } => EventKey::SignalState { signal },
        }
    }

    /// Locomotive the action refers to, if any.
    pub const fn loco(&self) -> Option<LocoId> {
        match *self {
            EventAction::LocoFunction { loco, .. }
            | EventAction::LocoSpeed { loco, .. }
            | EventAction::LocoDirection { loco, .. }
            | EventAction::WaitForFreeDetector { loco, .. } => Some(loco),
            _ => None,
        }
    }

    /// Same action pointed at a different locomotive.
    pub fn with_loco(mut self, new: LocoId) -> Self {
        match &mut self {
            EventAction::LocoFunction { loco, .. }
            | EventAction::LocoSpeed { loco, .. }
            | EventAction::LocoDirection { loco, .. }
            | EventAction::WaitForFreeDetector { loco, .. } => *loco = new,
            _ => {}
        }
        self
    }
}

/// One occupied slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeferredEvent {
    /// Absolute time the event fires.
    pub due_ms: u64,
    /// Delay it was scheduled with; part of its identity.
    pub delay_tenths: u16,
    /// What happens on firing.
    pub action: EventAction,
}

/// Fixed-capacity table of deferred events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventTable<const N: usize = EVENT_CAPACITY> {
    slots: [Option<DeferredEvent>; N],
    live: usize,
}

impl<const N: usize> EventTable<N> {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            slots: [None; N],
            live: 0,
        }
    }

    /// Number of pending events.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.live
    }

    /// Maximum number of pending events.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// True if no slot is free.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.live == N
    }

    /// Event in slot `id`, if occupied.
    pub fn get(&self, id: EventId) -> Option<&DeferredEvent> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    /// Iterate over pending events with their slot ids.
    pub fn iter(&self) -> impl Iterator<Item = (EventId, &DeferredEvent)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|ev| (EventId(i as u16), ev)))
    }

    /// Schedule `action` to fire `delay_tenths` after `now_ms`.
    ///
    /// A pending event with the same delay and action is reused as is
    /// (due time kept). The scan stops as soon as every
    /// live slot has been compared and a free slot is known.
    pub fn add(
        &mut self,
        now_ms: u64,
        delay_tenths: u16,
        action: EventAction,
    ) -> Result<EventId, EventError> {
        let mut seen = 0;
        let mut free = None;

        for (i, slot) in self.slots.iter_mut().enumerate() {
            match slot {
                Some(ev) => {
                    if ev.delay_tenths == delay_tenths && ev.action == action {
                        return Ok(EventId(i as u16));
                    }
                    seen += 1;
                }
                None if free.is_none() => free = Some(i),
                None => {}
            }
            if seen == self.live && free.is_some() {
                break;
            }
        }

        let Some(index) = free else {
            return Err(EventError::TableFull { capacity: N });
        };
        self.slots[index] = Some(DeferredEvent {
            due_ms: now_ms + u64::from(delay_tenths) * MS_PER_TENTH,
            delay_tenths,
            action,
        });
        self.live += 1;
        Ok(EventId(index as u16))
    }

    /// Remove every pending event with this key, whatever its delay.
    ///
    /// Returns the number removed.
    pub fn cancel(&mut self, key: EventKey) -> usize {
        self.cancel_where(|action| action.key() == key)
    }

    /// Remove every pending event whose action matches `pred`.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&EventAction) -> bool) -> usize {
        let mut removed = 0;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|ev| pred(&ev.action)) {
                *slot = None;
                removed += 1;
            }
        }
        self.live -= removed;
        removed
    }

    /// Remove every pending event.
    pub fn clear(&mut self) {
        self.slots = [None; N];
        self.live = 0;
    }

    /// Remove and return every event due by `now_ms`.
    ///
    /// A due [`EventAction::WaitForFreeDetector`] for which `still_waiting`
    /// returns true stays in its slot, re-armed `retry_ms` later.
    /// Each occupied slot is visited at most once.
    pub fn sweep(
        &mut self,
        now_ms: u64,
        retry_ms: u64,
        mut still_waiting: impl FnMut(&EventAction) -> bool,
    ) -> Vec<EventAction, N> {
        let mut fired = Vec::new();
        let live_at_entry = self.live;
        let mut visited = 0;

        for slot in self.slots.iter_mut() {
            if visited == live_at_entry {
                break;
            }
            let Some(ev) = slot else {
                continue;
            };
            visited += 1;
            if ev.due_ms > now_ms {
                continue;
            }
            if matches!(ev.action, EventAction::WaitForFreeDetector { .. })
                && still_waiting(&ev.action)
            {
                ev.due_ms = now_ms + retry_ms;
                continue;
            }
            // At most N events are live, so the batch cannot overflow.
            let _ = fired.push(ev.action);
            *slot = None;
            self.live -= 1;
        }
        fired
    }

    /// Rewrite or drop events that reference locomotives.
    ///
    /// `remap` returns the new id, or `None` to cancel the event.
    pub fn remap_locos(&mut self, mut remap: impl FnMut(LocoId) -> Option<LocoId>) {
        for slot in self.slots.iter_mut() {
            let Some(ev) = slot else {
                continue;
            };
            let Some(loco) = ev.action.loco() else {
                continue;
            };
            match remap(loco) {
                Some(new) => ev.action = ev.action.with_loco(new),
                None => {
                    *slot = None;
                    self.live -= 1;
                }
            }
        }
    }
}

impl<const N: usize> Default for EventTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(loco: u16, function: u8, on: bool) -> EventAction {
        EventAction::LocoFunction {
            loco: LocoId(loco),
            function,
            on,
        }
    }

    // =========================================================================
    // Insertion Tests
    // =========================================================================

    #[test]
    fn delay_converts_tenths_to_ms() {
        let mut table: EventTable<4> = EventTable::new();
        let id = table.add(1000, 25, func(1, 1, true)).unwrap();
        assert_eq!(table.get(id).unwrap().due_ms, 3500);
    }

    #[test]
    fn duplicate_reuses_slot() {
        let mut table: EventTable<4> = EventTable::new();
        let a = table.add(0, 2, func(3, 5, false)).unwrap();
        let b = table.add(50, 2, func(3, 5, false)).unwrap();
        assert_eq!(a, b);
        assert_eq!(table.pending_count(), 1);
        assert_eq!(table.get(a).unwrap().due_ms, 200);
    }

    #[test]
    fn different_payload_is_distinct() {
        let mut table: EventTable<4> = EventTable::new();
        let on = table.add(0, 20, func(3, 5, true)).unwrap();
        let off = table.add(0, 20, func(3, 5, false)).unwrap();
        assert_ne!(on, off);
        assert_eq!(table.pending_count(), 2);
        assert_eq!(table.get(on).unwrap().action, func(3, 5, true));
        assert_eq!(table.get(off).unwrap().action, func(3, 5, false));
    }

    #[test]
    fn different_delay_is_distinct() {
        let mut table: EventTable<4> = EventTable::new();
        table.add(0, 2, func(3, 5, false)).unwrap();
        table.add(0, 3, func(3, 5, false)).unwrap();
        assert_eq!(table.pending_count(), 2);
    }

    #[test]
    fn speed_bounds_are_distinct_kinds() {
        let mut table: EventTable<4> = EventTable::new();
        for bound in [SpeedBound::Exact, SpeedBound::Min, SpeedBound::Max] {
            table
                .add(
                    0,
                    1,
                    EventAction::LocoSpeed {
                        loco: LocoId(0),
                        bound,
                        speed: 10,
                        ramp_tenths: 0,
                    },
                )
                .unwrap();
        }
        assert_eq!(table.pending_count(), 3);
    }

    #[test]
    fn freed_slot_is_reused() {
        let mut table: EventTable<2> = EventTable::new();
        table.add(0, 0, func(1, 1, true)).unwrap();
        table.add(0, 5, func(2, 1, true)).unwrap();
        assert_eq!(table.sweep(0, 100, |_| false).len(), 1);
        let id = table.add(0, 5, func(3, 1, true)).unwrap();
        assert_eq!(id, EventId(0));
    }

    #[test]
    fn full_table_drops_and_leaves_state_unchanged() {
        let mut table: EventTable<3> = EventTable::new();
        for f in 0..3 {
            table.add(0, 10, func(1, f, true)).unwrap();
        }
        let before = table.clone();
        assert_eq!(
            table.add(0, 10, func(1, 9, true)),
            Err(EventError::TableFull { capacity: 3 })
        );
        assert_eq!(table, before);
    }

    #[test]
    fn full_table_still_deduplicates() {
        let mut table: EventTable<2> = EventTable::new();
        table.add(0, 10, func(1, 0, true)).unwrap();
        table.add(0, 10, func(1, 1, true)).unwrap();
        assert!(table.add(0, 10, func(1, 1, true)).is_ok());
        assert!(table.add(0, 10, func(1, 1, false)).is_err());
        assert_eq!(table.pending_count(), 2);
    }

    // =========================================================================
    // Cancel Tests
    // =========================================================================

    #[test]
    fn cancel_by_key_ignores_delay_and_payload() {
        let mut table: EventTable<8> = EventTable::new();
        table.add(0, 1, func(3, 5, true)).unwrap();
        table.add(0, 9, func(3, 5, false)).unwrap();
        table.add(0, 1, func(3, 6, true)).unwrap();
        let removed = table.cancel(EventKey::LocoFunction {
            loco: LocoId(3),
            function: 5,
        });
        assert_eq!(removed, 2);
        assert_eq!(table.pending_count(), 1);
    }

    // =========================================================================
    // Sweep Tests
    // =========================================================================

    #[test]
    fn sweep_fires_only_due_events() {
        let mut table: EventTable<8> = EventTable::new();
        table.add(0, 1, func(1, 1, true)).unwrap();
        table.add(0, 3, func(2, 1, true)).unwrap();
        let fired = table.sweep(100, 100, |_| false);
        assert_eq!(fired.as_slice(), &[func(1, 1, true)]);
        assert_eq!(table.pending_count(), 1);
    }

    #[test]
    fn wait_for_free_detector_rearms_while_occupied() {
        let mut table: EventTable<4> = EventTable::new();
        let wait = EventAction::WaitForFreeDetector {
            contact: 7,
            loco: LocoId(0),
            speed: 20,
            ramp_tenths: 10,
        };
        let id = table.add(0, 0, wait).unwrap();

        assert!(table.sweep(0, 100, |_| true).is_empty());
        assert_eq!(table.get(id).unwrap().due_ms, 100);

        assert!(table.sweep(50, 100, |_| true).is_empty());
        assert!(table.sweep(100, 100, |_| true).is_empty());
        assert_eq!(table.get(id).unwrap().due_ms, 200);

        let fired = table.sweep(200, 100, |_| false);
        assert_eq!(fired.as_slice(), &[wait]);
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn non_wait_events_ignore_predicate() {
        let mut table: EventTable<4> = EventTable::new();
        table.add(0, 0, func(1, 1, true)).unwrap();
        assert_eq!(table.sweep(0, 100, |_| true).len(), 1);
    }

    // =========================================================================
    // Remap Tests
    // =========================================================================

    #[test]
    fn remap_rewrites_and_cancels() {
        let mut table: EventTable<8> = EventTable::new();
        table.add(0, 1, func(0, 1, true)).unwrap();
        table.add(0, 1, func(1, 1, true)).unwrap();
        table
            .add(0, 1, EventAction::LedState { led: 4, on: true })
            .unwrap();

        table.remap_locos(|LocoId(i)| if i == 0 { None } else { Some(LocoId(i + 10)) });

        assert_eq!(table.pending_count(), 2);
        let locos: std::vec::Vec<_> = table.iter().filter_map(|(_, ev)| ev.action.loco()).collect();
        assert_eq!(locos, vec![LocoId(11)]);
    }

    #[test]
    fn speed_bound_applies() {
        assert!(SpeedBound::Exact.applies(50, 10));
        assert!(SpeedBound::Min.applies(5, 10));
        assert!(!SpeedBound::Min.applies(15, 10));
        assert!(SpeedBound::Max.applies(15, 10));
        assert!(!SpeedBound::Max.applies(5, 10));
    }
}
