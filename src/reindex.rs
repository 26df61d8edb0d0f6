//! Locomotive renumbering.
//!
//! A locomotive's index is its identity, so reordering or truncating the
//! table has to rewrite every reference to it. [`IndexRemap`] is the
//! `old -> new` map; [`apply`] rewrites the locomotive table, add-on links,
//! RCL track occupancy and pending events in one pass. The remap is
//! validated when it is built, so applying it cannot fail half way.
//!
//! # Example
//!
//! ```rust
//! use dcc_station::entity::LocoId;
//! use dcc_station::reindex::IndexRemap;
//!
//! // New table order: old 2, old 0, old 1.
//! let remap = IndexRemap::from_order(&[LocoId(2), LocoId(0), LocoId(1)], 3).unwrap();
//! assert_eq!(remap.get(LocoId(2)), Some(LocoId(0)));
//! assert_eq!(remap.get(LocoId(0)), Some(LocoId(1)));
//!
//! let shrink = IndexRemap::truncate(3, 1);
//! assert_eq!(shrink.get(LocoId(0)), Some(LocoId(0)));
//! assert_eq!(shrink.get(LocoId(2)), None);
//! ```

use heapless::Vec;

use crate::entity::{Addon, EntityTable, LocoId, Locomotive};
use crate::events::EventTable;
use crate::station::MAX_LOCOMOTIVES;
use crate::telemetry::TelemetryState;

/// Map from old locomotive index to new index (or removal).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexRemap {
    /// `forward[old]` is the new index, `None` if removed.
    forward: Vec<Option<u16>, MAX_LOCOMOTIVES>,
    /// `inverse[new]` is the old index.
    inverse: Vec<u16, MAX_LOCOMOTIVES>,
}

impl IndexRemap {
    /// Build from a new order: `order[new] = old`.
    ///
    /// Every index below `len` must appear exactly once.
    pub fn from_order(order: &[LocoId], len: usize) -> Result<Self, &'static str> {
        if order.len() != len || len > MAX_LOCOMOTIVES {
            return Err("order length does not match locomotive count");
        }
        let mut forward: Vec<Option<u16>, MAX_LOCOMOTIVES> = Vec::new();
        let _ = forward.resize(len, None);
        let mut inverse = Vec::new();

        for (new, old) in order.iter().enumerate() {
            let slot = forward
                .get_mut(usize::from(old.0))
                .ok_or("order names an unknown locomotive")?;
            if slot.is_some() {
                return Err("order names a locomotive twice");
            }
            *slot = Some(new as u16);
            let _ = inverse.push(old.0);
        }
        Ok(Self { forward, inverse })
    }

    /// Keep indices below `new_len`, drop the rest.
    pub fn truncate(len: usize, new_len: usize) -> Self {
        let len = len.min(MAX_LOCOMOTIVES);
        let keep = new_len.min(len);
        Self {
            forward: (0..len)
                .map(|i| (i < keep).then_some(i as u16))
                .collect(),
            inverse: (0..keep as u16).collect(),
        }
    }

    /// New index of `old`, `None` if it is removed.
    pub fn get(&self, old: LocoId) -> Option<LocoId> {
        self.forward
            .get(usize::from(old.0))
            .copied()
            .flatten()
            .map(LocoId)
    }

    /// Number of locomotives after the remap.
    pub fn new_len(&self) -> usize {
        self.inverse.len()
    }

    /// True if nothing moves and nothing is removed.
    pub fn is_identity(&self) -> bool {
        self.forward.len() == self.inverse.len()
            && self.inverse.iter().enumerate().all(|(i, &old)| usize::from(old) == i)
    }
}

/// Rewrite every table that refers to locomotives by index.
pub fn apply<const A: usize, const E: usize>(
    remap: &IndexRemap,
    locos: &mut EntityTable<Locomotive, MAX_LOCOMOTIVES>,
    addons: &mut EntityTable<Addon, A>,
    telemetry: &mut TelemetryState,
    events: &mut EventTable<E>,
) {
    if remap.is_identity() {
        return;
    }

    let mut old: Vec<Option<Locomotive>, MAX_LOCOMOTIVES> =
        locos.take_all().into_iter().map(Some).collect();
    let reordered = remap
        .inverse
        .iter()
        .filter_map(|&i| old.get_mut(usize::from(i)).and_then(Option::take))
        .collect();
    locos.replace_all(reordered);

    for addon in addons.iter_mut() {
        if let Some(loco) = addon.loco() {
            addon.set_loco(remap.get(loco));
        }
    }

    for track in telemetry.rcl_tracks_mut().iter_mut() {
        *track = track.and_then(|loco| remap.get(loco));
    }

    events.remap_locos(|loco| remap.get(loco));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::SpeedSteps;
    use crate::entity::Schedulable;
    use crate::events::EventAction;

    fn table(addresses: &[u16]) -> EntityTable<Locomotive, MAX_LOCOMOTIVES> {
        let mut locos = EntityTable::new();
        for &a in addresses {
            locos.add(Locomotive::new(a, SpeedSteps::Steps128));
        }
        locos
    }

    fn addresses(locos: &EntityTable<Locomotive, MAX_LOCOMOTIVES>) -> std::vec::Vec<u16> {
        locos.iter().map(|l| l.address()).collect()
    }

    #[test]
    fn order_must_be_a_permutation() {
        assert!(IndexRemap::from_order(&[LocoId(0), LocoId(0)], 2).is_err());
        assert!(IndexRemap::from_order(&[LocoId(0), LocoId(5)], 2).is_err());
        assert!(IndexRemap::from_order(&[LocoId(0)], 2).is_err());
        assert!(IndexRemap::from_order(&[LocoId(1), LocoId(0)], 2).is_ok());
    }

    #[test]
    fn identity_is_detected() {
        let remap = IndexRemap::from_order(&[LocoId(0), LocoId(1)], 2).unwrap();
        assert!(remap.is_identity());
        assert!(IndexRemap::truncate(3, 5).is_identity());
        assert!(!IndexRemap::truncate(3, 2).is_identity());
    }

    #[test]
    fn reorder_cascades() {
        let mut locos = table(&[10, 20, 30]);
        let mut addons: EntityTable<Addon, 4> = EntityTable::new();
        let mut coupled = Addon::new(100);
        coupled.set_loco(Some(LocoId(2)));
        addons.add(coupled);
        let mut telemetry = TelemetryState::new();
        telemetry.rcl_tracks_mut()[4] = Some(LocoId(0));
        let mut events: EventTable<8> = EventTable::new();
        events
            .add(
                0,
                5,
                EventAction::LocoFunction {
                    loco: LocoId(1),
                    function: 0,
                    on: true,
                },
            )
            .unwrap();

        let remap = IndexRemap::from_order(&[LocoId(2), LocoId(0), LocoId(1)], 3).unwrap();
        apply(&remap, &mut locos, &mut addons, &mut telemetry, &mut events);

        assert_eq!(addresses(&locos), vec![30, 10, 20]);
        assert_eq!(addons.get(0).unwrap().loco(), Some(LocoId(0)));
        assert_eq!(telemetry.rcl_track(4), Some(LocoId(1)));
        let (_, ev) = events.iter().next().unwrap();
        assert_eq!(ev.action.loco(), Some(LocoId(2)));
    }

    #[test]
    fn truncate_clears_references() {
        let mut locos = table(&[10, 20, 30]);
        let mut addons: EntityTable<Addon, 4> = EntityTable::new();
        let mut coupled = Addon::new(100);
        coupled.set_loco(Some(LocoId(2)));
        addons.add(coupled);
        let mut telemetry = TelemetryState::new();
        telemetry.rcl_tracks_mut()[0] = Some(LocoId(2));
        let mut events: EventTable<8> = EventTable::new();
        events
            .add(
                0,
                5,
                EventAction::LocoFunction {
                    loco: LocoId(2),
                    function: 0,
                    on: true,
                },
            )
            .unwrap();
        events
            .add(0, 5, EventAction::ExecuteMacro { macro_id: 1 })
            .unwrap();

        apply(
            &IndexRemap::truncate(3, 2),
            &mut locos,
            &mut addons,
            &mut telemetry,
            &mut events,
        );

        assert_eq!(addresses(&locos), vec![10, 20]);
        assert_eq!(addons.get(0).unwrap().loco(), None);
        assert_eq!(telemetry.rcl_track(0), None);
        assert_eq!(events.pending_count(), 1);
    }
}
