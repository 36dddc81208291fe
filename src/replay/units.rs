//! Transient unit lifetime tracking.
//!
//! The game reuses unit tag indices over a match, so live units are
//! keyed by the composite (index, recycle) [`UnitTag`]. Records are
//! created on init/born, re-pointed on ownership transfer, and removed
//! on death. Lookups miss silently; a death for an untracked unit is a
//! normal occurrence (map decoration, pre-game spawns).

use std::collections::HashMap;

use tracing::warn;

use crate::protocol::events::UnitTag;
use crate::replay::player::PlayerId;

/// One live unit's current owner and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    /// Raw controlling player id from the birth event.
    pub control_player_id: i64,
    /// Current catalog name; updated on type change.
    pub unit_type: String,
}

impl UnitRecord {
    /// The controlling player id as a roster key.
    #[must_use]
    pub fn owner(&self) -> PlayerId {
        PlayerId(self.control_player_id)
    }
}

/// Registry of live units keyed by composite tag.
#[derive(Debug, Clone, Default)]
pub struct UnitTracker {
    records: HashMap<UnitTag, UnitRecord>,
}

impl UnitTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        UnitTracker::default()
    }

    /// Registers a unit at birth, replacing any stale record behind a
    /// recycled tag.
    pub fn add(&mut self, tag: UnitTag, unit_type: &str, control_player_id: i64) {
        self.records.insert(
            tag,
            UnitRecord {
                control_player_id,
                unit_type: unit_type.to_owned(),
            },
        );
    }

    /// Looks up a live unit; a miss returns `None`, never an error.
    #[must_use]
    pub fn get(&self, tag: UnitTag) -> Option<&UnitRecord> {
        self.records.get(&tag)
    }

    /// Points a live unit at a new controlling player.
    pub fn set_owner(&mut self, tag: UnitTag, control_player_id: i64) {
        if let Some(record) = self.records.get_mut(&tag) {
            record.control_player_id = control_player_id;
        }
    }

    /// Updates a live unit's catalog name after a morph.
    pub fn set_type(&mut self, tag: UnitTag, unit_type: &str) {
        if let Some(record) = self.records.get_mut(&tag) {
            record.unit_type = unit_type.to_owned();
        }
    }

    /// Removes a unit at death, logging when the tag was unknown.
    pub fn remove(&mut self, tag: UnitTag) -> Option<UnitRecord> {
        let record = self.records.remove(&tag);
        if record.is_none() {
            warn!(index = tag.index, recycle = tag.recycle, "removing untracked unit");
        }
        record
    }

    /// Number of live units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no units are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let mut tracker = UnitTracker::new();
        let tag = UnitTag::new(100, 1);
        tracker.add(tag, "Bunker", 3);

        let record = tracker.get(tag).unwrap();
        assert_eq!(record.unit_type, "Bunker");
        assert_eq!(record.owner(), PlayerId(3));
    }

    #[test]
    fn test_recycled_tag_is_distinct() {
        let mut tracker = UnitTracker::new();
        tracker.add(UnitTag::new(100, 1), "Marine", 1);
        tracker.add(UnitTag::new(100, 2), "Reaper", 2);

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.get(UnitTag::new(100, 1)).unwrap().unit_type, "Marine");
        assert_eq!(tracker.get(UnitTag::new(100, 2)).unwrap().unit_type, "Reaper");
    }

    #[test]
    fn test_set_owner_rekeys_in_place() {
        let mut tracker = UnitTracker::new();
        let tag = UnitTag::new(7, 1);
        tracker.add(tag, "Bunker", 1);
        tracker.set_owner(tag, 2);
        assert_eq!(tracker.get(tag).unwrap().owner(), PlayerId(2));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_remove_miss_is_none() {
        let mut tracker = UnitTracker::new();
        assert!(tracker.remove(UnitTag::new(1, 1)).is_none());
        assert!(tracker.get(UnitTag::new(1, 1)).is_none());
    }

    #[test]
    fn test_set_type_after_morph() {
        let mut tracker = UnitTracker::new();
        let tag = UnitTag::new(9, 1);
        tracker.add(tag, "SiegeBreaker", 4);
        tracker.set_type(tag, "SiegeBreakerSieged");
        assert_eq!(tracker.get(tag).unwrap().unit_type, "SiegeBreakerSieged");
    }
}
