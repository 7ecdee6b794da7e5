//! Biome spawn bookkeeping kept by area-master chunks, and the game tables
//! that configure it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wm_types::{TICKS_PER_HOUR, WorldTime};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct GroupSpawnState {
    entities_spawned: u32,
    respawn_locked_until: WorldTime,
}

impl GroupSpawnState {
    fn is_idle(self) -> bool {
        self.entities_spawned == 0 && self.respawn_locked_until.is_zero()
    }
}

/// Per-group spawn ledger of one area master.
///
/// Counters are only reachable through the increment/decrement accessors.
/// The ledger keeps two invariants of its own: a counter never goes below
/// zero, and a group with no registered entities and no lock is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaSpawnLedger {
    groups: BTreeMap<String, GroupSpawnState>,
}

impl AreaSpawnLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Names of all groups with bookkeeping in this ledger, sorted.
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    #[must_use]
    pub fn entities_spawned(&self, group: &str) -> u32 {
        self.groups.get(group).map_or(0, |g| g.entities_spawned)
    }

    pub fn inc_entities_spawned(&mut self, group: &str) {
        let state = self.groups.entry(group.to_owned()).or_default();
        state.entities_spawned = state.entities_spawned.saturating_add(1);
    }

    pub fn dec_entities_spawned(&mut self, group: &str) {
        if let Some(state) = self.groups.get_mut(group) {
            state.entities_spawned = state.entities_spawned.saturating_sub(1);
        }
        self.prune(group);
    }

    /// World time until which respawn of `group` is locked; zero if unlocked.
    #[must_use]
    pub fn respawn_locked_until(&self, group: &str) -> WorldTime {
        self.groups
            .get(group)
            .map_or(WorldTime::ZERO, |g| g.respawn_locked_until)
    }

    pub fn set_respawn_locked(&mut self, group: &str, until: WorldTime) {
        self.groups
            .entry(group.to_owned())
            .or_default()
            .respawn_locked_until = until;
        self.prune(group);
    }

    pub fn clear_respawn_locked(&mut self, group: &str) {
        if let Some(state) = self.groups.get_mut(group) {
            state.respawn_locked_until = WorldTime::ZERO;
        }
        self.prune(group);
    }

    fn prune(&mut self, group: &str) {
        if self.groups.get(group).is_some_and(|g| g.is_idle()) {
            self.groups.remove(group);
        }
    }
}

// ── Game tables ─────────────────────────────────────────────────────────────

/// One spawn group inside a biome definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiomeSpawnGroup {
    pub name: String,
    pub max_count: u32,
    /// Delay before the group may respawn after being cleared, in world ticks.
    pub respawn_delay: WorldTime,
}

/// Spawning configuration shared by every area master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnSettings {
    /// Hours a freshly spawned player is protected; also bounds respawn locks.
    pub safe_zone_hours: u32,
    /// Spawn groups keyed by biome name. A biome may have no groups.
    #[serde(default)]
    pub biomes: BTreeMap<String, Vec<BiomeSpawnGroup>>,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            safe_zone_hours: 1,
            biomes: BTreeMap::new(),
        }
    }
}

impl SpawnSettings {
    /// Lock horizon produced by the player safe zone, in world ticks.
    #[must_use]
    pub fn safe_zone_delay(&self) -> WorldTime {
        WorldTime(u64::from(self.safe_zone_hours).saturating_mul(TICKS_PER_HOUR))
    }

    /// Largest respawn delay configured for any group in any biome.
    #[must_use]
    pub fn max_group_respawn_delay(&self) -> WorldTime {
        self.biomes
            .values()
            .flatten()
            .map(|group| group.respawn_delay)
            .max()
            .unwrap_or(WorldTime::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_saturates_and_group_is_pruned() {
        let mut ledger = AreaSpawnLedger::new();
        ledger.inc_entities_spawned("ZombiesAll");
        ledger.inc_entities_spawned("ZombiesAll");
        assert_eq!(ledger.entities_spawned("ZombiesAll"), 2);

        ledger.dec_entities_spawned("ZombiesAll");
        ledger.dec_entities_spawned("ZombiesAll");
        ledger.dec_entities_spawned("ZombiesAll");
        assert_eq!(ledger.entities_spawned("ZombiesAll"), 0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn locked_group_survives_zero_count() {
        let mut ledger = AreaSpawnLedger::new();
        ledger.set_respawn_locked("AnimalsAll", WorldTime(5_000));
        assert_eq!(ledger.group_names(), vec!["AnimalsAll".to_owned()]);
        assert_eq!(ledger.respawn_locked_until("AnimalsAll"), WorldTime(5_000));

        ledger.clear_respawn_locked("AnimalsAll");
        assert!(ledger.is_empty());
        assert_eq!(ledger.respawn_locked_until("AnimalsAll"), WorldTime::ZERO);
    }

    #[test]
    fn clearing_lock_keeps_registered_entities() {
        let mut ledger = AreaSpawnLedger::new();
        ledger.inc_entities_spawned("ZombiesAll");
        ledger.set_respawn_locked("ZombiesAll", WorldTime(9));
        ledger.clear_respawn_locked("ZombiesAll");
        assert_eq!(ledger.entities_spawned("ZombiesAll"), 1);
        assert_eq!(ledger.group_names().len(), 1);
    }

    #[test]
    fn max_group_delay_scans_all_biomes() {
        let json = r#"{
            "safe_zone_hours": 2,
            "biomes": {
                "pine_forest": [
                    {"name": "ZombiesAll", "max_count": 4, "respawn_delay": 24000}
                ],
                "desert": [],
                "snow": [
                    {"name": "AnimalsAll", "max_count": 2, "respawn_delay": 96000},
                    {"name": "ZombiesNight", "max_count": 6, "respawn_delay": 12000}
                ]
            }
        }"#;
        let settings: SpawnSettings = serde_json::from_str(json).expect("parse settings");
        assert_eq!(settings.safe_zone_delay(), WorldTime(2_000));
        assert_eq!(settings.max_group_respawn_delay(), WorldTime(96_000));
        assert_eq!(settings.biomes["snow"][1].max_count, 6);
        assert!(settings.biomes["desert"].is_empty());
    }

    #[test]
    fn empty_settings_have_zero_group_delay() {
        assert_eq!(
            SpawnSettings::default().max_group_respawn_delay(),
            WorldTime::ZERO
        );
    }
}
