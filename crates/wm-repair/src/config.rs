//! Repair settings and process-scoped configuration state.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wm_error::{RepairError, Result};
use wm_types::WorldTime;
use wm_world::{SpawnSettings, World};

use crate::task::RepairTasks;

/// Longest respawn lock any area master can legitimately hold.
///
/// The larger of the player safe-zone horizon and the longest respawn delay
/// of any spawn group in any biome.
#[must_use]
pub fn max_allowed_respawn_delay(settings: &SpawnSettings) -> WorldTime {
    settings
        .safe_zone_delay()
        .max(settings.max_group_respawn_delay())
}

/// Cached [`max_allowed_respawn_delay`].
///
/// Computed on first use and kept until [`RespawnDelayCache::invalidate`] is
/// called, typically after the game tables are reloaded. Changes to the
/// tables are not seen until then.
#[derive(Debug, Default)]
pub struct RespawnDelayCache {
    cached: RwLock<Option<WorldTime>>,
}

impl RespawnDelayCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&self, settings: &SpawnSettings) -> WorldTime {
        if let Some(delay) = *self.cached.read() {
            return delay;
        }
        let mut slot = self.cached.write();
        *slot.get_or_insert_with(|| {
            let delay = max_allowed_respawn_delay(settings);
            debug!(
                target: "wm::repair::config",
                delay_ticks = delay.0,
                safe_zone_hours = settings.safe_zone_hours,
                "max allowed respawn delay computed"
            );
            delay
        })
    }

    #[must_use]
    pub fn cached(&self) -> Option<WorldTime> {
        *self.cached.read()
    }

    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }
}

/// State the engine keeps between runs. Owned by the caller.
#[derive(Debug, Default)]
pub struct RepairEnvironment {
    respawn_delay: RespawnDelayCache,
}

impl RepairEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_allowed_respawn_delay(&self, world: &World) -> WorldTime {
        self.respawn_delay.get_or_compute(&world.spawn_settings())
    }

    /// Drop cached values derived from the game tables.
    pub fn reload_config(&self) {
        self.respawn_delay.invalidate();
        debug!(target: "wm::repair::config", "repair environment invalidated");
    }
}

// ── Persisted settings ──────────────────────────────────────────────────────

/// Operator settings for scheduled repair, stored as JSON by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairSettings {
    pub auto_repair: bool,
    /// Letter codes of the tasks to run.
    pub tasks: String,
    pub simulate: bool,
    pub interval_secs: u64,
    /// Completed scheduled runs.
    pub run_counter: u64,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            auto_repair: false,
            tasks: RepairTasks::DEFAULT.letters(),
            simulate: false,
            interval_secs: 3600,
            run_counter: 0,
        }
    }
}

impl RepairSettings {
    /// Parse and validate settings.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)
            .map_err(|e| RepairError::InvalidSettings(format!("malformed JSON: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RepairError::InvalidSettings(format!("cannot serialize: {e}")))
    }

    #[must_use]
    pub fn task_set(&self) -> RepairTasks {
        RepairTasks::parse(&self.tasks)
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_set().is_empty() {
            return Err(RepairError::InvalidSettings(format!(
                "tasks {:?} select no known repair task",
                self.tasks
            )));
        }
        if self.auto_repair && self.interval_secs == 0 {
            return Err(RepairError::InvalidSettings(
                "interval_secs must be positive when auto_repair is on".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wm_world::BiomeSpawnGroup;

    fn settings(safe_zone_hours: u32, delays: &[u64]) -> SpawnSettings {
        let groups = delays
            .iter()
            .enumerate()
            .map(|(i, d)| BiomeSpawnGroup {
                name: format!("group{i}"),
                max_count: 1,
                respawn_delay: WorldTime(*d),
            })
            .collect();
        SpawnSettings {
            safe_zone_hours,
            biomes: BTreeMap::from([("forest".to_owned(), groups)]),
        }
    }

    #[test]
    fn max_delay_takes_larger_source() {
        assert_eq!(max_allowed_respawn_delay(&settings(6, &[100, 2_000])), WorldTime(6_000));
        assert_eq!(max_allowed_respawn_delay(&settings(1, &[100, 48_000])), WorldTime(48_000));
    }

    #[test]
    fn cache_is_stale_until_invalidated() {
        let cache = RespawnDelayCache::new();
        assert_eq!(cache.cached(), None);
        assert_eq!(cache.get_or_compute(&settings(2, &[])), WorldTime(2_000));
        assert_eq!(cache.get_or_compute(&settings(9, &[])), WorldTime(2_000));
        cache.invalidate();
        assert_eq!(cache.get_or_compute(&settings(9, &[])), WorldTime(9_000));
    }

    #[test]
    fn zero_delay_is_cached_too() {
        let cache = RespawnDelayCache::new();
        assert_eq!(cache.get_or_compute(&settings(0, &[])), WorldTime::ZERO);
        assert_eq!(cache.cached(), Some(WorldTime::ZERO));
    }

    #[test]
    fn environment_reads_world_tables_once() {
        let world = World::new(settings(3, &[]));
        let env = RepairEnvironment::new();
        assert_eq!(env.max_allowed_respawn_delay(&world), WorldTime(3_000));
        world.replace_spawn_settings(settings(5, &[]));
        assert_eq!(env.max_allowed_respawn_delay(&world), WorldTime(3_000));
        env.reload_config();
        assert_eq!(env.max_allowed_respawn_delay(&world), WorldTime(5_000));
    }

    #[test]
    fn settings_round_trip_and_defaults() {
        let parsed = RepairSettings::from_json(r#"{"auto_repair": true, "tasks": "r"}"#)
            .expect("valid settings");
        assert!(parsed.auto_repair);
        assert_eq!(parsed.interval_secs, 3600);
        assert_eq!(parsed.task_set().letters(), "R");

        let text = parsed.to_json().expect("serialize");
        assert_eq!(RepairSettings::from_json(&text).expect("reparse"), parsed);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let err = RepairSettings::from_json(r#"{"tasks": "xyz"}"#).expect_err("no tasks");
        assert!(err.is_fatal());
        let err = RepairSettings::from_json(r#"{"auto_repair": true, "interval_secs": 0}"#)
            .expect_err("zero interval");
        assert!(matches!(err, RepairError::InvalidSettings(_)));
        assert!(RepairSettings::from_json("{not json").is_err());
        // A zero interval is fine while the scheduler is off.
        assert!(RepairSettings::from_json(r#"{"interval_secs": 0}"#).is_ok());
    }
}
