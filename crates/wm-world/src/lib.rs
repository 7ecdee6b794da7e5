#![forbid(unsafe_code)]
//! In-process world graph: loaded chunks, their tile entities and spawn
//! ledgers, the power manager, and the live entity list.
//!
//! The world owns all locking. Readers and the simulation share it through
//! `&World`; every structure that the simulation may touch concurrently sits
//! behind its own `parking_lot` lock.

pub mod chunk;
pub mod power;
pub mod spawn;
pub mod tile;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use tracing::trace;
use wm_types::{BlockPos, ChunkKey, EntityId, SpawnerProvenance, SpawnerSource, WorldTime};

pub use chunk::{Chunk, ChunkCache, ChunkIndex, ChunkRef, TileEntitySync};
pub use power::{PowerDevice, PowerItem, PowerItemType, PowerManager, TriggerClass, TriggerType};
pub use spawn::{AreaSpawnLedger, BiomeSpawnGroup, SpawnSettings};
pub use tile::{ItemStack, PoweredCarrier, TileEntity, TileEntityState, TileEntityType};

/// A mobile entity currently alive in the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEntity {
    pub id: EntityId,
    pub class_name: String,
    pub position: BlockPos,
    /// Set when the entity was produced by a spawner.
    pub spawner: Option<SpawnerProvenance>,
}

/// The mutable world graph.
#[derive(Debug)]
pub struct World {
    time: AtomicU64,
    next_entity: AtomicI32,
    chunks: ChunkCache,
    entities: RwLock<BTreeMap<EntityId, LiveEntity>>,
    power: Mutex<PowerManager>,
    spawn_settings: RwLock<SpawnSettings>,
}

impl Default for World {
    fn default() -> Self {
        Self::new(SpawnSettings::default())
    }
}

impl World {
    #[must_use]
    pub fn new(spawn_settings: SpawnSettings) -> Self {
        Self {
            time: AtomicU64::new(0),
            next_entity: AtomicI32::new(1),
            chunks: ChunkCache::new(),
            entities: RwLock::new(BTreeMap::new()),
            power: Mutex::new(PowerManager::new()),
            spawn_settings: RwLock::new(spawn_settings),
        }
    }

    #[must_use]
    pub fn world_time(&self) -> WorldTime {
        WorldTime(self.time.load(Ordering::Acquire))
    }

    /// Jump the world clock, as an administrator's `settime` does.
    pub fn set_world_time(&self, time: WorldTime) {
        self.time.store(time.0, Ordering::Release);
    }

    #[must_use]
    pub fn chunks(&self) -> &ChunkCache {
        &self.chunks
    }

    /// Lock the power manager.
    pub fn power(&self) -> MutexGuard<'_, PowerManager> {
        self.power.lock()
    }

    pub fn spawn_settings(&self) -> RwLockReadGuard<'_, SpawnSettings> {
        self.spawn_settings.read()
    }

    pub fn replace_spawn_settings(&self, settings: SpawnSettings) {
        *self.spawn_settings.write() = settings;
    }

    // ── Entities ────────────────────────────────────────────────────────

    /// Add a live entity and return its id.
    pub fn spawn_entity(
        &self,
        class_name: &str,
        position: BlockPos,
        spawner: Option<SpawnerProvenance>,
    ) -> EntityId {
        let id = EntityId(self.next_entity.fetch_add(1, Ordering::Relaxed));
        trace!(target: "wm::world::entities", entity = id.0, class_name, "entity spawned");
        self.entities.write().insert(
            id,
            LiveEntity {
                id,
                class_name: class_name.to_owned(),
                position,
                spawner,
            },
        );
        id
    }

    /// Remove an entity from the world. Its spawn ledger is not told.
    pub fn remove_entity(&self, id: EntityId) -> Option<LiveEntity> {
        self.entities.write().remove(&id)
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    /// Number of live entities whose provenance matches all three fields.
    #[must_use]
    pub fn count_spawned_entities(
        &self,
        source: SpawnerSource,
        chunk: ChunkKey,
        group: &str,
    ) -> usize {
        self.entities
            .read()
            .values()
            .filter(|e| {
                e.spawner
                    .as_ref()
                    .is_some_and(|p| p.matches(source, chunk, group))
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wm_types::ChunkCoord;

    #[test]
    fn count_spawned_filters_on_provenance() {
        let world = World::default();
        let home = ChunkKey::new(ChunkCoord::new(0, 0), 0);
        let other = ChunkKey::new(ChunkCoord::new(5, 0), 0);
        let prov = |chunk, group: &str| SpawnerProvenance {
            source: SpawnerSource::Biome,
            chunk,
            group: group.to_owned(),
        };

        world.spawn_entity("zombieBoe", BlockPos::new(1, 60, 1), Some(prov(home, "ZombiesAll")));
        world.spawn_entity("zombieJoe", BlockPos::new(2, 60, 1), Some(prov(home, "ZombiesAll")));
        world.spawn_entity("animalStag", BlockPos::new(3, 60, 1), Some(prov(home, "AnimalsAll")));
        world.spawn_entity(
            "zombieArlene",
            BlockPos::new(90, 60, 1),
            Some(prov(other, "ZombiesAll")),
        );
        world.spawn_entity("playerLike", BlockPos::new(0, 60, 0), None);

        assert_eq!(world.entity_count(), 5);
        assert_eq!(
            world.count_spawned_entities(SpawnerSource::Biome, home, "ZombiesAll"),
            2
        );
        assert_eq!(
            world.count_spawned_entities(SpawnerSource::Dynamic, home, "ZombiesAll"),
            0
        );
    }

    #[test]
    fn world_time_round_trips() {
        let world = World::default();
        assert_eq!(world.world_time(), WorldTime::ZERO);
        world.set_world_time(WorldTime(123_456));
        assert_eq!(world.world_time(), WorldTime(123_456));
    }

    #[test]
    fn removing_entity_lowers_count() {
        let world = World::default();
        let id = world.spawn_entity("zombieBoe", BlockPos::new(0, 0, 0), None);
        assert!(world.remove_entity(id).is_some());
        assert!(world.remove_entity(id).is_none());
        assert_eq!(world.entity_count(), 0);
    }
}
