#![forbid(unsafe_code)]
//! Value types shared by every worldmend crate.
//!
//! Coordinates, keys, and clocks are unit-carrying newtypes so that chunk
//! coordinates, block positions, and world ticks cannot be mixed up at call
//! sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Edge length of a chunk in blocks (x and z axes).
pub const CHUNK_SIZE: i32 = 16;

/// Edge length, in chunks, of the square region governed by one area master.
pub const AREA_MASTER_SIZE_CHUNKS: i32 = 5;

/// World ticks per in-game hour.
pub const TICKS_PER_HOUR: u64 = 1000;

/// World ticks per in-game day.
pub const TICKS_PER_DAY: u64 = 24 * TICKS_PER_HOUR;

const KEY_AXIS_MASK: u64 = 0x00FF_FFFF;

// ── Chunk addressing ────────────────────────────────────────────────────────

/// Chunk coordinate on the x/z plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// True if this chunk anchors an area-master region.
    #[must_use]
    pub fn is_area_master(self) -> bool {
        self.x.rem_euclid(AREA_MASTER_SIZE_CHUNKS) == 0
            && self.z.rem_euclid(AREA_MASTER_SIZE_CHUNKS) == 0
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk({}, {})", self.x, self.z)
    }
}

/// Packed chunk cache key: 24-bit x, 24-bit z, 8-bit cluster index.
///
/// Spawner provenance on live entities stores this key, so the packing must
/// stay stable for the lifetime of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkKey(pub u64);

impl ChunkKey {
    #[must_use]
    pub fn new(coord: ChunkCoord, cluster: u8) -> Self {
        #[allow(clippy::cast_sign_loss)]
        let x = (coord.x as u64) & KEY_AXIS_MASK;
        #[allow(clippy::cast_sign_loss)]
        let z = (coord.z as u64) & KEY_AXIS_MASK;
        Self((u64::from(cluster) << 56) | (z << 24) | x)
    }

    #[must_use]
    pub fn coord(self) -> ChunkCoord {
        ChunkCoord {
            x: sign_extend_24(self.0 & KEY_AXIS_MASK),
            z: sign_extend_24((self.0 >> 24) & KEY_AXIS_MASK),
        }
    }

    #[must_use]
    pub fn cluster(self) -> u8 {
        #[allow(clippy::cast_possible_truncation)]
        let cluster = (self.0 >> 56) as u8;
        cluster
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn sign_extend_24(raw: u64) -> i32 {
    ((raw as u32) << 8) as i32 >> 8
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

// ── Block addressing ────────────────────────────────────────────────────────

/// Absolute block position in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Block position relative to the owning chunk's origin.
///
/// `x` and `z` are always below [`CHUNK_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocalPos {
    x: u8,
    y: u8,
    z: u8,
}

impl LocalPos {
    /// Returns `None` if `x` or `z` falls outside the chunk.
    #[must_use]
    pub fn new(x: u8, y: u8, z: u8) -> Option<Self> {
        let limit = CHUNK_SIZE.unsigned_abs();
        if u32::from(x) >= limit || u32::from(z) >= limit {
            return None;
        }
        Some(Self { x, y, z })
    }

    #[must_use]
    pub fn x(self) -> u8 {
        self.x
    }

    #[must_use]
    pub fn y(self) -> u8 {
        self.y
    }

    #[must_use]
    pub fn z(self) -> u8 {
        self.z
    }

    /// Absolute position of this local position inside `chunk`.
    #[must_use]
    pub fn to_world(self, chunk: ChunkCoord) -> BlockPos {
        BlockPos {
            x: chunk.x * CHUNK_SIZE + i32::from(self.x),
            y: i32::from(self.y),
            z: chunk.z * CHUNK_SIZE + i32::from(self.z),
        }
    }
}

impl fmt::Display for LocalPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local({}, {}, {})", self.x, self.y, self.z)
    }
}

// ── Time ────────────────────────────────────────────────────────────────────

/// Absolute world clock in ticks ([`TICKS_PER_HOUR`] ticks per game hour).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct WorldTime(pub u64);

impl WorldTime {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub fn saturating_add(self, ticks: u64) -> Self {
        Self(self.0.saturating_add(ticks))
    }

    #[must_use]
    pub fn saturating_sub(self, ticks: u64) -> Self {
        Self(self.0.saturating_sub(ticks))
    }

    /// Whole game days represented by this tick count.
    #[must_use]
    pub fn days(self) -> u64 {
        self.0 / TICKS_PER_DAY
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WorldTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}

// ── Identifiers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PowerItemId(pub u64);

impl fmt::Display for PowerItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "power#{}", self.0)
    }
}

// ── Spawner provenance ──────────────────────────────────────────────────────

/// Which spawning system produced a live entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnerSource {
    /// Regional biome spawning governed by an area master's spawn ledger.
    Biome,
    /// Fixed spawners placed in the world (sleeper volumes, blocks).
    StaticSpawner,
    /// Event-driven spawning (hordes, wandering groups).
    Dynamic,
}

/// Where a live entity was spawned from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpawnerProvenance {
    pub source: SpawnerSource,
    /// Key of the area-master chunk that registered the spawn.
    pub chunk: ChunkKey,
    /// Spawn group name inside the biome definition.
    pub group: String,
}

impl SpawnerProvenance {
    /// True if this provenance was registered by `group` in the ledger of `chunk`.
    #[must_use]
    pub fn matches(&self, source: SpawnerSource, chunk: ChunkKey, group: &str) -> bool {
        self.source == source && self.chunk == chunk && self.group == group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn area_master_every_fifth_chunk() {
        assert!(ChunkCoord::new(0, 0).is_area_master());
        assert!(ChunkCoord::new(5, -10).is_area_master());
        assert!(!ChunkCoord::new(1, 0).is_area_master());
        assert!(!ChunkCoord::new(-1, 5).is_area_master());
    }

    #[test]
    fn local_pos_rejects_out_of_chunk() {
        assert!(LocalPos::new(15, 255, 15).is_some());
        assert!(LocalPos::new(16, 0, 0).is_none());
        assert!(LocalPos::new(0, 0, 16).is_none());
    }

    #[test]
    fn local_to_world() {
        let local = LocalPos::new(3, 40, 15).expect("valid local pos");
        assert_eq!(
            local.to_world(ChunkCoord::new(-2, 1)),
            BlockPos::new(-29, 40, 31)
        );
    }

    #[test]
    fn world_time_days() {
        assert_eq!(WorldTime(TICKS_PER_DAY * 7 + 5).days(), 7);
        assert_eq!(WorldTime(u64::MAX).saturating_add(1), WorldTime(u64::MAX));
    }

    #[test]
    fn provenance_match_requires_all_fields() {
        let key = ChunkKey::new(ChunkCoord::new(5, 5), 0);
        let prov = SpawnerProvenance {
            source: SpawnerSource::Biome,
            chunk: key,
            group: "ZombiesAll".into(),
        };
        assert!(prov.matches(SpawnerSource::Biome, key, "ZombiesAll"));
        assert!(!prov.matches(SpawnerSource::Dynamic, key, "ZombiesAll"));
        assert!(!prov.matches(SpawnerSource::Biome, key, "AnimalsAll"));
        assert!(!prov.matches(
            SpawnerSource::Biome,
            ChunkKey::new(ChunkCoord::new(0, 5), 0),
            "ZombiesAll"
        ));
    }

    #[test]
    fn spawner_source_serializes_snake_case() {
        let json = serde_json::to_string(&SpawnerSource::StaticSpawner).expect("serialize");
        assert_eq!(json, "\"static_spawner\"");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn chunk_key_preserves_coords(
            x in -0x7F_FFFF_i32..0x7F_FFFF_i32,
            z in -0x7F_FFFF_i32..0x7F_FFFF_i32,
            cluster in any::<u8>(),
        ) {
            let key = ChunkKey::new(ChunkCoord::new(x, z), cluster);
            prop_assert_eq!(key.coord(), ChunkCoord::new(x, z));
            prop_assert_eq!(key.cluster(), cluster);
        }
    }
}
