//! Chunks and the cache of currently loaded chunks.

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use wm_error::{RepairError, Result};
use wm_types::{BlockPos, ChunkCoord, ChunkKey, LocalPos};

use crate::spawn::AreaSpawnLedger;
use crate::tile::TileEntity;

/// Client update queued when a tile entity appears or disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEntitySync {
    Added(LocalPos),
    Removed(LocalPos),
}

/// A loaded chunk and everything attached to it.
#[derive(Debug)]
pub struct Chunk {
    coord: ChunkCoord,
    cluster: u8,
    tile_entities: BTreeMap<LocalPos, TileEntity>,
    spawn_ledger: Option<AreaSpawnLedger>,
    modified: bool,
    pending_sync: Vec<TileEntitySync>,
}

impl Chunk {
    #[must_use]
    pub fn new(coord: ChunkCoord, cluster: u8) -> Self {
        Self {
            coord,
            cluster,
            tile_entities: BTreeMap::new(),
            spawn_ledger: None,
            modified: false,
            pending_sync: Vec::new(),
        }
    }

    #[must_use]
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    #[must_use]
    pub fn cluster(&self) -> u8 {
        self.cluster
    }

    #[must_use]
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.coord, self.cluster)
    }

    #[must_use]
    pub fn is_area_master(&self) -> bool {
        self.coord.is_area_master()
    }

    #[must_use]
    pub fn world_pos(&self, local: LocalPos) -> BlockPos {
        local.to_world(self.coord)
    }

    // ── Tile entities ───────────────────────────────────────────────────

    #[must_use]
    pub fn tile_entity(&self, pos: LocalPos) -> Option<&TileEntity> {
        self.tile_entities.get(&pos)
    }

    pub fn tile_entity_mut(&mut self, pos: LocalPos) -> Option<&mut TileEntity> {
        self.tile_entities.get_mut(&pos)
    }

    pub fn tile_entities(&self) -> impl Iterator<Item = &TileEntity> {
        self.tile_entities.values()
    }

    /// Snapshot of occupied positions, safe to iterate while mutating.
    #[must_use]
    pub fn tile_entity_positions(&self) -> Vec<LocalPos> {
        self.tile_entities.keys().copied().collect()
    }

    #[must_use]
    pub fn tile_entity_count(&self) -> usize {
        self.tile_entities.len()
    }

    /// Insert a tile entity at its own local position, returning any entity
    /// it displaced.
    pub fn add_tile_entity(&mut self, tile_entity: TileEntity) -> Option<TileEntity> {
        let pos = tile_entity.local_pos();
        if !tile_entity.modified_check_disabled() {
            self.pending_sync.push(TileEntitySync::Added(pos));
        }
        self.modified = true;
        self.tile_entities.insert(pos, tile_entity)
    }

    /// Detach the tile entity at `pos`.
    ///
    /// Entities with their modified check disabled leave without queueing a
    /// client update.
    pub fn remove_tile_entity(&mut self, pos: LocalPos) -> Option<TileEntity> {
        let removed = self.tile_entities.remove(&pos)?;
        if !removed.modified_check_disabled() {
            self.pending_sync.push(TileEntitySync::Removed(pos));
        }
        self.modified = true;
        Some(removed)
    }

    #[must_use]
    pub fn pending_sync(&self) -> &[TileEntitySync] {
        &self.pending_sync
    }

    pub fn drain_pending_sync(&mut self) -> Vec<TileEntitySync> {
        std::mem::take(&mut self.pending_sync)
    }

    // ── Spawn bookkeeping ───────────────────────────────────────────────

    #[must_use]
    pub fn spawn_ledger(&self) -> Option<&AreaSpawnLedger> {
        self.spawn_ledger.as_ref()
    }

    pub fn spawn_ledger_mut(&mut self) -> Option<&mut AreaSpawnLedger> {
        self.spawn_ledger.as_mut()
    }

    /// Attach a spawn ledger. Only area masters keep spawn bookkeeping.
    pub fn set_spawn_ledger(&mut self, ledger: AreaSpawnLedger) -> Result<()> {
        if !self.is_area_master() {
            return Err(RepairError::NotAreaMaster {
                x: self.coord.x,
                z: self.coord.z,
            });
        }
        self.spawn_ledger = Some(ledger);
        Ok(())
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }
}

// ── Chunk cache ─────────────────────────────────────────────────────────────

/// Shared handle to a loaded chunk.
pub type ChunkRef = Arc<Mutex<Chunk>>;

/// Index of loaded chunks behind one index-wide read/write lock.
///
/// Lock order: a chunk's own mutex may be held while taking the index read
/// lock, never the other way round.
#[derive(Debug, Default)]
pub struct ChunkCache {
    index: RwLock<BTreeMap<ChunkKey, ChunkRef>>,
}

/// Read view of the chunk index; loads and unloads block while it is held.
pub struct ChunkIndex<'a> {
    guard: RwLockReadGuard<'a, BTreeMap<ChunkKey, ChunkRef>>,
}

impl ChunkIndex<'_> {
    #[must_use]
    pub fn contains(&self, key: ChunkKey) -> bool {
        self.guard.contains_key(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guard.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }
}

impl ChunkCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize a chunk. A chunk already loaded under the same key is replaced.
    pub fn insert(&self, chunk: Chunk) -> ChunkRef {
        let key = chunk.key();
        let coord = chunk.coord();
        let handle = Arc::new(Mutex::new(chunk));
        self.index.write().insert(key, Arc::clone(&handle));
        debug!(target: "wm::world::chunks", %coord, %key, "chunk loaded");
        handle
    }

    pub fn unload(&self, key: ChunkKey) -> Option<ChunkRef> {
        let removed = self.index.write().remove(&key);
        if removed.is_some() {
            debug!(target: "wm::world::chunks", %key, "chunk unloaded");
        }
        removed
    }

    #[must_use]
    pub fn get(&self, key: ChunkKey) -> Option<ChunkRef> {
        self.index.read().get(&key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: ChunkKey) -> bool {
        self.index.read().contains_key(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Copy of all loaded chunk handles, taken under the index lock.
    #[must_use]
    pub fn chunk_array_copy(&self) -> Vec<ChunkRef> {
        self.index.read().values().cloned().collect()
    }

    /// Hold the index read lock for a batch of membership queries.
    #[must_use]
    pub fn read_index(&self) -> ChunkIndex<'_> {
        ChunkIndex {
            guard: self.index.read(),
        }
    }
}
