//! Availability guard for area-master neighbourhoods.
//!
//! A missing entity is only evidence of a stale ledger when every chunk it
//! could have wandered into is loaded. This guard answers that question for
//! the 5x5 footprint of an area master widened by a margin on every side.

use wm_error::{RepairError, Result};
use wm_types::{AREA_MASTER_SIZE_CHUNKS, ChunkCoord, ChunkKey};
use wm_world::ChunkCache;

/// Margin, in chunks, around an area master in which its entities are searched.
pub const ENTITY_SEARCH_RADIUS: i32 = 4;

/// True if every chunk of the area master's footprint, extended by
/// `extend_by` chunks in both axes, is loaded in `cluster`.
///
/// The index read lock is held for the whole check so no chunk can load or
/// unload halfway through. Callers holding a chunk mutex may call this; the
/// reverse lock order is never taken.
pub fn all_chunks_loaded(
    cache: &ChunkCache,
    area_master: ChunkCoord,
    cluster: u8,
    extend_by: i32,
) -> Result<bool> {
    if !area_master.is_area_master() {
        return Err(RepairError::NotAreaMaster {
            x: area_master.x,
            z: area_master.z,
        });
    }

    let index = cache.read_index();
    let span = AREA_MASTER_SIZE_CHUNKS + extend_by;
    for x in (area_master.x - extend_by)..(area_master.x + span) {
        for z in (area_master.z - extend_by)..(area_master.z + span) {
            if !index.contains(ChunkKey::new(ChunkCoord::new(x, z), cluster)) {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Number of chunks [`all_chunks_loaded`] inspects for a given margin.
#[must_use]
pub fn neighbourhood_size(extend_by: i32) -> usize {
    let side = usize::try_from(AREA_MASTER_SIZE_CHUNKS + 2 * extend_by).unwrap_or(0);
    side * side
}
