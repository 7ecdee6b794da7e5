//! Spawn ledger validation for area-master chunks.
//!
//! Two checks run per spawn group. A respawn lock reaching further into the
//! future than any configured delay allows is stale. A registered entity
//! count above the number of matching live entities means entities were
//! lost without the ledger being told; that conclusion is drawn from
//! absence, so it is only trusted when the whole neighbourhood is loaded.

use tracing::debug;
use wm_error::{RepairError, Result};
use wm_types::{SpawnerSource, WorldTime};
use wm_world::{AreaSpawnLedger, Chunk, World};

use crate::availability::{ENTITY_SEARCH_RADIUS, all_chunks_loaded, neighbourhood_size};

/// A disagreement between a ledger entry and the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerDefect {
    /// Respawn stays locked past the longest legitimate delay.
    LongRespawnLock {
        group: String,
        locked_until: WorldTime,
        max_allowed: WorldTime,
    },
    /// More entities registered than are alive.
    LostEntities {
        group: String,
        registered: u32,
        observed: u32,
    },
}

/// Lock-horizon check for one group.
///
/// Flags the group when `locked_until > now + max_allowed`.
#[must_use]
pub fn check_respawn_lock(
    ledger: &AreaSpawnLedger,
    group: &str,
    now: WorldTime,
    max_allowed: WorldTime,
) -> Option<LedgerDefect> {
    let locked_until = ledger.respawn_locked_until(group);
    if locked_until > now.saturating_add(max_allowed.0) {
        Some(LedgerDefect::LongRespawnLock {
            group: group.to_owned(),
            locked_until,
            max_allowed,
        })
    } else {
        None
    }
}

/// Lost-entity check for one group of an area master.
///
/// Returns `Ok(None)` when the group has nothing registered, is currently
/// locked, has at least as many live entities as registered, or when the
/// neighbourhood is only partly loaded. The last case is logged at debug.
pub fn check_lost_entities(
    world: &World,
    chunk: &Chunk,
    group: &str,
) -> Result<Option<LedgerDefect>> {
    let Some(ledger) = chunk.spawn_ledger() else {
        return Ok(None);
    };
    let registered = ledger.entities_spawned(group);
    if registered == 0 || !ledger.respawn_locked_until(group).is_zero() {
        return Ok(None);
    }

    let observed = world.count_spawned_entities(SpawnerSource::Biome, chunk.key(), group);
    let observed = u32::try_from(observed).unwrap_or(u32::MAX);
    if registered <= observed {
        return Ok(None);
    }

    let loaded =
        all_chunks_loaded(world.chunks(), chunk.coord(), chunk.cluster(), ENTITY_SEARCH_RADIUS)?;
    if !loaded {
        debug!(
            target: "wm::repair::spawn",
            area_master = %chunk.coord(),
            group,
            lost = registered - observed,
            radius = ENTITY_SEARCH_RADIUS,
            chunks_required = neighbourhood_size(ENTITY_SEARCH_RADIUS),
            "ignoring lost entities; neighbourhood not fully loaded"
        );
        return Ok(None);
    }

    Ok(Some(LedgerDefect::LostEntities {
        group: group.to_owned(),
        registered,
        observed,
    }))
}

/// Drop a stale respawn lock and mark the chunk for saving.
pub fn clear_respawn_lock(chunk: &mut Chunk, group: &str) -> Result<()> {
    let coord = chunk.coord();
    let ledger = chunk
        .spawn_ledger_mut()
        .ok_or(RepairError::NotAreaMaster {
            x: coord.x,
            z: coord.z,
        })?;
    ledger.clear_respawn_locked(group);
    chunk.set_modified(true);
    Ok(())
}

/// Move a group's registered count to `target` one step at a time.
///
/// Only the ledger's own increment and decrement are used, so whatever
/// bookkeeping the ledger attaches to them still runs.
pub fn set_entities_spawned(ledger: &mut AreaSpawnLedger, group: &str, target: u32) {
    loop {
        let current = ledger.entities_spawned(group);
        if current == target {
            break;
        }
        if current < target {
            ledger.inc_entities_spawned(group);
        } else {
            ledger.dec_entities_spawned(group);
        }
    }
}

/// Correct a lost-entity defect on the chunk's ledger and mark it for saving.
pub fn forget_lost_entities(chunk: &mut Chunk, group: &str, observed: u32) -> Result<()> {
    let coord = chunk.coord();
    let ledger = chunk
        .spawn_ledger_mut()
        .ok_or(RepairError::NotAreaMaster {
            x: coord.x,
            z: coord.z,
        })?;
    set_entities_spawned(ledger, group, observed);
    if ledger.entities_spawned(group) != observed {
        return Err(RepairError::RepairFailed(format!(
            "ledger of {coord} kept {} entities of {group}, wanted {observed}",
            ledger.entities_spawned(group)
        )));
    }
    chunk.set_modified(true);
    Ok(())
}
