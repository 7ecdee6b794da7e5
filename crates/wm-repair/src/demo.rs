//! Self-contained world repair demo.
//!
//! Builds a deterministic square of loaded chunks with healthy power
//! networks and spawn ledgers, injects every kind of defect the engine knows
//! about, then runs a simulate pass, a repair pass and a verification pass.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::info;
use wm_error::{RepairError, Result};
use wm_types::{
    BlockPos, ChunkCoord, LocalPos, SpawnerProvenance, SpawnerSource, TICKS_PER_DAY, WorldTime,
};
use wm_world::{
    AreaSpawnLedger, BiomeSpawnGroup, Chunk, PowerDevice, PowerItemType, PoweredCarrier,
    SpawnSettings, TileEntity, TileEntityType, TriggerClass, TriggerType, World,
};

use crate::config::RepairEnvironment;
use crate::engine::run;
use crate::task::RepairTasks;

/// Smallest grid that fully loads the neighbourhood of area master (5, 5).
const MIN_GRID_CHUNKS: i32 = 15;
const MAX_CORRUPT_POWER_BLOCKS: usize = 25 * 256;
const LOCK_CANDIDATES: [ChunkCoord; 5] = [
    ChunkCoord::new(10, 10),
    ChunkCoord::new(10, 5),
    ChunkCoord::new(10, 0),
    ChunkCoord::new(5, 10),
    ChunkCoord::new(0, 10),
];
const CORRUPT_Y: u8 = 64;
const HEALTHY_Y: u8 = 70;

/// Configuration for the world repair demo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldRepairDemoConfig {
    /// Side length of the loaded square, in chunks, starting at (0, 0).
    pub grid_chunks: i32,
    pub corrupt_power_blocks: usize,
    /// Entities registered at area master (5, 5) that no longer exist.
    pub lost_entities: u32,
    /// Entities of the same group that are still alive.
    pub alive_entities: u32,
    /// Area masters whose animal respawn is locked far into the future.
    pub locked_groups: usize,
}

impl Default for WorldRepairDemoConfig {
    fn default() -> Self {
        Self {
            grid_chunks: MIN_GRID_CHUNKS,
            corrupt_power_blocks: 8,
            lost_entities: 7,
            alive_entities: 3,
            locked_groups: 2,
        }
    }
}

/// Result from one demo run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldRepairDemoResult {
    pub injected_defects: usize,
    pub found_in_simulation: usize,
    pub repaired: usize,
    pub remaining_after_repair: usize,
    pub chunks_scanned: usize,
    pub all_ok: bool,
    pub duration_ms: u64,
    pub output_lines: Vec<String>,
}

/// A freshly built demo world and the number of defects planted in it.
#[derive(Debug)]
pub struct DemoWorld {
    pub world: World,
    pub injected_defects: usize,
}

/// Run the full demo and return metrics plus README-friendly output lines.
pub fn run_world_repair_demo(config: &WorldRepairDemoConfig) -> Result<WorldRepairDemoResult> {
    let started = Instant::now();
    let demo = build_demo_world(config)?;
    let world = &demo.world;
    let env = RepairEnvironment::new();

    info!(
        target: "wm::repair::demo",
        grid_chunks = config.grid_chunks,
        injected = demo.injected_defects,
        "demo start"
    );

    let before = WorldFingerprint::take(world);
    let simulated = run(world, &env, RepairTasks::DEFAULT, true, None)?;
    let unchanged_by_simulation = WorldFingerprint::take(world) == before;

    let repaired = run(world, &env, RepairTasks::DEFAULT, false, None)?;
    let verified = run(world, &env, RepairTasks::DEFAULT, true, None)?;

    let all_ok = unchanged_by_simulation
        && simulated.problems_found == demo.injected_defects
        && repaired.problems_found == demo.injected_defects
        && repaired.failures == 0
        && verified.is_clean();
    info!(
        target: "wm::repair::demo",
        found = simulated.problems_found,
        repaired = repaired.problems_found,
        remaining = verified.problems_found,
        all_ok,
        "verification complete"
    );
    if !all_ok {
        return Err(RepairError::RepairFailed(format!(
            "demo verification failed: injected {}, simulated {}, repaired {}, remaining {}",
            demo.injected_defects,
            simulated.problems_found,
            repaired.problems_found,
            verified.problems_found
        )));
    }

    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let output_lines = vec![
        format!(
            "demo start: {0}x{0} chunks, tasks {1}",
            config.grid_chunks,
            RepairTasks::DEFAULT
        ),
        format!(
            "world built: {} chunks, {} tile entities, {} live entities",
            world.chunks().len(),
            before.tile_entities,
            world.entity_count()
        ),
        format!(
            "corruption injected: {} defects ({} power blocks, {} spawn ledgers)",
            demo.injected_defects,
            config.corrupt_power_blocks,
            demo.injected_defects - config.corrupt_power_blocks
        ),
        format!(
            "scan (without repair): {} problems in {} chunks",
            simulated.problems_found, simulated.chunks_scanned
        ),
        format!(
            "repair complete: {} repaired, {} failed",
            repaired.problems_found, repaired.failures
        ),
        format!(
            "verification: {} problems remaining",
            verified.problems_found
        ),
        "demo result: PASS".to_owned(),
    ];

    Ok(WorldRepairDemoResult {
        injected_defects: demo.injected_defects,
        found_in_simulation: simulated.problems_found,
        repaired: repaired.problems_found,
        remaining_after_repair: verified.problems_found,
        chunks_scanned: repaired.chunks_scanned,
        all_ok,
        duration_ms,
        output_lines,
    })
}

/// Build the demo world with all configured defects planted.
pub fn build_demo_world(config: &WorldRepairDemoConfig) -> Result<DemoWorld> {
    validate_config(config)?;
    let world = World::new(demo_spawn_settings());
    world.set_world_time(WorldTime(3 * TICKS_PER_DAY));

    let mut chunks = BTreeMap::new();
    for x in 0..config.grid_chunks {
        for z in 0..config.grid_chunks {
            let coord = ChunkCoord::new(x, z);
            let mut chunk = Chunk::new(coord, 0);
            place_healthy_network(&world, &mut chunk)?;
            if coord.is_area_master() {
                chunk.set_spawn_ledger(AreaSpawnLedger::new())?;
            }
            chunks.insert(coord, chunk);
        }
    }

    let mut injected = 0;
    for i in 0..config.corrupt_power_blocks {
        let coord = ChunkCoord::new(5 + index_i32(i % 5)?, 5 + index_i32((i / 5) % 5)?);
        let chunk = chunk_entry(&mut chunks, coord)?;
        plant_corrupt_power_block(&world, chunk, i)?;
        injected += 1;
    }

    if let Some(chunk) = chunks.get_mut(&ChunkCoord::new(5, 5)) {
        plant_unknown_trigger(&world, chunk)?;
    }

    injected += plant_lost_entities(&world, &mut chunks, config)?;

    let lock_until = world
        .world_time()
        .saturating_add(demo_spawn_settings().max_group_respawn_delay().0)
        .saturating_add(5 * TICKS_PER_DAY);
    for coord in LOCK_CANDIDATES.iter().take(config.locked_groups) {
        let chunk = chunk_entry(&mut chunks, *coord)?;
        if let Some(ledger) = chunk.spawn_ledger_mut() {
            ledger.set_respawn_locked("AnimalsAll", lock_until);
            injected += 1;
        }
    }

    for (_, mut chunk) in chunks {
        chunk.set_modified(false);
        chunk.drain_pending_sync();
        world.chunks().insert(chunk);
    }

    Ok(DemoWorld {
        world,
        injected_defects: injected,
    })
}

fn validate_config(config: &WorldRepairDemoConfig) -> Result<()> {
    if config.grid_chunks < MIN_GRID_CHUNKS {
        return Err(RepairError::InvalidSettings(format!(
            "grid_chunks must be at least {MIN_GRID_CHUNKS}, got {}",
            config.grid_chunks
        )));
    }
    if config.corrupt_power_blocks > MAX_CORRUPT_POWER_BLOCKS {
        return Err(RepairError::InvalidSettings(format!(
            "corrupt_power_blocks must be at most {MAX_CORRUPT_POWER_BLOCKS}"
        )));
    }
    if config.locked_groups > LOCK_CANDIDATES.len() {
        return Err(RepairError::InvalidSettings(format!(
            "locked_groups must be at most {}",
            LOCK_CANDIDATES.len()
        )));
    }
    Ok(())
}

fn demo_spawn_settings() -> SpawnSettings {
    let group = |name: &str, max_count, days| BiomeSpawnGroup {
        name: name.to_owned(),
        max_count,
        respawn_delay: WorldTime(days * TICKS_PER_DAY),
    };
    SpawnSettings {
        safe_zone_hours: 1,
        biomes: BTreeMap::from([
            (
                "pine_forest".to_owned(),
                vec![group("ZombiesAll", 10, 1), group("AnimalsAll", 4, 2)],
            ),
            ("desert".to_owned(), vec![group("ZombiesAll", 6, 1)]),
        ]),
    }
}

fn index_i32(i: usize) -> Result<i32> {
    i32::try_from(i).map_err(|_| RepairError::InvalidSettings(format!("index {i} overflows i32")))
}

fn index_u8(i: usize) -> Result<u8> {
    u8::try_from(i).map_err(|_| RepairError::InvalidSettings(format!("index {i} overflows u8")))
}

fn local(x: usize, y: u8, z: usize) -> Result<LocalPos> {
    LocalPos::new(index_u8(x)?, y, index_u8(z)?)
        .ok_or_else(|| RepairError::InvalidSettings(format!("({x}, {y}, {z}) outside a chunk")))
}

fn chunk_entry(chunks: &mut BTreeMap<ChunkCoord, Chunk>, coord: ChunkCoord) -> Result<&mut Chunk> {
    chunks.get_mut(&coord).ok_or(RepairError::ChunkNotLoaded {
        key: wm_types::ChunkKey::new(coord, 0).0,
    })
}

/// Generator wired to a lamp through a switch, all consistent.
fn place_healthy_network(world: &World, chunk: &mut Chunk) -> Result<()> {
    let generator_pos = local(15, HEALTHY_Y, 15)?;
    let switch_pos = local(14, HEALTHY_Y, 15)?;
    let lamp_pos = local(13, HEALTHY_Y, 15)?;

    let mut power = world.power();
    let mut generator = TileEntity::instantiate(TileEntityType::PowerSource, generator_pos);
    let mut switch = TileEntity::instantiate(TileEntityType::Trigger, switch_pos);
    let mut lamp = TileEntity::instantiate(TileEntityType::Powered, lamp_pos);

    let mut ids = Vec::with_capacity(3);
    for te in [&mut generator, &mut switch, &mut lamp] {
        let pos = chunk.world_pos(te.local_pos());
        let carrier = te
            .powered_mut()
            .ok_or_else(|| RepairError::RepairFailed("demo block is not powered".to_owned()))?;
        ids.push(carrier.initialize_power_data(pos, &mut power));
    }
    power.wire(ids[0], ids[1])?;
    power.wire(ids[1], ids[2])?;
    drop(power);

    chunk.add_tile_entity(generator);
    chunk.add_tile_entity(switch);
    chunk.add_tile_entity(lamp);
    Ok(())
}

fn plant_corrupt_power_block(world: &World, chunk: &mut Chunk, i: usize) -> Result<()> {
    let pos = local((i / 25) % 16, CORRUPT_Y, (i / 400) % 16)?;
    let world_pos = chunk.world_pos(pos);
    let mut power = world.power();

    let (tile_type, carrier, binding) = match i % 4 {
        0 => (
            TileEntityType::Powered,
            PoweredCarrier::new(PowerItemType::Consumer),
            power.add_item(world_pos, PowerDevice::Generator),
        ),
        1 => (
            TileEntityType::Trigger,
            PoweredCarrier::new_trigger(PowerItemType::Consumer, TriggerType::Switch),
            power.add_item(world_pos, PowerDevice::Consumer),
        ),
        2 => (
            TileEntityType::Trigger,
            PoweredCarrier::new_trigger(PowerItemType::Consumer, TriggerType::Motion),
            power.add_item(
                world_pos,
                PowerDevice::Trigger {
                    class: TriggerClass::PressurePlate,
                    trigger_type: TriggerType::Motion,
                },
            ),
        ),
        _ => {
            let id = power.add_item(world_pos, PowerDevice::Generator);
            power.remove_node(id);
            (
                TileEntityType::PowerSource,
                PoweredCarrier::new(PowerItemType::Generator),
                id,
            )
        }
    };
    drop(power);

    let mut te = TileEntity::instantiate(tile_type, pos);
    let slot = te
        .powered_mut()
        .ok_or_else(|| RepairError::RepairFailed("demo block is not powered".to_owned()))?;
    *slot = carrier;
    slot.bind(binding);
    chunk.add_tile_entity(te);
    Ok(())
}

/// A trigger whose subtype this engine does not know. Never a defect.
fn plant_unknown_trigger(world: &World, chunk: &mut Chunk) -> Result<()> {
    let pos = local(0, HEALTHY_Y + 1, 0)?;
    let trigger_type = TriggerType::from_raw(9);
    let mut te = TileEntity::instantiate(TileEntityType::Trigger, pos);
    let slot = te
        .powered_mut()
        .ok_or_else(|| RepairError::RepairFailed("demo block is not powered".to_owned()))?;
    *slot = PoweredCarrier::new_trigger(PowerItemType::Consumer, trigger_type);
    let id = world.power().add_item(
        chunk.world_pos(pos),
        PowerDevice::Trigger {
            class: TriggerClass::TimerRelay,
            trigger_type,
        },
    );
    slot.bind(id);
    chunk.add_tile_entity(te);
    Ok(())
}

/// Register lost entities at (5, 5), which is fully surrounded, and at
/// (0, 0), whose neighbourhood reaches outside the grid. Only the first
/// counts as a defect.
fn plant_lost_entities(
    world: &World,
    chunks: &mut BTreeMap<ChunkCoord, Chunk>,
    config: &WorldRepairDemoConfig,
) -> Result<usize> {
    let group = "ZombiesAll";
    let surrounded = chunk_entry(chunks, ChunkCoord::new(5, 5))?;
    let key = surrounded.key();
    let origin = surrounded.world_pos(local(8, CORRUPT_Y, 8)?);
    let ledger = surrounded
        .spawn_ledger_mut()
        .ok_or(RepairError::NotAreaMaster { x: 5, z: 5 })?;
    for i in 0..config.alive_entities {
        ledger.inc_entities_spawned(group);
        let offset = i32::try_from(i % 16).unwrap_or(0);
        world.spawn_entity(
            "zombieBoe",
            BlockPos::new(origin.x + offset, origin.y, origin.z),
            Some(SpawnerProvenance {
                source: SpawnerSource::Biome,
                chunk: key,
                group: group.to_owned(),
            }),
        );
    }
    for _ in 0..config.lost_entities {
        ledger.inc_entities_spawned(group);
    }

    let edge = chunk_entry(chunks, ChunkCoord::new(0, 0))?;
    if let Some(ledger) = edge.spawn_ledger_mut() {
        for _ in 0..config.lost_entities {
            ledger.inc_entities_spawned(group);
        }
    }

    Ok(usize::from(config.lost_entities > 0))
}

#[derive(Debug, PartialEq, Eq)]
struct WorldFingerprint {
    power_items: usize,
    tile_entities: usize,
    ledgers: Vec<(ChunkCoord, AreaSpawnLedger)>,
    bindings: Vec<Option<wm_types::PowerItemId>>,
}

impl WorldFingerprint {
    fn take(world: &World) -> Self {
        let mut tile_entities = 0;
        let mut ledgers = Vec::new();
        let mut bindings = Vec::new();
        for handle in world.chunks().chunk_array_copy() {
            let chunk = handle.lock();
            tile_entities += chunk.tile_entity_count();
            if let Some(ledger) = chunk.spawn_ledger() {
                ledgers.push((chunk.coord(), ledger.clone()));
            }
            bindings.extend(
                chunk
                    .tile_entities()
                    .map(|te| te.powered().and_then(PoweredCarrier::power_item)),
            );
        }
        Self {
            power_items: world.power().len(),
            tile_entities,
            ledgers,
            bindings,
        }
    }
}
