#![forbid(unsafe_code)]
//! worldmend public API facade.
//!
//! Re-exports the repair engine and the world model it operates on through
//! one stable interface. Hosts embedding the engine depend on this crate.

pub use wm_error::{ErrorClass, RepairError, Result};
pub use wm_repair::*;
pub use wm_types::*;
pub use wm_world::{
    AreaSpawnLedger, BiomeSpawnGroup, Chunk, ChunkCache, ChunkRef, LiveEntity, PowerDevice,
    PowerItem, PowerItemType, PowerManager, PoweredCarrier, SpawnSettings, TileEntity,
    TileEntityState, TileEntityType, TriggerClass, TriggerType, World,
};
