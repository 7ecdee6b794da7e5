#![forbid(unsafe_code)]
//! Error types for worldmend.
//!
//! # Error Taxonomy
//!
//! A repair run distinguishes three classes of failure:
//!
//! | Class | Variants | Effect on a scan |
//! |-------|----------|------------------|
//! | Configuration | `NoTasks`, `InvalidSettings` | Fatal. The run is rejected before any chunk is touched. |
//! | World state | `NotAreaMaster`, `ChunkNotLoaded`, `TileEntityMissing`, `PowerItemMissing` | Per object. Logged, recorded as a failed finding, scanning continues. |
//! | Repair | `RepairFailed` | Per object. Same handling as world-state errors. |
//!
//! Detected defects are *not* errors. A validator that finds a corrupt power
//! block or a stale spawn ledger reports a finding; errors are reserved for
//! the engine being unable to do what it was asked.
//!
//! ## Design Constraints
//!
//! - `wm-error` MUST NOT depend on `wm-types` or `wm-world`; coordinates and
//!   keys are carried as raw integers.
//! - All string payloads are owned so errors can cross thread boundaries.

use thiserror::Error;

/// Unified error type for all worldmend operations.
#[derive(Debug, Error)]
pub enum RepairError {
    /// A run was started with an empty task set.
    #[error("no repair tasks set")]
    NoTasks,

    /// Repair settings could not be parsed or failed validation.
    #[error("invalid repair settings: {0}")]
    InvalidSettings(String),

    /// A region query was anchored on a chunk that is not an area master.
    #[error("chunk ({x}, {z}) is not an area master chunk")]
    NotAreaMaster { x: i32, z: i32 },

    /// The chunk was unloaded between enumeration and use.
    #[error("chunk {key:#018x} is not loaded")]
    ChunkNotLoaded { key: u64 },

    /// No tile entity exists at the given position any more.
    #[error("no tile entity at {pos} in chunk {chunk:#018x}")]
    TileEntityMissing { chunk: u64, pos: String },

    /// A power item referenced by id is not registered with the power manager.
    #[error("power item {id} is not registered")]
    PowerItemMissing { id: u64 },

    /// A rebuild or ledger correction could not be completed.
    #[error("repair failed: {0}")]
    RepairFailed(String),
}

/// Coarse classification used by the orchestrator to decide whether a
/// failure aborts the run or only the current object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Configuration,
    WorldState,
    Repair,
}

impl RepairError {
    /// Classify this error.
    ///
    /// The mapping is exhaustive so a new variant does not compile until it
    /// is classified.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoTasks | Self::InvalidSettings(_) => ErrorClass::Configuration,
            Self::NotAreaMaster { .. }
            | Self::ChunkNotLoaded { .. }
            | Self::TileEntityMissing { .. }
            | Self::PowerItemMissing { .. } => ErrorClass::WorldState,
            Self::RepairFailed(_) => ErrorClass::Repair,
        }
    }

    /// True if this error must abort a whole run rather than one object.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Configuration
    }
}

/// Result alias using `RepairError`.
pub type Result<T> = std::result::Result<T, RepairError>;
