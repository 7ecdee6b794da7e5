#![forbid(unsafe_code)]
//! Online consistency repair for a live world graph.
//!
//! The engine scans every loaded chunk for two families of defect:
//! powered blocks whose power item disagrees with the block, and area-master
//! spawn ledgers whose locks or entity counts no longer match the world.
//! Each defect is reported and, unless the run only simulates, repaired in
//! place.
//!
//! Entry point: [`run`], or [`RepairRun`] when the caller wants to observe
//! the run's [`EngineState`].

pub mod auto;
pub mod availability;
pub mod config;
pub mod demo;
pub mod engine;
pub mod power;
pub mod rebuild;
pub mod report;
pub mod spawn;
pub mod task;

pub use auto::AutoRepair;
pub use config::{RepairEnvironment, RepairSettings, RespawnDelayCache};
pub use engine::{EngineState, RepairOptions, RepairRun, ResultSink, run};
pub use report::{FindingKind, FindingOutcome, RepairFinding, RepairReport};
pub use task::{RepairTask, RepairTasks};
