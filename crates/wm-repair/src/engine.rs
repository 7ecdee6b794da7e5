//! Repair orchestrator.
//!
//! A [`RepairRun`] walks every loaded chunk once. Area masters get their
//! spawn ledger checked first, then every powered tile entity in the chunk
//! is validated. Defects are counted and, unless the run only simulates,
//! repaired on the spot. Operator-facing lines go to the log and to an
//! optional [`ResultSink`]; the structured outcome is a [`RepairReport`].
//!
//! Failures are isolated: an error while handling one object or one chunk
//! is logged, counted in [`RepairReport::failures`] and the scan moves on.
//! Only an empty task set aborts a run, before any chunk is touched.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use wm_error::{RepairError, Result};
use wm_types::{LocalPos, WorldTime};
use wm_world::{Chunk, ChunkRef, World};

use crate::config::RepairEnvironment;
use crate::power::{PowerVerdict, check_powered};
use crate::rebuild::rebuild_tile_entity;
use crate::report::{FindingKind, FindingOutcome, RepairFinding, RepairReport};
use crate::spawn::{
    LedgerDefect, check_lost_entities, check_respawn_lock, clear_respawn_lock,
    forget_lost_entities,
};
use crate::task::{RepairTask, RepairTasks};

// ── Result sink ─────────────────────────────────────────────────────────────

/// Receiver for operator-facing progress lines.
pub trait ResultSink {
    fn output(&mut self, line: &str);
}

impl ResultSink for Vec<String> {
    fn output(&mut self, line: &str) {
        self.push(line.to_owned());
    }
}

// ── Run configuration and state ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairOptions {
    pub tasks: RepairTasks,
    /// Detect and report only; never mutate the world.
    pub simulate: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            tasks: RepairTasks::DEFAULT,
            simulate: false,
        }
    }
}

/// Lifecycle of one [`RepairRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Idle,
    Running,
    Done,
    /// The run was refused before scanning; see the returned error.
    Rejected,
}

/// One invocation of the repair engine.
///
/// A run executes at most once; calling [`RepairRun::execute`] again after
/// it finished or was rejected returns the same kind of answer without
/// scanning.
pub struct RepairRun<'a> {
    world: &'a World,
    env: &'a RepairEnvironment,
    options: RepairOptions,
    sink: Option<&'a mut dyn ResultSink>,
    state: EngineState,
    report: RepairReport,
}

impl<'a> RepairRun<'a> {
    pub fn new(world: &'a World, env: &'a RepairEnvironment, options: RepairOptions) -> Self {
        Self {
            world,
            env,
            options,
            sink: None,
            state: EngineState::Idle,
            report: RepairReport {
                tasks: options.tasks.letters(),
                simulate: options.simulate,
                ..RepairReport::default()
            },
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: &'a mut dyn ResultSink) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    #[must_use]
    pub fn options(&self) -> RepairOptions {
        self.options
    }

    /// Scan all loaded chunks and return the report.
    pub fn execute(&mut self) -> Result<RepairReport> {
        match self.state {
            EngineState::Idle => {}
            EngineState::Done => return Ok(self.report.clone()),
            EngineState::Rejected => return Err(RepairError::NoTasks),
            EngineState::Running => {
                return Err(RepairError::RepairFailed("repair run re-entered".to_owned()));
            }
        }

        if self.options.tasks.is_empty() {
            self.state = EngineState::Rejected;
            error!(target: "wm::repair::engine", "repair rejected: no repair tasks set");
            return Err(RepairError::NoTasks);
        }

        self.state = EngineState::Running;
        let started = Instant::now();
        let mode = if self.options.simulate {
            "Scan (without repair)"
        } else {
            "Repair"
        };
        self.log_and_output(&format!(
            "{mode} for server problem(s) {} started.",
            self.options.tasks.letters()
        ));

        if self.options.tasks.contains(RepairTask::CorruptPowerBlocks)
            || self.options.tasks.contains(RepairTask::LockedBiomeRespawn)
        {
            self.log_and_output("Scanning all loaded chunks ...");
            for chunk in self.world.chunks().chunk_array_copy() {
                self.repair_chunk(&chunk);
            }
        }

        self.report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let summary = self.report.summary_line();
        self.log_and_output(&summary);
        debug!(
            target: "wm::repair::engine",
            duration_ms = self.report.duration_ms,
            failures = self.report.failures,
            findings = self.report.findings.len(),
            "repair run finished"
        );

        self.state = EngineState::Done;
        Ok(self.report.clone())
    }

    // ── Output ──────────────────────────────────────────────────────────

    fn log_and_output(&mut self, line: &str) {
        info!(target: "wm::repair::engine", "{line}");
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.output(line);
        }
    }

    fn warning_and_output(&mut self, line: &str) {
        warn!(target: "wm::repair::engine", "{line}");
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.output(line);
        }
    }

    fn found_or_repaired(&self) -> &'static str {
        if self.options.simulate { "Found" } else { "Repaired" }
    }

    fn record_failure(&mut self, chunk: &Chunk, what: &str, err: &RepairError) {
        self.report.failures += 1;
        error!(
            target: "wm::repair::engine",
            chunk = %chunk.coord(),
            what,
            error = %err,
            class = ?err.class(),
            "repair step failed"
        );
    }

    // ── Chunks ──────────────────────────────────────────────────────────

    fn repair_chunk(&mut self, handle: &ChunkRef) {
        let mut chunk = handle.lock();
        let still_loaded = self
            .world
            .chunks()
            .get(chunk.key())
            .is_some_and(|current| Arc::ptr_eq(&current, handle));
        if !still_loaded {
            debug!(
                target: "wm::repair::engine",
                chunk = %chunk.coord(),
                "chunk unloaded or reloaded before scan; skipped"
            );
            return;
        }

        if self.options.tasks.contains(RepairTask::LockedBiomeRespawn) && chunk.is_area_master() {
            self.repair_chunk_respawn(&mut chunk);
        }

        if self.options.tasks.contains(RepairTask::CorruptPowerBlocks) {
            for pos in chunk.tile_entity_positions() {
                if let Err(err) = self.repair_tile_entity(&mut chunk, pos) {
                    let what = pos.to_string();
                    self.record_failure(&chunk, &what, &err);
                }
            }
        }

        self.report.chunks_scanned += 1;
    }

    // ── Spawn ledgers ───────────────────────────────────────────────────

    fn repair_chunk_respawn(&mut self, chunk: &mut Chunk) {
        let Some(groups) = chunk.spawn_ledger().map(|l| l.group_names()) else {
            return;
        };
        debug!(
            target: "wm::repair::spawn",
            area_master = %chunk.coord(),
            groups = groups.len(),
            "checking spawn ledger"
        );

        let now = self.world.world_time();
        let max_allowed = self.env.max_allowed_respawn_delay(self.world);
        for group in groups {
            self.repair_long_respawn_lock(chunk, &group, now, max_allowed);
            if let Err(err) = self.repair_lost_entities(chunk, &group) {
                self.record_failure(chunk, &group, &err);
            }
        }
    }

    fn repair_long_respawn_lock(
        &mut self,
        chunk: &mut Chunk,
        group: &str,
        now: WorldTime,
        max_allowed: WorldTime,
    ) {
        let Some(defect) = chunk
            .spawn_ledger()
            .and_then(|ledger| check_respawn_lock(ledger, group, now, max_allowed))
        else {
            return;
        };
        let LedgerDefect::LongRespawnLock { locked_until, .. } = &defect else {
            return;
        };
        let locked_until = *locked_until;
        self.report.problems_found += 1;

        let outcome = if self.options.simulate {
            FindingOutcome::Found
        } else {
            match clear_respawn_lock(chunk, group) {
                Ok(()) => FindingOutcome::Repaired,
                Err(err) => {
                    self.record_failure(chunk, group, &err);
                    FindingOutcome::Failed
                }
            }
        };

        let days = locked_until.days();
        let detail = format!(
            "locked until {locked_until}, {} ticks past the {max_allowed} limit",
            locked_until.0 - now.saturating_add(max_allowed.0).0
        );
        self.push_finding(FindingKind::LongRespawnLock, chunk, group, detail, outcome);
        let line = match outcome {
            FindingOutcome::Failed => format!(
                "Failed to reset respawn of {group} locked for {days} game days in area master {}.",
                chunk.coord()
            ),
            FindingOutcome::Found | FindingOutcome::Repaired => format!(
                "{} respawn of {group} locked for {days} game days in area master {}.",
                self.found_or_repaired(),
                chunk.coord()
            ),
        };
        self.warning_and_output(&line);
    }

    fn repair_lost_entities(&mut self, chunk: &mut Chunk, group: &str) -> Result<()> {
        let Some(LedgerDefect::LostEntities {
            registered,
            observed,
            ..
        }) = check_lost_entities(self.world, chunk, group)?
        else {
            return Ok(());
        };
        self.report.problems_found += 1;
        let lost = registered - observed;

        let outcome = if self.options.simulate {
            FindingOutcome::Found
        } else {
            match forget_lost_entities(chunk, group, observed) {
                Ok(()) => FindingOutcome::Repaired,
                Err(err) => {
                    self.record_failure(chunk, group, &err);
                    FindingOutcome::Failed
                }
            }
        };

        let detail = format!("{registered} registered, {observed} alive");
        self.push_finding(FindingKind::LostEntities, chunk, group, detail, outcome);
        let noun = if lost == 1 { "entity" } else { "entities" };
        let line = match outcome {
            FindingOutcome::Failed => format!(
                "Failed to reset respawn of {group} locked because of {lost} lost {noun} \
                 in area master {}.",
                chunk.coord()
            ),
            FindingOutcome::Found | FindingOutcome::Repaired => format!(
                "{} respawn of {group} locked because of {lost} lost {noun} in area master {}.",
                self.found_or_repaired(),
                chunk.coord()
            ),
        };
        self.warning_and_output(&line);
        Ok(())
    }

    // ── Power blocks ────────────────────────────────────────────────────

    fn repair_tile_entity(&mut self, chunk: &mut Chunk, pos: LocalPos) -> Result<()> {
        let Some(carrier) = chunk.tile_entity(pos).and_then(|te| te.powered()) else {
            return Ok(());
        };

        // The power lock is released before any rebuild takes it again.
        let defect = {
            let power = self.world.power();
            match carrier.power_item() {
                Some(id) if !power.contains(id) => Some((
                    FindingKind::DanglingPowerBinding,
                    format!("bound to unregistered {id}"),
                )),
                binding => match check_powered(carrier, binding.and_then(|id| power.get(id))) {
                    PowerVerdict::Corrupt(defect) => {
                        Some((FindingKind::CorruptPowerBlock, defect.to_string()))
                    }
                    PowerVerdict::Unbound
                    | PowerVerdict::Valid
                    | PowerVerdict::UnknownSubtype(_) => None,
                },
            }
        };
        let Some((kind, detail)) = defect else {
            return Ok(());
        };
        self.report.problems_found += 1;

        let world_pos = chunk.world_pos(pos);
        let outcome = if self.options.simulate {
            FindingOutcome::Found
        } else {
            match rebuild_tile_entity(self.world, chunk, pos)
                .and_then(|_| self.verify_rebuilt(chunk, pos))
            {
                Ok(()) => FindingOutcome::Repaired,
                Err(err) => {
                    self.record_failure(chunk, &world_pos.to_string(), &err);
                    FindingOutcome::Failed
                }
            }
        };

        let location = world_pos.to_string();
        let line = match outcome {
            FindingOutcome::Failed => format!(
                "Failed to repair corrupt power block at {location} in {}.",
                chunk.coord()
            ),
            FindingOutcome::Found | FindingOutcome::Repaired => format!(
                "{} corrupt power block at {location} in {}.",
                self.found_or_repaired(),
                chunk.coord()
            ),
        };
        debug!(
            target: "wm::repair::power",
            %kind,
            %location,
            detail = %detail,
            "power block defect"
        );
        self.push_finding(kind, chunk, &location, detail, outcome);
        self.log_and_output(&line);
        Ok(())
    }

    /// Re-validate a rebuilt entity so a repair that does not hold is not
    /// reported as one.
    fn verify_rebuilt(&self, chunk: &Chunk, pos: LocalPos) -> Result<()> {
        let Some(carrier) = chunk.tile_entity(pos).and_then(|te| te.powered()) else {
            return Ok(());
        };
        let power = self.world.power();
        match check_powered(carrier, carrier.power_item().and_then(|id| power.get(id))) {
            PowerVerdict::Corrupt(defect) => Err(RepairError::RepairFailed(format!(
                "rebuilt power block at {} is still corrupt: {defect}",
                chunk.world_pos(pos)
            ))),
            PowerVerdict::Unbound | PowerVerdict::Valid | PowerVerdict::UnknownSubtype(_) => {
                Ok(())
            }
        }
    }

    fn push_finding(
        &mut self,
        kind: FindingKind,
        chunk: &Chunk,
        location: &str,
        detail: String,
        outcome: FindingOutcome,
    ) {
        self.report.findings.push(RepairFinding {
            kind,
            chunk: chunk.coord(),
            location: location.to_owned(),
            detail,
            outcome,
        });
    }
}

/// Run the engine once over every loaded chunk of `world`.
pub fn run(
    world: &World,
    env: &RepairEnvironment,
    tasks: RepairTasks,
    simulate: bool,
    sink: Option<&mut dyn ResultSink>,
) -> Result<RepairReport> {
    let mut repair = RepairRun::new(world, env, RepairOptions { tasks, simulate });
    if let Some(sink) = sink {
        repair = repair.with_sink(sink);
    }
    repair.execute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wm_types::{ChunkCoord, PowerItemId, TICKS_PER_DAY};
    use wm_world::{
        AreaSpawnLedger, PowerDevice, PowerItemType, PoweredCarrier, TileEntity, TileEntityType,
        TriggerType,
    };

    fn local(x: u8, z: u8) -> LocalPos {
        LocalPos::new(x, 64, z).expect("valid local pos")
    }

    fn one_chunk_world() -> (World, ChunkRef) {
        let world = World::default();
        let handle = world.chunks().insert(Chunk::new(ChunkCoord::new(0, 0), 0));
        (world, handle)
    }

    fn add_bound(
        world: &World,
        chunk: &mut Chunk,
        pos: LocalPos,
        carrier: PoweredCarrier,
        device: PowerDevice,
    ) -> PowerItemId {
        let tile_type = if carrier.is_trigger() {
            TileEntityType::Trigger
        } else {
            TileEntityType::Powered
        };
        let mut te = TileEntity::instantiate(tile_type, pos);
        let slot = te.powered_mut().expect("powered");
        *slot = carrier;
        let id = world.power().add_item(chunk.world_pos(pos), device);
        slot.bind(id);
        chunk.add_tile_entity(te);
        id
    }

    #[test]
    fn empty_task_set_is_rejected() {
        let (world, _) = one_chunk_world();
        let env = RepairEnvironment::new();
        let mut lines: Vec<String> = Vec::new();
        let mut repair = RepairRun::new(
            &world,
            &env,
            RepairOptions {
                tasks: RepairTasks::NONE,
                simulate: false,
            },
        )
        .with_sink(&mut lines);
        assert_eq!(repair.state(), EngineState::Idle);
        let err = repair.execute().expect_err("no tasks");
        assert!(matches!(err, RepairError::NoTasks));
        assert_eq!(repair.state(), EngineState::Rejected);
        drop(repair);
        assert!(lines.is_empty());
    }

    #[test]
    fn clean_world_reports_chunks_only() {
        let (world, _) = one_chunk_world();
        world.chunks().insert(Chunk::new(ChunkCoord::new(1, 0), 0));
        let env = RepairEnvironment::new();
        let mut lines: Vec<String> = Vec::new();
        let report = run(&world, &env, RepairTasks::DEFAULT, false, Some(&mut lines)).expect("run");
        assert_eq!(report.counts(), (0, 2));
        assert!(report.is_clean());
        assert_eq!(
            lines,
            vec![
                "Repair for server problem(s) PR started.".to_owned(),
                "Scanning all loaded chunks ...".to_owned(),
                "Repaired 0 problems in 2 chunks. [details in server log]".to_owned(),
            ]
        );
    }

    #[test]
    fn corrupt_power_block_is_rebuilt() {
        let (world, handle) = one_chunk_world();
        let old_id = {
            let mut chunk = handle.lock();
            add_bound(
                &world,
                &mut chunk,
                local(1, 1),
                PoweredCarrier::new_trigger(PowerItemType::Consumer, TriggerType::Motion),
                PowerDevice::Generator,
            )
        };
        let env = RepairEnvironment::new();
        let mut lines: Vec<String> = Vec::new();
        let report = run(&world, &env, RepairTasks::DEFAULT, false, Some(&mut lines)).expect("run");
        assert_eq!(report.problems_found, 1);
        assert_eq!(report.count_outcome(FindingOutcome::Repaired), 1);
        let expected = "Repaired corrupt power block at (1, 64, 1) in chunk(0, 0).";
        assert!(lines.iter().any(|line| line == expected));

        assert!(!world.power().contains(old_id));
        let chunk = handle.lock();
        let carrier = chunk
            .tile_entity(local(1, 1))
            .and_then(TileEntity::powered)
            .expect("carrier");
        assert_eq!(carrier.trigger_type(), Some(TriggerType::Motion));
        assert_ne!(carrier.power_item(), Some(old_id));
    }

    #[test]
    fn dangling_binding_is_reported_separately() {
        let (world, handle) = one_chunk_world();
        {
            let mut chunk = handle.lock();
            let mut te = TileEntity::instantiate(TileEntityType::Powered, local(2, 2));
            te.powered_mut().expect("powered").bind(PowerItemId(4242));
            chunk.add_tile_entity(te);
        }
        let env = RepairEnvironment::new();
        let report = run(&world, &env, RepairTasks::DEFAULT, true, None).expect("run");
        assert_eq!(report.count_of(FindingKind::DanglingPowerBinding), 1);
        assert_eq!(report.findings[0].outcome, FindingOutcome::Found);
    }

    #[test]
    fn power_task_off_skips_tile_entities() {
        let (world, handle) = one_chunk_world();
        {
            let mut chunk = handle.lock();
            add_bound(
                &world,
                &mut chunk,
                local(1, 1),
                PoweredCarrier::new(PowerItemType::Consumer),
                PowerDevice::BatteryBank,
            );
        }
        let env = RepairEnvironment::new();
        let report = run(&world, &env, RepairTasks::parse("R"), false, None).expect("run");
        assert_eq!(report.counts(), (0, 1));
    }

    #[test]
    fn stale_lock_is_cleared_with_warning_line() {
        let (world, handle) = one_chunk_world();
        world.set_world_time(WorldTime(2 * TICKS_PER_DAY));
        {
            let mut chunk = handle.lock();
            let mut ledger = AreaSpawnLedger::new();
            ledger.set_respawn_locked("AnimalsAll", WorldTime(50 * TICKS_PER_DAY));
            chunk.set_spawn_ledger(ledger).expect("area master");
            chunk.set_modified(false);
        }
        let env = RepairEnvironment::new();
        let mut lines: Vec<String> = Vec::new();
        let report =
            run(&world, &env, RepairTasks::parse("R"), false, Some(&mut lines)).expect("run");
        assert_eq!(report.count_of(FindingKind::LongRespawnLock), 1);
        assert!(lines.contains(
            &"Repaired respawn of AnimalsAll locked for 50 game days in area master chunk(0, 0)."
                .to_owned()
        ));
        let chunk = handle.lock();
        assert!(chunk.is_modified());
        assert!(chunk.spawn_ledger().expect("ledger").is_empty());
    }

    #[test]
    fn custom_sink_receives_lines() {
        let (world, _) = one_chunk_world();
        let env = RepairEnvironment::new();
        struct Counter(usize);
        impl ResultSink for Counter {
            fn output(&mut self, _line: &str) {
                self.0 += 1;
            }
        }
        let mut sink = Counter(0);
        run(&world, &env, RepairTasks::DEFAULT, true, Some(&mut sink)).expect("run");
        assert_eq!(sink.0, 3);
    }

    #[test]
    fn finished_run_does_not_rescan() {
        let (world, _) = one_chunk_world();
        let env = RepairEnvironment::new();
        let mut repair = RepairRun::new(&world, &env, RepairOptions::default());
        let first = repair.execute().expect("first");
        assert_eq!(repair.state(), EngineState::Done);
        world.chunks().insert(Chunk::new(ChunkCoord::new(3, 3), 0));
        let second = repair.execute().expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn reloaded_chunk_handle_is_skipped() {
        let (world, stale) = one_chunk_world();
        let old_id = {
            let mut chunk = stale.lock();
            add_bound(
                &world,
                &mut chunk,
                local(1, 1),
                PoweredCarrier::new(PowerItemType::Consumer),
                PowerDevice::Generator,
            )
        };
        let key = stale.lock().key();
        world.chunks().unload(key);
        let fresh = world.chunks().insert(Chunk::new(ChunkCoord::new(0, 0), 0));
        assert!(!Arc::ptr_eq(&stale, &fresh));

        let env = RepairEnvironment::new();
        let mut repair = RepairRun::new(&world, &env, RepairOptions::default());
        repair.repair_chunk(&stale);
        assert_eq!(repair.report.chunks_scanned, 0);
        assert_eq!(repair.report.problems_found, 0);
        assert!(world.power().contains(old_id));

        repair.repair_chunk(&fresh);
        assert_eq!(repair.report.chunks_scanned, 1);
    }

    #[test]
    fn contradictory_trigger_settles_after_one_repair() {
        let (world, handle) = one_chunk_world();
        {
            let mut chunk = handle.lock();
            add_bound(
                &world,
                &mut chunk,
                local(4, 4),
                PoweredCarrier::new_trigger(PowerItemType::Timer, TriggerType::Switch),
                PowerDevice::Trigger {
                    class: wm_world::TriggerClass::TimerRelay,
                    trigger_type: TriggerType::Switch,
                },
            );
        }
        let env = RepairEnvironment::new();
        let first = run(&world, &env, RepairTasks::DEFAULT, false, None).expect("first");
        assert_eq!(first.problems_found, 1);
        assert_eq!(first.count_outcome(FindingOutcome::Repaired), 1);
        assert_eq!(first.failures, 0);

        let second = run(&world, &env, RepairTasks::DEFAULT, false, None).expect("second");
        assert_eq!(second.problems_found, 0);
    }
}
