//! Interval-driven automatic repair.
//!
//! The host calls [`AutoRepair::poll`] from its own tick loop. The first
//! poll after enabling only arms the timer; each later poll runs the engine
//! once `interval_secs` have elapsed since the previous run.

use std::time::{Duration, Instant};
use tracing::{error, info};
use wm_world::World;

use crate::config::{RepairEnvironment, RepairSettings};
use crate::engine::{ResultSink, run};
use crate::report::RepairReport;

#[derive(Debug, Clone)]
pub struct AutoRepair {
    settings: RepairSettings,
    last_run: Option<Instant>,
    disabled: bool,
}

impl AutoRepair {
    /// Build a scheduler. Settings the engine refuses disable it on the
    /// first run attempt; use [`RepairSettings::validate`] to check earlier.
    #[must_use]
    pub fn new(settings: RepairSettings) -> Self {
        Self {
            settings,
            last_run: None,
            disabled: false,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &RepairSettings {
        &self.settings
    }

    /// True if polls may still run the engine.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.settings.auto_repair && !self.disabled
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.settings.interval_secs)
    }

    /// Time left until the next run, or `None` while the timer is unarmed
    /// or the scheduler is inactive.
    #[must_use]
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        if !self.is_active() {
            return None;
        }
        let last = self.last_run?;
        Some(self.interval().saturating_sub(now.saturating_duration_since(last)))
    }

    /// Run the engine if the interval has elapsed.
    ///
    /// Returns the report of a completed run. A run the engine rejects
    /// disables the scheduler until it is rebuilt from new settings.
    pub fn poll(
        &mut self,
        now: Instant,
        world: &World,
        env: &RepairEnvironment,
        sink: Option<&mut dyn ResultSink>,
    ) -> Option<RepairReport> {
        if !self.is_active() {
            return None;
        }
        let Some(last) = self.last_run else {
            self.last_run = Some(now);
            info!(
                target: "wm::repair::auto",
                interval_secs = self.settings.interval_secs,
                tasks = %self.settings.tasks,
                "automatic repair armed"
            );
            return None;
        };
        if now.saturating_duration_since(last) < self.interval() {
            return None;
        }

        self.last_run = Some(now);
        match run(
            world,
            env,
            self.settings.task_set(),
            self.settings.simulate,
            sink,
        ) {
            Ok(report) => {
                self.settings.run_counter += 1;
                info!(
                    target: "wm::repair::auto",
                    run = self.settings.run_counter,
                    problems = report.problems_found,
                    chunks = report.chunks_scanned,
                    "automatic repair finished"
                );
                Some(report)
            }
            Err(err) => {
                self.disabled = true;
                error!(
                    target: "wm::repair::auto",
                    error = %err,
                    "automatic repair disabled"
                );
                None
            }
        }
    }
}
