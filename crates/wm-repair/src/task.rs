//! Repair task registry.
//!
//! Each task has a one-letter code used on the command line and in saved
//! settings. Task sets are bitmasks over a fixed table; iteration follows
//! table order, which is also the order letter codes are printed in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use tracing::warn;

/// A kind of problem the engine can scan for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairTask {
    /// Powered blocks whose power item disagrees with the block.
    CorruptPowerBlocks,
    /// Area-master spawn ledgers with stale locks or lost entities.
    LockedBiomeRespawn,
}

struct TaskInfo {
    task: RepairTask,
    bit: u8,
    letter: char,
    description: &'static str,
}

const TASK_TABLE: [TaskInfo; 2] = [
    TaskInfo {
        task: RepairTask::CorruptPowerBlocks,
        bit: 1 << 0,
        letter: 'P',
        description: "Fix corrupt power blocks whose power item does not match the block, \
                      which breaks saving and syncing of triggers.",
    },
    TaskInfo {
        task: RepairTask::LockedBiomeRespawn,
        bit: 1 << 1,
        letter: 'R',
        description: "Reset locked respawn of biome zombies and animals, especially after \
                      changing the world time or regenerating areas. (EXPERIMENTAL)",
    },
];

const ALL_BITS: u8 = {
    let mut bits = 0;
    let mut i = 0;
    while i < TASK_TABLE.len() {
        bits |= TASK_TABLE[i].bit;
        i += 1;
    }
    bits
};

impl RepairTask {
    /// Every task, in table order.
    pub const ALL: [Self; 2] = [Self::CorruptPowerBlocks, Self::LockedBiomeRespawn];

    fn info(self) -> &'static TaskInfo {
        let index = match self {
            Self::CorruptPowerBlocks => 0,
            Self::LockedBiomeRespawn => 1,
        };
        &TASK_TABLE[index]
    }

    #[must_use]
    pub fn letter(self) -> char {
        self.info().letter
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        self.info().description
    }

    /// Look up a task by its letter code, ignoring case.
    #[must_use]
    pub fn from_letter(letter: char) -> Option<Self> {
        let upper = letter.to_ascii_uppercase();
        TASK_TABLE
            .iter()
            .find(|info| info.letter == upper)
            .map(|info| info.task)
    }
}

impl fmt::Display for RepairTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A combination of repair tasks.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepairTasks(u8);

impl RepairTasks {
    /// No task selected. A run with this set is rejected.
    pub const NONE: Self = Self(0);
    /// Every known task.
    pub const DEFAULT: Self = Self(ALL_BITS);

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 & ALL_BITS == 0
    }

    #[must_use]
    pub fn contains(self, task: RepairTask) -> bool {
        self.0 & task.info().bit != 0
    }

    #[must_use]
    pub fn with(self, task: RepairTask) -> Self {
        Self(self.0 | task.info().bit)
    }

    pub fn insert(&mut self, task: RepairTask) {
        *self = self.with(task);
    }

    /// Selected tasks in table order.
    pub fn iter(self) -> impl Iterator<Item = RepairTask> {
        TASK_TABLE
            .iter()
            .filter(move |info| self.0 & info.bit != 0)
            .map(|info| info.task)
    }

    /// Letter codes of the selected tasks, e.g. `"PR"` for [`Self::DEFAULT`].
    #[must_use]
    pub fn letters(self) -> String {
        self.iter().map(RepairTask::letter).collect()
    }

    /// Parse a string of letter codes.
    ///
    /// Unknown letters are skipped with a warning; whitespace is ignored.
    /// The result may be empty, which callers must treat as a configuration
    /// error when starting a run.
    #[must_use]
    pub fn parse(codes: &str) -> Self {
        let mut tasks = Self::NONE;
        for letter in codes.chars().filter(|c| !c.is_whitespace()) {
            match RepairTask::from_letter(letter) {
                Some(task) => tasks.insert(task),
                None => warn!(
                    target: "wm::repair::task",
                    letter = %letter,
                    "ignoring unknown repair task code"
                ),
            }
        }
        tasks
    }

    /// One `"<letter>: <description>"` line per known task.
    #[must_use]
    pub fn help_lines() -> Vec<String> {
        TASK_TABLE
            .iter()
            .map(|info| format!("{}: {}", info.letter, info.description))
            .collect()
    }
}

impl From<RepairTask> for RepairTasks {
    fn from(task: RepairTask) -> Self {
        Self::NONE.with(task)
    }
}

impl FromIterator<RepairTask> for RepairTasks {
    fn from_iter<I: IntoIterator<Item = RepairTask>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

impl BitOr for RepairTasks {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOr<RepairTask> for RepairTasks {
    type Output = Self;

    fn bitor(self, rhs: RepairTask) -> Self {
        self.with(rhs)
    }
}

impl fmt::Display for RepairTasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.letters())
    }
}

impl fmt::Debug for RepairTasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepairTasks({})", self.letters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_selects_every_task() {
        for task in RepairTask::ALL {
            assert!(RepairTasks::DEFAULT.contains(task));
            assert!(!RepairTasks::NONE.contains(task));
        }
        assert_eq!(RepairTasks::DEFAULT.letters(), "PR");
        assert!(RepairTasks::NONE.is_empty());
    }

    #[test]
    fn parse_is_case_insensitive_and_skips_unknown() {
        assert_eq!(
            RepairTasks::parse("r"),
            RepairTasks::from(RepairTask::LockedBiomeRespawn)
        );
        assert_eq!(RepairTasks::parse("p x R"), RepairTasks::DEFAULT);
        assert_eq!(RepairTasks::parse("DLM"), RepairTasks::NONE);
        assert_eq!(RepairTasks::parse(""), RepairTasks::NONE);
    }

    #[test]
    fn letters_follow_table_order_not_input_order() {
        assert_eq!(RepairTasks::parse("RP").letters(), "PR");
        assert_eq!(RepairTasks::parse("RRR").letters(), "R");
    }

    #[test]
    fn combining_sets() {
        let tasks =
            RepairTasks::from(RepairTask::CorruptPowerBlocks) | RepairTask::LockedBiomeRespawn;
        assert_eq!(tasks, RepairTasks::DEFAULT);
        let collected: RepairTasks = RepairTask::ALL.into_iter().collect();
        assert_eq!(collected, RepairTasks::DEFAULT);
        assert_eq!(format!("{tasks:?}"), "RepairTasks(PR)");
    }

    #[test]
    fn help_lines_cover_table() {
        let lines = RepairTasks::help_lines();
        assert_eq!(lines.len(), RepairTask::ALL.len());
        assert!(lines[0].starts_with("P: "));
        assert!(lines[1].starts_with("R: "));
        assert!(lines.iter().all(|l| l.len() <= 140));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn parse_letters_round_trip(codes in "[prPRa-z ]{0,12}") {
            let tasks = RepairTasks::parse(&codes);
            prop_assert_eq!(RepairTasks::parse(&tasks.letters()), tasks);
            for task in tasks.iter() {
                let upper = codes.to_ascii_uppercase();
                prop_assert!(upper.contains(task.letter()));
            }
        }
    }
}
