//! Findings collected by one repair run.
//!
//! A [`RepairReport`] is the structured counterpart of the operator
//! messages: one [`RepairFinding`] per defect, plus run-wide counters.
//! Reports serialize with serde so callers can keep them as an audit trail,
//! either whole or as one JSON object per finding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use wm_types::ChunkCoord;

// ── Finding taxonomy ────────────────────────────────────────────────────────

/// What kind of defect a finding describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Carrier and power item disagree about the device.
    CorruptPowerBlock,
    /// Carrier is bound to a power item that is no longer registered.
    DanglingPowerBinding,
    /// Respawn lock beyond the longest configured delay.
    LongRespawnLock,
    /// Registered spawn count above the number of live entities.
    LostEntities,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CorruptPowerBlock => write!(f, "corrupt_power_block"),
            Self::DanglingPowerBinding => write!(f, "dangling_power_binding"),
            Self::LongRespawnLock => write!(f, "long_respawn_lock"),
            Self::LostEntities => write!(f, "lost_entities"),
        }
    }
}

/// What the engine did about a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingOutcome {
    /// Detected only (simulate mode).
    Found,
    Repaired,
    /// The repair attempt returned an error; the object is in an unknown state.
    Failed,
}

impl fmt::Display for FindingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found => write!(f, "found"),
            Self::Repaired => write!(f, "repaired"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One defect seen during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairFinding {
    pub kind: FindingKind,
    /// Chunk holding the object or ledger.
    pub chunk: ChunkCoord,
    /// Block position or spawn group name.
    pub location: String,
    pub detail: String,
    pub outcome: FindingOutcome,
}

impl fmt::Display for RepairFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] {}: {}",
            self.chunk, self.location, self.outcome, self.kind, self.detail
        )
    }
}

// ── Report ──────────────────────────────────────────────────────────────────

/// Result of one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Letter codes of the tasks that ran.
    pub tasks: String,
    pub simulate: bool,
    pub problems_found: usize,
    pub chunks_scanned: usize,
    /// Objects whose check or repair returned an error.
    pub failures: usize,
    pub findings: Vec<RepairFinding>,
    pub duration_ms: u64,
}

impl RepairReport {
    /// `(problems_found, chunks_scanned)`.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        (self.problems_found, self.chunks_scanned)
    }

    /// True if no defect was found and nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.problems_found == 0 && self.failures == 0
    }

    #[must_use]
    pub fn count_of(&self, kind: FindingKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    #[must_use]
    pub fn count_outcome(&self, outcome: FindingOutcome) -> usize {
        self.findings.iter().filter(|f| f.outcome == outcome).count()
    }

    /// The closing operator line, e.g.
    /// `"Repaired 2 problems in 9 chunks. [details in server log]"`.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!("{self}. [details in server log]")
    }

    /// Write every finding as one JSON object per line.
    pub fn write_findings_jsonl<W: Write>(&self, mut out: W) -> io::Result<()> {
        for finding in &self.findings {
            let line = serde_json::to_string(finding).map_err(io::Error::other)?;
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
        }
        out.flush()
    }
}

fn plural(n: usize, one: &'static str, many: &'static str) -> &'static str {
    if n == 1 { one } else { many }
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} in {} {}",
            if self.simulate { "Identified" } else { "Repaired" },
            self.problems_found,
            plural(self.problems_found, "problem", "problems"),
            self.chunks_scanned,
            plural(self.chunks_scanned, "chunk", "chunks"),
        )
    }
}
