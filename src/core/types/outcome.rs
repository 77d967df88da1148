use std::path::PathBuf;

use serde::Serialize;
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
pub enum Reproducibility {
    /// Reproduces on the current build but not on the baseline.
    New,
    /// Reproduces on both builds.
    Old,
    /// Does not reproduce on the current build.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrashReport {
    pub target: String,
    pub testcase: PathBuf,
    #[serde(skip)]
    pub output: String,
    pub summary_path: Option<PathBuf>,
    pub reproducibility: Reproducibility,
}

/// Result of a triage run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "crash")]
pub enum TriageOutcome {
    /// The run could not start: bad budget, missing or empty build.
    NoBuild,
    NoBugs,
    NewBug(CrashReport),
    KnownBug(CrashReport),
}

impl TriageOutcome {
    /// Legacy `(run_success, bug_found)` pair.
    pub fn as_flags(&self) -> (bool, bool) {
        match self {
            TriageOutcome::NoBuild => (false, false),
            TriageOutcome::NoBugs => (true, false),
            TriageOutcome::NewBug(_) | TriageOutcome::KnownBug(_) => (true, true),
        }
    }

    pub fn crash(&self) -> Option<&CrashReport> {
        match self {
            TriageOutcome::NewBug(report) | TriageOutcome::KnownBug(report) => Some(report),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            TriageOutcome::NoBuild => "NoBuild".to_string(),
            TriageOutcome::NoBugs => "NoBugs".to_string(),
            TriageOutcome::NewBug(report) => format!("NewBug in {}", report.target),
            TriageOutcome::KnownBug(report) => format!("KnownBug in {}", report.target),
        }
    }
}
