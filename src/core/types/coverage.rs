use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Points at the most recent coverage snapshot published for a project.
///
/// The same document doubles as the project summary: every target of the
/// snapshot shares the report date recorded in `fuzzer_stats_dir`, which is
/// all that is needed to locate a target's own report.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CoverageReportPointer {
    /// Filled in by the client; not part of the published JSON.
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub report_date: Option<String>,
    /// e.g. `gs://oss-fuzz-coverage/curl/fuzzer_stats/20200226`
    #[serde(default)]
    pub fuzzer_stats_dir: Option<String>,
    #[serde(default)]
    pub html_report_url: Option<String>,
    #[serde(default)]
    pub report_summary_path: Option<String>,
}

pub type ProjectCoverageSummary = CoverageReportPointer;

impl CoverageReportPointer {
    /// Bucket-relative directory holding per-target reports, e.g.
    /// `oss-fuzz-coverage/curl/fuzzer_stats/20200226`.
    pub fn fuzzer_stats_path(&self) -> Option<String> {
        if let Some(dir) = self.fuzzer_stats_dir.as_deref() {
            let stripped = dir.strip_prefix("gs://")?;
            let segments: Vec<&str> = stripped.split('/').filter(|s| !s.is_empty()).collect();
            // bucket / project / fuzzer_stats / date
            if segments.len() < 4 {
                return None;
            }
            return Some(segments.join("/"));
        }

        let date = self.report_date.as_deref().filter(|d| !d.is_empty())?;
        if self.project.is_empty() {
            return None;
        }
        Some(format!("oss-fuzz-coverage/{}/fuzzer_stats/{}", self.project, date))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CoverageCounts {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub covered: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FileCoverage {
    pub filename: String,
    /// Keyed by metric: `lines`, `regions`, `functions`, ...
    #[serde(default)]
    pub summary: BTreeMap<String, CoverageCounts>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CoverageExport {
    #[serde(default)]
    pub files: Vec<FileCoverage>,
}

/// A single target's llvm-cov JSON export.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TargetCoverageReport {
    #[serde(default)]
    pub data: Vec<CoverageExport>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl TargetCoverageReport {
    pub fn files(&self) -> impl Iterator<Item = &FileCoverage> {
        self.data.iter().flat_map(|export| export.files.iter())
    }

    /// Every reported file under `source_root`, relative to that root.
    /// Prefix matching is done on whole path components.
    pub fn files_under(&self, source_root: &str) -> BTreeSet<String> {
        let root = normalize_path(Path::new(source_root));
        self.files()
            .filter_map(|file| {
                let path = normalize_path(Path::new(&file.filename));
                let relative = path.strip_prefix(&root).ok()?;
                let relative = relative.to_string_lossy().into_owned();
                if relative.is_empty() { None } else { Some(relative) }
            })
            .collect()
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
