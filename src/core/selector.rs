//! Coverage-based pruning of fuzz targets.
//!
//! Policy: a target is only pruned when coverage data exists for it and
//! shows no overlap with the change set. Unknown coverage keeps the target.
//! Nothing is pruned unless at least one target is confirmed affected, so a
//! coverage outage or a change touching no known file runs everything.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, error, info, warn};
use serde::Serialize;
use strum::Display;

use crate::core::coverage::CoverageClient;
use crate::core::fuzz_target::list_fuzz_targets;
use crate::types::{AppResult, ChangeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum KeepReason {
    /// Coverage overlaps the change set.
    Affected,
    /// No coverage data; kept to stay on the safe side.
    CoverageUnavailable,
    /// No overlap, but nothing was confirmed affected either.
    NoConfirmedTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Keep(KeepReason),
    Prune,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Selection {
    pub kept: BTreeMap<String, KeepReason>,
    pub pruned: Vec<String>,
    /// Pruned targets whose binary could not be removed and is still on disk.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removal_failed: Vec<String>,
}

impl Selection {
    pub fn is_kept(&self, target: &str) -> bool {
        self.kept.contains_key(target)
    }
}

pub struct AffectedTargetSelector<'a> {
    client: &'a CoverageClient,
}

impl<'a> AffectedTargetSelector<'a> {
    pub fn new(client: &'a CoverageClient) -> Self {
        Self { client }
    }

    /// Decide which of `targets` may be pruned. Touches nothing on disk.
    pub fn select(
        &self,
        project: &str,
        targets: &[String],
        changes: &ChangeSet,
        source_root: &str,
    ) -> Selection {
        let Some(summary) = self.client.get_latest_cov_report_info(project) else {
            warn!("No coverage information for '{project}', keeping all fuzz targets");
            return Selection {
                kept: targets
                    .iter()
                    .map(|t| (t.clone(), KeepReason::CoverageUnavailable))
                    .collect(),
                ..Default::default()
            };
        };

        let marks: Vec<(&String, Mark)> = targets
            .iter()
            .map(|target| {
                let mark = match self
                    .client
                    .get_files_covered_by_target(&summary, target, source_root)
                {
                    None => Mark::Keep(KeepReason::CoverageUnavailable),
                    Some(covered) if changes.intersects(&covered) => Mark::Keep(KeepReason::Affected),
                    Some(_) => Mark::Prune,
                };
                debug!("{target}: {mark:?}");
                (target, mark)
            })
            .collect();

        let any_affected = marks
            .iter()
            .any(|(_, mark)| *mark == Mark::Keep(KeepReason::Affected));

        let mut selection = Selection::default();
        for (target, mark) in marks {
            match mark {
                Mark::Keep(reason) => {
                    selection.kept.insert(target.clone(), reason);
                }
                Mark::Prune if any_affected => selection.pruned.push(target.clone()),
                Mark::Prune => {
                    selection
                        .kept
                        .insert(target.clone(), KeepReason::NoConfirmedTarget);
                }
            }
        }
        if !any_affected {
            info!("No fuzz target confirmed affected by the change, keeping all");
        }
        selection
    }
}

/// Remove fuzz targets in `build_dir` that the change cannot affect.
///
/// Selection finishes before anything is deleted; the returned selection is
/// the record of what was kept, pruned, and left behind by failed removals.
pub fn keep_affected_fuzzers(
    client: &CoverageClient,
    project: &str,
    build_dir: &Path,
    changes: &ChangeSet,
    source_root: &str,
) -> AppResult<Selection> {
    let targets = list_fuzz_targets(build_dir)?;
    let names: Vec<String> = targets.iter().map(|t| t.name.clone()).collect();
    let mut selection = AffectedTargetSelector::new(client).select(project, &names, changes, source_root);

    for target in targets.iter().filter(|t| selection.pruned.contains(&t.name)) {
        info!("Removing unaffected fuzz target {}", target.name);
        if let Err(e) = fs::remove_file(&target.path) {
            error!("Failed to remove {}: {e}", target.path.display());
            selection.removal_failed.push(target.name.clone());
        }
    }
    Ok(selection)
}
