//! Runs fuzz targets under a shared time budget and classifies the first
//! reproducible crash as new or pre-existing by replaying it on a baseline
//! build.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::core::baseline::BaselineFetcher;
use crate::core::fuzz_target::{FuzzEngine, FuzzTarget, list_fuzz_targets};
use crate::core::parser::parse_fuzzer_output;
use crate::types::config::{config, resolve_against};
use crate::types::{CrashReport, Reproducibility, TriageOutcome};

#[derive(Debug, Clone)]
pub struct TriageOptions {
    /// Where same-named baseline binaries live. Relative to the build directory unless absolute.
    pub baseline_dir: PathBuf,
    /// Where crash inputs and the bug summary go. Relative to the build directory unless absolute.
    pub artifacts_dir: PathBuf,
}

impl TriageOptions {
    pub fn from_config() -> Self {
        let run = config().run();
        Self {
            baseline_dir: PathBuf::from(run.baseline_dir()),
            artifacts_dir: PathBuf::from(run.artifacts_dir()),
        }
    }
}

impl Default for TriageOptions {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("oss_fuzz_latest"),
            artifacts_dir: PathBuf::from("artifacts"),
        }
    }
}

pub struct CrashTriageRunner<'a> {
    engine: &'a dyn FuzzEngine,
    options: TriageOptions,
    running: Arc<AtomicBool>,
    baseline: Option<Arc<BaselineFetcher>>,
}

impl<'a> CrashTriageRunner<'a> {
    pub fn new(engine: &'a dyn FuzzEngine, options: TriageOptions, running: Arc<AtomicBool>) -> Self {
        Self {
            engine,
            options,
            running,
            baseline: None,
        }
    }

    /// Download the latest published build into the baseline directory when it is missing.
    pub fn with_baseline_fetcher(mut self, fetcher: Arc<BaselineFetcher>) -> Self {
        self.baseline = Some(fetcher);
        self
    }

    pub async fn run_fuzzers(&self, fuzz_seconds: i64, build_dir: &Path, project: &str) -> TriageOutcome {
        if fuzz_seconds <= 0 {
            error!("Fuzz time budget must be positive, got {fuzz_seconds}s");
            return TriageOutcome::NoBuild;
        }
        // Targets run from the artifacts directory, so every path handed to the engine is absolute
        let build_dir = match std::path::absolute(build_dir) {
            Ok(dir) => dir,
            Err(e) => {
                error!("Cannot resolve build directory {}: {e}", build_dir.display());
                return TriageOutcome::NoBuild;
            }
        };
        let build_dir = build_dir.as_path();
        let targets = match list_fuzz_targets(build_dir) {
            Ok(targets) if !targets.is_empty() => targets,
            Ok(_) => {
                error!("No fuzz targets found in {}", build_dir.display());
                return TriageOutcome::NoBuild;
            }
            Err(e) => {
                error!("Cannot read build directory {}: {e}", build_dir.display());
                return TriageOutcome::NoBuild;
            }
        };

        let baseline_dir = resolve_against(build_dir, &self.options.baseline_dir.to_string_lossy());
        let artifacts_dir = resolve_against(build_dir, &self.options.artifacts_dir.to_string_lossy());
        let budget = Duration::from_secs(fuzz_seconds as u64);
        let started = Instant::now();

        info!(
            "Running {} fuzz target(s) for project '{project}' within {fuzz_seconds}s",
            targets.len()
        );

        for (index, target) in targets.iter().enumerate() {
            if !self.running.load(Ordering::SeqCst) {
                warn!("Fuzzing interrupted, stopping...");
                break;
            }

            let remaining = budget.saturating_sub(started.elapsed());
            let share = remaining / (targets.len() - index) as u32;
            if share.is_zero() {
                warn!("Fuzz time budget exhausted before {}", target.name);
                break;
            }

            let run = match self.engine.fuzz(target, share, &artifacts_dir).await {
                Ok(run) => run,
                Err(e) => {
                    error!("Failed to fuzz {}: {e}", target.name);
                    continue;
                }
            };
            let Some(testcase) = run.testcase else {
                info!("No crash found in {}", target.name);
                continue;
            };

            let reproducibility = self.classify(target, &testcase, &baseline_dir, project).await;
            if reproducibility == Reproducibility::None {
                warn!(
                    "Crash in {} does not reproduce on the current build, ignoring",
                    target.name
                );
                continue;
            }

            let summary_path = if reproducibility == Reproducibility::New {
                match parse_fuzzer_output(&run.output, &artifacts_dir) {
                    Ok(path) => path,
                    Err(e) => {
                        error!("Failed to write crash summary: {e}");
                        None
                    }
                }
            } else {
                None
            };

            let report = CrashReport {
                target: target.name.clone(),
                testcase,
                output: run.output,
                summary_path,
                reproducibility,
            };
            return match reproducibility {
                Reproducibility::New => {
                    error!("New crash found in {}", report.target);
                    TriageOutcome::NewBug(report)
                }
                _ => {
                    warn!("Crash in {} also reproduces on the baseline build", report.target);
                    TriageOutcome::KnownBug(report)
                }
            };
        }

        TriageOutcome::NoBugs
    }

    /// Replays on the current build first; the baseline is only consulted
    /// once the current build reproduces.
    async fn classify(
        &self,
        target: &FuzzTarget,
        testcase: &Path,
        baseline_dir: &Path,
        project: &str,
    ) -> Reproducibility {
        match self.engine.is_reproducible(&target.path, testcase).await {
            Ok(true) => {}
            Ok(false) => return Reproducibility::None,
            Err(e) => {
                error!("Failed to reproduce crash in {}: {e}", target.name);
                return Reproducibility::None;
            }
        }

        let baseline = baseline_dir.join(&target.name);
        if !baseline.is_file() {
            self.fetch_baseline(project, baseline_dir).await;
        }
        if !baseline.is_file() {
            info!(
                "No baseline binary for {} in {}, treating crash as new",
                target.name,
                baseline_dir.display()
            );
            return Reproducibility::New;
        }

        match self.engine.is_reproducible(&baseline, testcase).await {
            Ok(true) => Reproducibility::Old,
            Ok(false) => Reproducibility::New,
            Err(e) => {
                error!("Failed to replay crash on baseline {}: {e}", baseline.display());
                Reproducibility::New
            }
        }
    }

    async fn fetch_baseline(&self, project: &str, baseline_dir: &Path) {
        let Some(fetcher) = &self.baseline else {
            return;
        };
        let fetcher = Arc::clone(fetcher);
        let project = project.to_string();
        let dest = baseline_dir.to_path_buf();
        // Downloads block; keep them off the async workers
        let fetched =
            tokio::task::spawn_blocking(move || fetcher.ensure_baseline(&project, &dest)).await;
        if let Err(e) = fetched {
            error!("Baseline download task failed: {e}");
        }
    }
}
