#![cfg(unix)]

mod common;

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cifuzz::types::{AppError, AppResult, Reproducibility, TriageOutcome};
use cifuzz::{
    BaselineFetcher, CrashTriageRunner, FuzzEngine, FuzzRun, FuzzTarget, LibFuzzerEngine,
    TriageOptions,
};
use common::{
    FakeArchiveTransport, STORAGE_URL, build_archive_url, dir_entries, fixture_path,
    latest_build_version_url, write_fuzzer, write_script, zip_archive,
};
use pretty_assertions::assert_eq;

const PROJECT: &str = "example";
const CRASH_FUZZER: &str = "example_crash_fuzzer";
const NOCRASH_FUZZER: &str = "example_nocrash_fuzzer";
const BUILD_VERSION: &str = "example-address-202003010000.zip";

/// Writes a testcase and fails like libFuzzer when fuzzing; fails again when replaying it.
const CRASHING_TARGET: &str = "#!/bin/sh
# LLVMFuzzerTestOneInput
case \"$1\" in -max_total_time=*) echo boom > crash-1;; esac
echo '==1==ERROR: AddressSanitizer: heap-buffer-overflow on address 0x602000000011' >&2
echo 'SUMMARY: AddressSanitizer: heap-buffer-overflow (/out/example_crash_fuzzer+0x1)' >&2
echo 'Test unit written to ./crash-1' >&2
exit 1
";

/// Crashes the targets it is told to and answers reproducibility checks from a script.
#[derive(Default)]
struct FakeEngine {
    crashing: HashSet<String>,
    reproducible: Mutex<VecDeque<bool>>,
    fuzzed: Mutex<Vec<(String, Duration)>>,
    replayed: Mutex<Vec<PathBuf>>,
    failing: HashSet<String>,
}

impl FakeEngine {
    fn crashing(targets: &[&str], reproducible: &[bool]) -> Self {
        Self {
            crashing: targets.iter().map(|t| t.to_string()).collect(),
            reproducible: Mutex::new(reproducible.iter().copied().collect()),
            ..Default::default()
        }
    }

    fn fuzzed_names(&self) -> Vec<String> {
        self.fuzzed.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl FuzzEngine for FakeEngine {
    async fn fuzz(&self, target: &FuzzTarget, budget: Duration, artifacts_dir: &Path) -> AppResult<FuzzRun> {
        self.fuzzed.lock().unwrap().push((target.name.clone(), budget));
        if self.failing.contains(&target.name) {
            return Err(AppError::Custom("spawn failed".to_string()));
        }
        if !self.crashing.contains(&target.name) {
            return Ok(FuzzRun {
                output: "Done 1000 runs in 1 second(s)\n".to_string(),
                testcase: None,
            });
        }
        fs::create_dir_all(artifacts_dir)?;
        let testcase = artifacts_dir.join(format!("crash-{}", target.name));
        fs::write(&testcase, b"boom")?;
        Ok(FuzzRun {
            output: fs::read_to_string(fixture_path("example_crash_fuzzer_output.txt"))?,
            testcase: Some(testcase),
        })
    }

    async fn is_reproducible(&self, binary: &Path, _testcase: &Path) -> AppResult<bool> {
        self.replayed.lock().unwrap().push(binary.to_path_buf());
        Ok(self.reproducible.lock().unwrap().pop_front().unwrap_or(false))
    }
}

fn running() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(true))
}

/// Build dir holding both fuzzers plus a baseline copy of each.
fn build_dir_with_baseline() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_fuzzer(dir.path(), CRASH_FUZZER);
    write_fuzzer(dir.path(), NOCRASH_FUZZER);
    let baseline = dir.path().join("oss_fuzz_latest");
    write_fuzzer(&baseline, CRASH_FUZZER);
    write_fuzzer(&baseline, NOCRASH_FUZZER);
    dir
}

#[tokio::test]
async fn test_new_bug_found() {
    let dir = build_dir_with_baseline();
    let engine = FakeEngine::crashing(&[CRASH_FUZZER], &[true, false]);
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running());

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert_eq!(outcome.as_flags(), (true, true));
    let TriageOutcome::NewBug(report) = &outcome else {
        panic!("expected a new bug, got {}", outcome.display());
    };
    assert_eq!(report.target, CRASH_FUZZER);
    assert_eq!(report.reproducibility, Reproducibility::New);
    assert_eq!(
        *engine.replayed.lock().unwrap(),
        vec![
            dir.path().join(CRASH_FUZZER),
            dir.path().join("oss_fuzz_latest").join(CRASH_FUZZER)
        ]
    );

    // The summary artifact is written next to the crash input
    let summary = report.summary_path.as_ref().expect("summary written");
    assert_eq!(
        fs::read_to_string(summary).unwrap(),
        fs::read_to_string(fixture_path("bug_summary_example.txt")).unwrap()
    );
    assert!(dir_entries(&dir.path().join("artifacts")).contains(&"bug_summary.txt".to_string()));
}

#[tokio::test]
async fn test_old_bug_found() {
    let dir = build_dir_with_baseline();
    let engine = FakeEngine::crashing(&[CRASH_FUZZER], &[true, true]);
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running());

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert_eq!(outcome.as_flags(), (true, true));
    let TriageOutcome::KnownBug(report) = &outcome else {
        panic!("expected a known bug, got {}", outcome.display());
    };
    assert_eq!(report.reproducibility, Reproducibility::Old);
    assert_eq!(report.summary_path, None);
}

#[tokio::test]
async fn test_missing_baseline_is_new() {
    let dir = tempfile::tempdir().unwrap();
    write_fuzzer(dir.path(), CRASH_FUZZER);
    let engine = FakeEngine::crashing(&[CRASH_FUZZER], &[true, true]);
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running());

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert!(matches!(outcome, TriageOutcome::NewBug(_)));
    // Only the current build was replayed
    assert_eq!(engine.replayed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreproducible_crash_skips_baseline() {
    let dir = build_dir_with_baseline();
    let engine = FakeEngine::crashing(&[CRASH_FUZZER], &[false]);
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running());

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert_eq!(outcome, TriageOutcome::NoBugs);
    assert_eq!(*engine.replayed.lock().unwrap(), vec![dir.path().join(CRASH_FUZZER)]);
    // The remaining target still ran
    assert_eq!(engine.fuzzed_names(), vec![CRASH_FUZZER, NOCRASH_FUZZER]);
}

#[tokio::test]
async fn test_stops_at_first_classified_crash() {
    let dir = build_dir_with_baseline();
    let engine = FakeEngine::crashing(&[CRASH_FUZZER, NOCRASH_FUZZER], &[true, false, true, false]);
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running());

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert!(matches!(outcome, TriageOutcome::NewBug(_)));
    assert_eq!(engine.fuzzed_names(), vec![CRASH_FUZZER]);
}

#[tokio::test]
async fn test_clean_run_splits_budget() {
    let dir = build_dir_with_baseline();
    let engine = FakeEngine::default();
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running());

    let outcome = runner.run_fuzzers(100, dir.path(), PROJECT).await;

    assert_eq!(outcome, TriageOutcome::NoBugs);
    assert_eq!(outcome.as_flags(), (true, false));
    let fuzzed = engine.fuzzed.lock().unwrap();
    assert_eq!(fuzzed.len(), 2);
    // First target gets half; the fake returns at once so the second inherits the rest
    assert!(fuzzed[0].1 <= Duration::from_secs(50));
    assert!(fuzzed[0].1 > Duration::from_secs(49));
    assert!(fuzzed[1].1 > Duration::from_secs(99));
}

#[tokio::test]
async fn test_engine_error_moves_to_next_target() {
    let dir = build_dir_with_baseline();
    let engine = FakeEngine {
        failing: [CRASH_FUZZER.to_string()].into(),
        ..Default::default()
    };
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running());

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert_eq!(outcome, TriageOutcome::NoBugs);
    assert_eq!(engine.fuzzed_names(), vec![CRASH_FUZZER, NOCRASH_FUZZER]);
}

#[tokio::test]
async fn test_invalid_build() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::default();
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running());

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert_eq!(outcome, TriageOutcome::NoBuild);
    assert_eq!(outcome.as_flags(), (false, false));
}

#[tokio::test]
async fn test_invalid_fuzz_seconds() {
    let dir = build_dir_with_baseline();
    let engine = FakeEngine::default();
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running());

    assert_eq!(runner.run_fuzzers(0, dir.path(), PROJECT).await.as_flags(), (false, false));
    assert_eq!(runner.run_fuzzers(-3, dir.path(), PROJECT).await.as_flags(), (false, false));
    assert!(engine.fuzzed_names().is_empty());
}

#[tokio::test]
async fn test_invalid_out_dir() {
    let engine = FakeEngine::default();
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running());

    let outcome = runner.run_fuzzers(100, Path::new("not/a/valid/path"), PROJECT).await;

    assert_eq!(outcome.as_flags(), (false, false));
}

#[tokio::test]
async fn test_interrupted_run_starts_nothing() {
    let dir = build_dir_with_baseline();
    let engine = FakeEngine::default();
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), Arc::new(AtomicBool::new(false)));

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert_eq!(outcome, TriageOutcome::NoBugs);
    assert!(engine.fuzzed_names().is_empty());
}

fn baseline_fetcher(transport: FakeArchiveTransport) -> Arc<BaselineFetcher> {
    Arc::new(BaselineFetcher::new(Box::new(transport), STORAGE_URL, "address"))
}

fn published_build() -> FakeArchiveTransport {
    FakeArchiveTransport::new()
        .with(&latest_build_version_url(PROJECT), format!("{BUILD_VERSION}\n").into_bytes())
        .with(
            &build_archive_url(PROJECT, BUILD_VERSION),
            zip_archive(&[
                (CRASH_FUZZER, "#!/bin/sh\n# LLVMFuzzerTestOneInput\nexit 0\n"),
                (NOCRASH_FUZZER, "#!/bin/sh\n# LLVMFuzzerTestOneInput\nexit 0\n"),
            ]),
        )
}

#[tokio::test]
async fn test_relative_build_dir_with_libfuzzer_engine() {
    let dir = tempfile::Builder::new()
        .prefix("relative-build-")
        .tempdir_in(".")
        .unwrap();
    let build_dir = PathBuf::from(dir.path().file_name().unwrap());
    assert!(build_dir.is_relative());
    write_script(&build_dir, CRASH_FUZZER, CRASHING_TARGET);
    let engine = LibFuzzerEngine::new(1);
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running());

    let outcome = runner.run_fuzzers(10, &build_dir, PROJECT).await;

    let TriageOutcome::NewBug(report) = &outcome else {
        panic!("expected a new bug, got {}", outcome.display());
    };
    assert_eq!(report.target, CRASH_FUZZER);
    assert!(report.testcase.is_absolute());
    assert!(report.testcase.is_file());
    assert!(report.summary_path.as_ref().is_some_and(|p| p.is_file()));
}

#[tokio::test]
async fn test_old_bug_found_against_downloaded_baseline() {
    let dir = tempfile::tempdir().unwrap();
    write_fuzzer(dir.path(), CRASH_FUZZER);
    write_fuzzer(dir.path(), NOCRASH_FUZZER);
    let transport = published_build();
    let engine = FakeEngine::crashing(&[CRASH_FUZZER], &[true, true]);
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running())
        .with_baseline_fetcher(baseline_fetcher(transport.clone()));

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert!(matches!(outcome, TriageOutcome::KnownBug(_)));
    let baseline = dir.path().join("oss_fuzz_latest");
    assert_eq!(dir_entries(&baseline), vec![CRASH_FUZZER, NOCRASH_FUZZER]);
    assert_eq!(
        engine.replayed.lock().unwrap().last(),
        Some(&baseline.join(CRASH_FUZZER))
    );
    assert_eq!(
        transport.requests(),
        vec![
            latest_build_version_url(PROJECT),
            build_archive_url(PROJECT, BUILD_VERSION)
        ]
    );
}

#[tokio::test]
async fn test_new_bug_found_against_downloaded_baseline() {
    let dir = tempfile::tempdir().unwrap();
    write_fuzzer(dir.path(), CRASH_FUZZER);
    let engine = FakeEngine::crashing(&[CRASH_FUZZER], &[true, false]);
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running())
        .with_baseline_fetcher(baseline_fetcher(published_build()));

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert!(matches!(outcome, TriageOutcome::NewBug(_)));
    assert!(!dir_entries(&dir.path().join("oss_fuzz_latest")).is_empty());
}

#[tokio::test]
async fn test_baseline_download_failure_treats_crash_as_new() {
    let dir = tempfile::tempdir().unwrap();
    write_fuzzer(dir.path(), CRASH_FUZZER);
    let transport = FakeArchiveTransport::new();
    let engine = FakeEngine::crashing(&[CRASH_FUZZER], &[true, true]);
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running())
        .with_baseline_fetcher(baseline_fetcher(transport.clone()));

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert!(matches!(outcome, TriageOutcome::NewBug(_)));
    assert!(!dir.path().join("oss_fuzz_latest").exists());
    assert_eq!(engine.replayed.lock().unwrap().len(), 1);
    assert_eq!(transport.requests(), vec![latest_build_version_url(PROJECT)]);
}

#[tokio::test]
async fn test_existing_baseline_is_not_downloaded() {
    let dir = build_dir_with_baseline();
    let transport = published_build();
    let engine = FakeEngine::crashing(&[CRASH_FUZZER], &[true, true]);
    let runner = CrashTriageRunner::new(&engine, TriageOptions::default(), running())
        .with_baseline_fetcher(baseline_fetcher(transport.clone()));

    let outcome = runner.run_fuzzers(10, dir.path(), PROJECT).await;

    assert!(matches!(outcome, TriageOutcome::KnownBug(_)));
    assert!(transport.requests().is_empty());
}
