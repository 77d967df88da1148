use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use log::info;

use crate::core::baseline::BaselineFetcher;
use crate::core::cli::RunArgs;
use crate::core::fuzz_target::LibFuzzerEngine;
use crate::core::triage::{CrashTriageRunner, TriageOptions};
use crate::types::config::config;
use crate::types::{AppResult, TriageOutcome};

pub async fn execute_run(args: RunArgs, running: Arc<AtomicBool>) -> AppResult<TriageOutcome> {
    let run_config = config().run();
    let engine = LibFuzzerEngine::new(run_config.reproduce_attempts());
    let mut runner = CrashTriageRunner::new(&engine, TriageOptions::from_config(), running);
    if run_config.download_baseline() {
        runner = runner.with_baseline_fetcher(Arc::new(BaselineFetcher::from_config()));
    }

    let outcome = runner
        .run_fuzzers(run_config.fuzz_seconds(), Path::new(&args.build_dir), &args.project)
        .await;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(outcome)
}

fn print_outcome(outcome: &TriageOutcome) {
    let (run_success, bug_found) = outcome.as_flags();
    info!("Outcome: {}", outcome.display());
    info!("  run succeeded: {run_success}");
    info!("  bug found:     {bug_found}");
    if let Some(crash) = outcome.crash() {
        info!("  target:        {}", crash.target);
        info!("  testcase:      {}", crash.testcase.display());
        info!("  classified:    {}", crash.reproducibility);
        if let Some(summary) = &crash.summary_path {
            info!("  summary:       {}", summary.display());
        }
    }
}
