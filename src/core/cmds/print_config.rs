use log::info;

use crate::types::AppResult;
use crate::types::config::config;

pub async fn execute_print_config(format: String) -> AppResult<()> {
    let effective = config().to_effective();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&effective)?);
        return Ok(());
    }

    let log = effective.log();
    let coverage = effective.coverage();
    let run = effective.run();
    let build = effective.build();

    info!("Effective Configuration:");
    info!("");
    info!("Log:");
    info!("  level: {}", log.level());
    match log.color() {
        Some(true) => info!("  color: on"),
        Some(false) => info!("  color: off"),
        None => info!("  color: auto"),
    }

    info!("");
    info!("Coverage:");
    info!("  storage_url: {}", coverage.storage_url());
    info!("  timeout: {}s", coverage.timeout_secs());

    info!("");
    info!("Run:");
    info!("  fuzz_seconds: {}", run.fuzz_seconds());
    info!("  baseline_dir: {}", run.baseline_dir());
    info!("  artifacts_dir: {}", run.artifacts_dir());
    info!("  reproduce_attempts: {}", run.reproduce_attempts());
    info!("  download_baseline: {}", run.download_baseline());
    info!("  baseline_timeout_secs: {}", run.baseline_timeout_secs());

    info!("");
    info!("Build:");
    info!("  registry: {}", build.registry());
    info!("  engine: {}", build.engine());
    info!("  sanitizer: {}", build.sanitizer());
    info!("  architecture: {}", build.architecture());
    info!("  language: {}", build.language());

    Ok(())
}
