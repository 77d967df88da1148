use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use log::{debug, warn};

use crate::core::cli::{Args, Commands};
use crate::core::cmds;
use crate::core::logging::init_logging;
use crate::types::config::{CliOverrides, init_with_overrides, set_config_filename};
use crate::types::{AppResult, TriageOutcome};

/// Exit code when a new crash was found.
pub const EXIT_NEW_BUG: i32 = 1;
/// Exit code when the run could not happen at all.
pub const EXIT_NO_BUILD: i32 = 2;

pub fn exit_code_for(outcome: &TriageOutcome) -> i32 {
    match outcome {
        TriageOutcome::NoBuild => EXIT_NO_BUILD,
        TriageOutcome::NewBug(_) => EXIT_NEW_BUG,
        TriageOutcome::NoBugs | TriageOutcome::KnownBug(_) => 0,
    }
}

pub async fn run_main() -> AppResult<()> {
    let args = Args::parse();

    // Handle global arguments
    if let Some(cwd_arg) = args.cwd.as_ref() {
        let cwd = PathBuf::from(cwd_arg).canonicalize()?;
        env::set_current_dir(&cwd)?;
    }
    if let Some(config_name) = args.config.as_ref() {
        set_config_filename(config_name);
    }

    // Build CLI overrides for config precedence
    let mut cli_overrides = CliOverrides {
        log_level: args.log_level.clone(),
        log_color: args.log_color.clone(),
        storage_url: args.storage_url.clone(),
        ..Default::default()
    };
    if let Commands::Run(run_args) = &args.command {
        cli_overrides.fuzz_seconds = run_args.fuzz_seconds;
        cli_overrides.baseline_dir = run_args.baseline_dir.clone();
    }

    // Initialize configuration (files, then CLI overrides)
    init_with_overrides(&cli_overrides);

    // Initialize logging after config so level/color are applied
    init_logging();
    debug!("Current working directory: {}", env::current_dir()?.display());

    // Setup running flag to handle signals from ctrl-c
    let running = Arc::new(AtomicBool::new(true));
    let running_ctrlc = Arc::clone(&running);

    ctrlc::set_handler(move || {
        warn!("Received Ctrl-C, finishing the current fuzz target..");
        running_ctrlc.store(false, Ordering::SeqCst);
    })
    .expect("Error creating a Ctrl-C handler");

    // Dispatch to appropriate command
    let exit_code = match args.command {
        Commands::Init => {
            cmds::execute_init().await?;
            0
        }
        Commands::Build(build_args) => {
            if cmds::execute_build(build_args).await? { 0 } else { 1 }
        }
        Commands::Run(run_args) => {
            let outcome = cmds::execute_run(run_args, Arc::clone(&running)).await?;
            exit_code_for(&outcome)
        }
        Commands::CheckBuild(check_args) => {
            if cmds::execute_check_build(check_args).await? { 0 } else { 1 }
        }
        Commands::Affected(affected_args) => {
            cmds::execute_affected(affected_args).await?;
            0
        }
        Commands::Covered(covered_args) => {
            if cmds::execute_covered(covered_args).await? { 0 } else { 1 }
        }
        Commands::PrintConfig(print_args) => {
            cmds::execute_print_config(print_args.format).await?;
            0
        }
    };

    // Exit with appropriate code
    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
