use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::core::cli::AffectedArgs;
use crate::core::coverage::CoverageClient;
use crate::core::fuzz_target::list_fuzz_targets;
use crate::core::selector::{AffectedTargetSelector, Selection, keep_affected_fuzzers};
use crate::types::{AppError, AppResult, ChangeSet};

async fn collect_changes(args: &AffectedArgs) -> AppResult<ChangeSet> {
    let mut changes = ChangeSet::from_paths(&args.files);
    if let Some(list) = &args.changed_files {
        changes.merge(ChangeSet::from_file(list)?);
    }
    if let (Some(base), Some(repo_dir)) = (&args.diff_base, &args.repo_dir) {
        changes.merge(ChangeSet::from_git_diff(Path::new(repo_dir), base).await?);
    }
    Ok(changes)
}

pub async fn execute_affected(args: AffectedArgs) -> AppResult<Selection> {
    let changes = collect_changes(&args).await?;
    info!("{} changed file(s)", changes.len());

    let build_dir = PathBuf::from(&args.build_dir);
    let project = args.project.clone();
    let source_root = args.source_root.clone();
    let dry_run = args.dry_run;

    // Coverage fetches block; keep them off the async workers
    let selection = tokio::task::spawn_blocking(move || -> AppResult<Selection> {
        let client = CoverageClient::from_config();
        if dry_run {
            let names: Vec<String> = list_fuzz_targets(&build_dir)?
                .into_iter()
                .map(|t| t.name)
                .collect();
            Ok(AffectedTargetSelector::new(&client).select(&project, &names, &changes, &source_root))
        } else {
            keep_affected_fuzzers(&client, &project, &build_dir, &changes, &source_root)
        }
    })
    .await
    .map_err(|e| AppError::Custom(format!("Target selection task failed: {e}")))??;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&selection)?);
    } else {
        for (target, reason) in &selection.kept {
            info!("  keep   {target} ({reason})");
        }
        for target in &selection.pruned {
            info!("  {}  {target}", if dry_run { "would prune" } else { "pruned" });
        }
        for target in &selection.removal_failed {
            warn!("  still on disk  {target}");
        }
    }
    Ok(selection)
}
