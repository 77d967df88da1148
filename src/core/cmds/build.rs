use std::path::PathBuf;

use log::{error, info};

use crate::core::builder::{BuildRequest, DockerRuntime, build_fuzzers};
use crate::core::cli::BuildArgs;
use crate::types::AppResult;

pub async fn execute_build(args: BuildArgs) -> AppResult<bool> {
    let request = BuildRequest {
        project: args.project,
        repo_name: args.repo,
        workspace: PathBuf::from(args.workspace),
        commit_sha: args.commit_sha,
        pr_ref: args.pr_ref,
    };

    let built = build_fuzzers(&DockerRuntime, &request).await?;
    if built {
        info!("Build succeeded: {}", request.out_dir().display());
    } else {
        error!("Build failed for project '{}'", request.project);
    }
    Ok(built)
}
