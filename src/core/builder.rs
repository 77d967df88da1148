use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use crate::core::fuzz_target::check_fuzzer_build;
use crate::types::config::{BuildConfig, config};
use crate::types::{AppError, AppResult};

static PROJECT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("project regex is valid"));
static PR_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^refs/pull/[0-9]+/merge$").expect("pr ref regex is valid"));
static COMMIT_SHA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{7,40}$").expect("commit regex is valid"));

/// Runs container tooling. Returns whether the command exited successfully.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn run(&self, args: &[String]) -> AppResult<bool>;
}

pub struct DockerRuntime;

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, args: &[String]) -> AppResult<bool> {
        debug!("docker {}", args.join(" "));
        let output = Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            error!(
                "docker {} failed: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.status.success())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision<'a> {
    Commit(&'a str),
    PullRequest(&'a str),
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub project: String,
    pub repo_name: String,
    pub workspace: PathBuf,
    pub commit_sha: Option<String>,
    pub pr_ref: Option<String>,
}

impl BuildRequest {
    pub fn out_dir(&self) -> PathBuf {
        self.workspace.join("out")
    }

    /// Check the request before any container work is done.
    ///
    /// `Ok(None)` means the request is invalid; an empty commit identifier
    /// is a caller bug and is returned as an error instead.
    pub fn validate(&self) -> AppResult<Option<Revision<'_>>> {
        if let Some(sha) = &self.commit_sha
            && sha.is_empty()
        {
            return Err(AppError::InvalidCommit);
        }
        if !PROJECT_NAME.is_match(&self.project) {
            error!("Invalid project name: '{}'", self.project);
            return Ok(None);
        }
        if !is_valid_repo_name(&self.repo_name) {
            error!("Invalid repo name: '{}'", self.repo_name);
            return Ok(None);
        }
        if !self.workspace.is_dir() {
            error!("Workspace {} does not exist", self.workspace.display());
            return Ok(None);
        }

        let revision = match (self.commit_sha.as_deref(), self.pr_ref.as_deref()) {
            (Some(sha), None) if COMMIT_SHA.is_match(sha) => Revision::Commit(sha),
            (Some(sha), None) => {
                error!("Malformed commit SHA: '{sha}'");
                return Ok(None);
            }
            (None, Some(pr_ref)) if PR_REF.is_match(pr_ref) => Revision::PullRequest(pr_ref),
            (None, Some(pr_ref)) => {
                error!("Malformed pull request reference: '{pr_ref}'");
                return Ok(None);
            }
            (Some(_), Some(_)) => {
                error!("Give either a commit SHA or a pull request reference, not both");
                return Ok(None);
            }
            (None, None) => {
                error!("A commit SHA or a pull request reference is required");
                return Ok(None);
            }
        };
        Ok(Some(revision))
    }
}

fn is_valid_repo_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains('/')
        && !name.chars().any(char::is_whitespace)
}

/// Shell script run inside the project image to check out `revision` and compile.
fn checkout_and_compile_script(repo_name: &str, revision: Revision<'_>) -> String {
    let checkout = match revision {
        Revision::Commit(sha) => format!("git fetch origin {sha} && git checkout -f {sha}"),
        Revision::PullRequest(pr_ref) => {
            format!("git fetch origin {pr_ref}:cifuzz-pr && git checkout -f cifuzz-pr")
        }
    };
    format!("set -e; cd /src/{repo_name}; {checkout}; compile")
}

fn docker_run_args(request: &BuildRequest, revision: Revision<'_>, build: &BuildConfig) -> Vec<String> {
    let image = format!("{}/{}", build.registry(), request.project);
    let out_mount = format!("{}:/out", request.out_dir().display());
    vec![
        "run".to_string(),
        "--rm".to_string(),
        "--cap-add".to_string(),
        "SYS_PTRACE".to_string(),
        "-e".to_string(),
        format!("FUZZING_ENGINE={}", build.engine()),
        "-e".to_string(),
        format!("SANITIZER={}", build.sanitizer()),
        "-e".to_string(),
        format!("ARCHITECTURE={}", build.architecture()),
        "-e".to_string(),
        format!("FUZZING_LANGUAGE={}", build.language()),
        "-v".to_string(),
        out_mount,
        image,
        "/bin/bash".to_string(),
        "-c".to_string(),
        checkout_and_compile_script(&request.repo_name, revision),
    ]
}

/// Build the fuzz targets of `request.project` at the requested revision
/// into `<workspace>/out`.
pub async fn build_fuzzers(runtime: &dyn ContainerRuntime, request: &BuildRequest) -> AppResult<bool> {
    let Some(revision) = request.validate()? else {
        return Ok(false);
    };
    let build = config().build();

    let out_dir = request.out_dir();
    std::fs::create_dir_all(&out_dir)?;

    let image = format!("{}/{}", build.registry(), request.project);
    info!("Pulling {image}");
    if !runtime.run(&["pull".to_string(), image.clone()]).await? {
        error!("Could not pull image for project '{}'", request.project);
        return Ok(false);
    }

    info!("Building {} at {:?}", request.repo_name, revision);
    if !runtime.run(&docker_run_args(request, revision, &build)).await? {
        error!("Build of '{}' failed", request.project);
        return Ok(false);
    }

    Ok(check_out_dir(&out_dir))
}

fn check_out_dir(out_dir: &Path) -> bool {
    let ok = check_fuzzer_build(out_dir);
    if ok {
        info!("Fuzz targets built into {}", out_dir.display());
    }
    ok
}
