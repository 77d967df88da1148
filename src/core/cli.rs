use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// All relative paths will be interpreted relative to this directory.
    /// All child processes will be run in this directory.
    #[arg(long, global = true)]
    pub cwd: Option<String>,

    /// Name of the config file searched for from the working directory upwards
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Logging level (overrides env/config). One of: trace, debug, info, warn, error
    #[arg(long = "log.level", global = true)]
    pub log_level: Option<String>,

    /// Logging color control: "on" to force colors, "off" to disable; omit for auto
    #[arg(long = "log.color", global = true)]
    pub log_color: Option<String>,

    /// Base URL of the coverage storage.
    /// Replaces config [coverage].storage_url if provided.
    #[arg(long = "coverage.url", global = true)]
    pub storage_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default config file into the working directory
    Init,

    /// Build a project's fuzz targets at a commit or pull request
    Build(BuildArgs),

    /// Fuzz every target in a build directory and triage the first crash
    Run(RunArgs),

    /// Check that a directory contains fuzz targets
    CheckBuild(CheckBuildArgs),

    /// Remove fuzz targets whose coverage does not overlap the changed files
    Affected(AffectedArgs),

    /// Print the files a fuzz target is known to cover
    Covered(CoveredArgs),

    /// Print the effective global configuration
    PrintConfig(PrintConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Project whose image is used for the build
    #[arg(long)]
    pub project: String,

    /// Name of the repository checked out under /src in the image
    #[arg(long)]
    pub repo: String,

    /// Workspace directory; binaries are written to <workspace>/out
    #[arg(long)]
    pub workspace: String,

    /// Commit to build
    #[arg(long = "commit-sha", conflicts_with = "pr_ref")]
    pub commit_sha: Option<String>,

    /// Pull request reference to build, e.g. refs/pull/1757/merge
    #[arg(long = "pr-ref")]
    pub pr_ref: Option<String>,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Project the fuzz targets belong to
    #[arg(long)]
    pub project: String,

    /// Directory holding the built fuzz targets
    #[arg(long = "build-dir")]
    pub build_dir: String,

    /// Total fuzzing time budget in seconds, shared across all targets.
    /// Replaces config [run].fuzz_seconds if provided.
    #[arg(long = "fuzz-seconds", allow_negative_numbers = true)]
    pub fuzz_seconds: Option<i64>,

    /// Directory holding baseline binaries, relative to the build directory unless absolute.
    /// Replaces config [run].baseline_dir if provided.
    #[arg(long = "baseline-dir")]
    pub baseline_dir: Option<String>,

    /// Output format: "table" (default) or "json"
    #[arg(long, default_value = "table")]
    pub format: String,
}

/// Arguments for the check-build command
#[derive(Parser, Debug)]
pub struct CheckBuildArgs {
    /// Directory to check
    #[arg(value_name = "DIR")]
    pub dir: String,
}

/// Arguments for the affected command
#[derive(Parser, Debug)]
pub struct AffectedArgs {
    /// Project whose coverage reports are consulted
    #[arg(long)]
    pub project: String,

    /// Directory holding the built fuzz targets
    #[arg(long = "build-dir")]
    pub build_dir: String,

    /// Source root the coverage reports were recorded under, e.g. /src/curl
    #[arg(long = "source-root")]
    pub source_root: String,

    /// Changed files, relative to the source root
    #[arg(value_name = "FILE")]
    pub files: Vec<String>,

    /// Read changed files from a file (use '-' for stdin), separated by whitespace
    #[arg(long = "changed-files")]
    pub changed_files: Option<String>,

    /// Add files changed since this git ref (requires --repo-dir)
    #[arg(long = "diff-base", requires = "repo_dir")]
    pub diff_base: Option<String>,

    /// Checkout used with --diff-base
    #[arg(long = "repo-dir")]
    pub repo_dir: Option<String>,

    /// Report the selection without deleting anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Output format: "table" (default) or "json"
    #[arg(long, default_value = "table")]
    pub format: String,
}

/// Arguments for the covered command
#[derive(Parser, Debug)]
pub struct CoveredArgs {
    /// Project whose coverage reports are consulted
    #[arg(long)]
    pub project: String,

    /// Fuzz target name
    #[arg(long)]
    pub target: String,

    /// Source root the coverage reports were recorded under, e.g. /src/curl
    #[arg(long = "source-root")]
    pub source_root: String,
}

/// Arguments for the print-config command
#[derive(Parser, Debug)]
pub struct PrintConfigArgs {
    /// Output format: "table" (default) or "json"
    #[arg(long, default_value = "table")]
    pub format: String,
}
