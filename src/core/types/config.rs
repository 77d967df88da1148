use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::types::AppResult;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LogConfig {
    pub level: Option<String>,
    pub color: Option<bool>, // None = auto-detect (semantic)
}

impl LogConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    pub fn color(&self) -> Option<bool> {
        self.color // None has semantic meaning (auto-detect)
    }

    pub fn to_effective(&self) -> Self {
        Self {
            level: Some(self.level().to_string()),
            color: self.color,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CoverageConfig {
    pub storage_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl CoverageConfig {
    pub fn storage_url(&self) -> &str {
        self.storage_url
            .as_deref()
            .unwrap_or("https://storage.googleapis.com")
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(30)
    }

    pub fn to_effective(&self) -> Self {
        Self {
            storage_url: Some(self.storage_url().to_string()),
            timeout_secs: Some(self.timeout_secs()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RunConfig {
    pub fuzz_seconds: Option<i64>,
    /// Relative paths are resolved against the build directory.
    pub baseline_dir: Option<String>,
    /// Relative paths are resolved against the build directory.
    pub artifacts_dir: Option<String>,
    pub reproduce_attempts: Option<u32>,
    /// Fetch the project's latest published build when `baseline_dir` is absent.
    pub download_baseline: Option<bool>,
    pub baseline_timeout_secs: Option<u64>,
}

impl RunConfig {
    pub fn fuzz_seconds(&self) -> i64 {
        self.fuzz_seconds.unwrap_or(600)
    }

    pub fn baseline_dir(&self) -> &str {
        self.baseline_dir.as_deref().unwrap_or("oss_fuzz_latest")
    }

    pub fn artifacts_dir(&self) -> &str {
        self.artifacts_dir.as_deref().unwrap_or("artifacts")
    }

    pub fn reproduce_attempts(&self) -> u32 {
        self.reproduce_attempts.unwrap_or(10)
    }

    pub fn download_baseline(&self) -> bool {
        self.download_baseline.unwrap_or(true)
    }

    pub fn baseline_timeout_secs(&self) -> u64 {
        self.baseline_timeout_secs.unwrap_or(600)
    }

    pub fn to_effective(&self) -> Self {
        Self {
            fuzz_seconds: Some(self.fuzz_seconds()),
            baseline_dir: Some(self.baseline_dir().to_string()),
            artifacts_dir: Some(self.artifacts_dir().to_string()),
            reproduce_attempts: Some(self.reproduce_attempts()),
            download_baseline: Some(self.download_baseline()),
            baseline_timeout_secs: Some(self.baseline_timeout_secs()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BuildConfig {
    pub registry: Option<String>,
    pub engine: Option<String>,
    pub sanitizer: Option<String>,
    pub architecture: Option<String>,
    pub language: Option<String>,
}

impl BuildConfig {
    pub fn registry(&self) -> &str {
        self.registry.as_deref().unwrap_or("gcr.io/oss-fuzz")
    }

    pub fn engine(&self) -> &str {
        self.engine.as_deref().unwrap_or("libfuzzer")
    }

    pub fn sanitizer(&self) -> &str {
        self.sanitizer.as_deref().unwrap_or("address")
    }

    pub fn architecture(&self) -> &str {
        self.architecture.as_deref().unwrap_or("x86_64")
    }

    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or("c++")
    }

    pub fn to_effective(&self) -> Self {
        Self {
            registry: Some(self.registry().to_string()),
            engine: Some(self.engine().to_string()),
            sanitizer: Some(self.sanitizer().to_string()),
            architecture: Some(self.architecture().to_string()),
            language: Some(self.language().to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    pub log: Option<LogConfig>,
    pub coverage: Option<CoverageConfig>,
    pub run: Option<RunConfig>,
    pub build: Option<BuildConfig>,
}

impl Config {
    pub fn log(&self) -> LogConfig {
        self.log.clone().unwrap_or_default()
    }

    pub fn coverage(&self) -> CoverageConfig {
        self.coverage.clone().unwrap_or_default()
    }

    pub fn run(&self) -> RunConfig {
        self.run.clone().unwrap_or_default()
    }

    pub fn build(&self) -> BuildConfig {
        self.build.clone().unwrap_or_default()
    }

    pub fn to_effective(&self) -> Self {
        Self {
            log: Some(self.log().to_effective()),
            coverage: Some(self.coverage().to_effective()),
            run: Some(self.run().to_effective()),
            build: Some(self.build().to_effective()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_level: Option<String>,
    pub log_color: Option<String>, // "on" | "off"
    pub storage_url: Option<String>,
    pub fuzz_seconds: Option<i64>,
    pub baseline_dir: Option<String>,
}

static CONFIG_FILENAME: OnceCell<String> = OnceCell::new();
static CONFIG: OnceCell<Config> = OnceCell::new();

pub fn set_config_filename(filename: &str) {
    let _ = CONFIG_FILENAME.set(filename.to_string());
}

pub fn get_config_filename() -> &'static str {
    CONFIG_FILENAME
        .get()
        .map(|s| s.as_str())
        .unwrap_or("cifuzz.toml")
}

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        let mut cfg = Config::default();
        if let Some(path) = find_nearest_config_file()
            && let Some(file_cfg) = read_config_file(&path)
        {
            apply_file_config(&mut cfg, &file_cfg);
        }
        cfg
    })
}

pub fn init_with_overrides(overrides: &CliOverrides) {
    let _ = CONFIG.set(build_config(find_nearest_config_file().as_deref(), overrides));
}

/// Layer defaults, then the config file (if any), then CLI overrides.
pub fn build_config(config_file: Option<&Path>, overrides: &CliOverrides) -> Config {
    let mut cfg = Config::default();

    if let Some(path) = config_file
        && let Some(file_cfg) = read_config_file(path)
    {
        apply_file_config(&mut cfg, &file_cfg);
    }

    // CLI arguments have the highest priority. Only override if user specified.
    apply_cli_overrides(&mut cfg, overrides);
    cfg
}

pub fn parse_config(contents: &str) -> AppResult<Config> {
    Ok(toml::from_str::<Config>(contents)?)
}

// Logging is not up yet when the config is read, hence eprintln
fn read_config_file(path: &Path) -> Option<Config> {
    let contents = fs::read_to_string(path).ok()?;
    match parse_config(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!("Ignoring malformed config file {}: {e}", path.display());
            None
        }
    }
}

fn apply_file_config(cfg: &mut Config, file: &Config) {
    if let Some(file_log) = &file.log {
        let mut log = cfg.log.clone().unwrap_or_default();
        if file_log.level.is_some() {
            log.level = file_log.level.clone();
        }
        if file_log.color.is_some() {
            log.color = file_log.color;
        }
        cfg.log = Some(log);
    }

    if let Some(file_cov) = &file.coverage {
        let mut coverage = cfg.coverage.clone().unwrap_or_default();
        if file_cov.storage_url.is_some() {
            coverage.storage_url = file_cov.storage_url.clone();
        }
        if file_cov.timeout_secs.is_some() {
            coverage.timeout_secs = file_cov.timeout_secs;
        }
        cfg.coverage = Some(coverage);
    }

    if let Some(file_run) = &file.run {
        let mut run = cfg.run.clone().unwrap_or_default();
        if file_run.fuzz_seconds.is_some() {
            run.fuzz_seconds = file_run.fuzz_seconds;
        }
        if file_run.baseline_dir.is_some() {
            run.baseline_dir = file_run.baseline_dir.clone();
        }
        if file_run.artifacts_dir.is_some() {
            run.artifacts_dir = file_run.artifacts_dir.clone();
        }
        if file_run.reproduce_attempts.is_some() {
            run.reproduce_attempts = file_run.reproduce_attempts;
        }
        if file_run.download_baseline.is_some() {
            run.download_baseline = file_run.download_baseline;
        }
        if file_run.baseline_timeout_secs.is_some() {
            run.baseline_timeout_secs = file_run.baseline_timeout_secs;
        }
        cfg.run = Some(run);
    }

    if let Some(file_build) = &file.build {
        let mut build = cfg.build.clone().unwrap_or_default();
        if file_build.registry.is_some() {
            build.registry = file_build.registry.clone();
        }
        if file_build.engine.is_some() {
            build.engine = file_build.engine.clone();
        }
        if file_build.sanitizer.is_some() {
            build.sanitizer = file_build.sanitizer.clone();
        }
        if file_build.architecture.is_some() {
            build.architecture = file_build.architecture.clone();
        }
        if file_build.language.is_some() {
            build.language = file_build.language.clone();
        }
        cfg.build = Some(build);
    }
}

fn apply_cli_overrides(cfg: &mut Config, overrides: &CliOverrides) {
    // Log overrides
    let mut log = cfg.log.clone().unwrap_or_default();
    if let Some(level) = &overrides.log_level
        && !level.trim().is_empty()
    {
        log.level = Some(level.trim().to_string());
    }
    if let Some(color_str) = &overrides.log_color {
        match color_str.to_lowercase().as_str() {
            "on" => log.color = Some(true),
            "off" => log.color = Some(false),
            _ => {}
        }
    }
    if overrides.log_level.is_some() || overrides.log_color.is_some() {
        cfg.log = Some(log);
    }

    // Coverage overrides
    if let Some(url) = &overrides.storage_url
        && !url.trim().is_empty()
    {
        let mut coverage = cfg.coverage.clone().unwrap_or_default();
        coverage.storage_url = Some(url.trim_end_matches('/').to_string());
        cfg.coverage = Some(coverage);
    }

    // Run overrides
    let mut run = cfg.run.clone().unwrap_or_default();
    if overrides.fuzz_seconds.is_some() {
        run.fuzz_seconds = overrides.fuzz_seconds;
    }
    if let Some(dir) = &overrides.baseline_dir
        && !dir.trim().is_empty()
    {
        run.baseline_dir = Some(dir.clone());
    }
    if overrides.fuzz_seconds.is_some() || overrides.baseline_dir.is_some() {
        cfg.run = Some(run);
    }
}

fn find_nearest_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let config_filename = get_config_filename();
    for dir in cwd.ancestors() {
        let candidate = dir.join(config_filename);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

pub fn colors_enabled() -> bool {
    match config().log().color() {
        Some(force) => force,
        None => console::colors_enabled(),
    }
}

/// Resolve a configured directory against the build directory unless absolute.
pub fn resolve_against(base: &Path, configured: &str) -> PathBuf {
    let path = PathBuf::from(configured);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
