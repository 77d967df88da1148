use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::process::Command;

use crate::types::AppResult;

/// Marker every libFuzzer-style target binary carries.
const FUZZ_TARGET_MARKER: &[u8] = b"LLVMFuzzerTestOneInput";

const SKIPPED_EXTENSIONS: &[&str] = &["zip", "dict", "options", "txt", "json", "so"];
const SKIPPED_NAMES: &[&str] = &["llvm-symbolizer"];

/// Extra time given to a target past its own `-max_total_time` before it is killed.
const KILL_GRACE: Duration = Duration::from_secs(30);

static TESTCASE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Test unit written to (\S+)").expect("testcase regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuzzTarget {
    pub name: String,
    pub path: PathBuf,
}

/// Result of one fuzzing session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FuzzRun {
    pub output: String,
    /// Set when the session ended in a crash and left a testcase behind.
    pub testcase: Option<PathBuf>,
}

#[async_trait]
pub trait FuzzEngine: Send + Sync {
    /// Fuzz `target` for at most `budget`, writing crash inputs into `artifacts_dir`.
    async fn fuzz(&self, target: &FuzzTarget, budget: Duration, artifacts_dir: &Path)
    -> AppResult<FuzzRun>;

    /// Whether `testcase` still crashes `binary`.
    async fn is_reproducible(&self, binary: &Path, testcase: &Path) -> AppResult<bool>;
}

pub fn check_fuzzer_build(dir: &Path) -> bool {
    match list_fuzz_targets(dir) {
        Ok(targets) if !targets.is_empty() => true,
        Ok(_) => {
            warn!("No fuzz targets found in {}", dir.display());
            false
        }
        Err(e) => {
            warn!("Cannot read build directory {}: {e}", dir.display());
            false
        }
    }
}

/// Fuzz targets directly inside `dir`, sorted by name.
pub fn list_fuzz_targets(dir: &Path) -> io::Result<Vec<FuzzTarget>> {
    let mut targets = vec![];
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !is_fuzz_target(&path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            targets.push(FuzzTarget {
                name: name.to_string(),
                path: path.clone(),
            });
        }
    }
    targets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(targets)
}

fn is_fuzz_target(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if SKIPPED_NAMES.contains(&name) {
        return false;
    }
    if let Some(ext) = path.extension().and_then(|e| e.to_str())
        && SKIPPED_EXTENSIONS.contains(&ext)
    {
        return false;
    }
    if !is_executable(path) {
        return false;
    }
    match File::open(path).and_then(|file| contains_marker(BufReader::new(file))) {
        Ok(found) => found,
        Err(e) => {
            debug!("Skipping unreadable file {}: {e}", path.display());
            false
        }
    }
}

/// Streams `reader`, keeping a marker-sized overlap between buffer refills.
fn contains_marker<R: BufRead>(mut reader: R) -> io::Result<bool> {
    let overlap = FUZZ_TARGET_MARKER.len() - 1;
    let mut window: Vec<u8> = Vec::new();
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            return Ok(false);
        }
        let read = chunk.len();
        window.extend_from_slice(chunk);
        reader.consume(read);
        if window
            .windows(FUZZ_TARGET_MARKER.len())
            .any(|w| w == FUZZ_TARGET_MARKER)
        {
            return Ok(true);
        }
        let keep_from = window.len().saturating_sub(overlap);
        window.drain(..keep_from);
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

/// Drives libFuzzer binaries as child processes.
pub struct LibFuzzerEngine {
    reproduce_attempts: u32,
    reproduce_timeout: Duration,
}

impl LibFuzzerEngine {
    pub fn new(reproduce_attempts: u32) -> Self {
        Self {
            reproduce_attempts: reproduce_attempts.max(1),
            reproduce_timeout: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl FuzzEngine for LibFuzzerEngine {
    async fn fuzz(
        &self,
        target: &FuzzTarget,
        budget: Duration,
        artifacts_dir: &Path,
    ) -> AppResult<FuzzRun> {
        // The child runs inside the artifacts directory; relative paths would resolve against it
        let artifacts_dir = std::path::absolute(artifacts_dir)?;
        let program = std::path::absolute(&target.path)?;
        fs::create_dir_all(&artifacts_dir)?;
        let seconds = budget.as_secs().max(1);
        info!("Fuzzing {} for {seconds}s", target.name);

        let child = Command::new(&program)
            .arg(format!("-max_total_time={seconds}"))
            .arg(format!("-artifact_prefix={}/", artifacts_dir.display()))
            .arg("-print_final_stats=1")
            .current_dir(&artifacts_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(
            Duration::from_secs(seconds) + KILL_GRACE,
            child.wait_with_output(),
        )
        .await
        {
            Ok(output) => output?,
            Err(_) => {
                info!("{} ran out of time without crashing", target.name);
                return Ok(FuzzRun::default());
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            return Ok(FuzzRun {
                output: text,
                testcase: None,
            });
        }

        let testcase = find_testcase(&text, &artifacts_dir);
        match &testcase {
            Some(path) => info!("{} crashed, testcase at {}", target.name, path.display()),
            None => warn!(
                "{} exited with {} but left no testcase",
                target.name, output.status
            ),
        }
        Ok(FuzzRun {
            output: text,
            testcase,
        })
    }

    async fn is_reproducible(&self, binary: &Path, testcase: &Path) -> AppResult<bool> {
        for attempt in 1..=self.reproduce_attempts {
            let status = tokio::time::timeout(
                self.reproduce_timeout,
                Command::new(binary)
                    .arg("-runs=100")
                    .arg(testcase)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .status(),
            )
            .await;
            match status {
                Ok(Ok(status)) if !status.success() => {
                    debug!(
                        "{} reproduced on attempt {attempt}",
                        binary.display()
                    );
                    return Ok(true);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => debug!("Reproduce attempt {attempt} timed out"),
            }
        }
        Ok(false)
    }
}

/// Locate the crash input libFuzzer reports writing.
fn find_testcase(output: &str, artifacts_dir: &Path) -> Option<PathBuf> {
    let captured = TESTCASE_LINE
        .captures_iter(output)
        .last()
        .map(|caps| PathBuf::from(&caps[1]))?;
    let path = if captured.is_absolute() {
        captured
    } else {
        artifacts_dir.join(captured)
    };
    if path.exists() { Some(path) } else { None }
}
