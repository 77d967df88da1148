use std::collections::BTreeSet;
use std::io::{self, Read};
use std::path::Path;

use log::debug;
use tokio::process::Command;

use crate::types::coverage::normalize_path;
use crate::types::{AppError, AppResult};

/// Changed file paths, normalized the same way as covered-file sets:
/// relative, no leading `/` or `./`, dot components resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    files: BTreeSet<String>,
}

impl ChangeSet {
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let files = paths
            .into_iter()
            .filter_map(|p| normalize_changed_path(p.as_ref()))
            .collect();
        Self { files }
    }

    /// Read whitespace-separated paths from a file, or stdin for `-`.
    pub fn from_file(path: &str) -> io::Result<Self> {
        let input = if path == "-" {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        } else {
            std::fs::read_to_string(path)?
        };
        Ok(Self::from_paths(input.split_whitespace()))
    }

    /// Files changed between `base` and the working tree of `repo_dir`.
    pub async fn from_git_diff(repo_dir: &Path, base: &str) -> AppResult<Self> {
        let output = Command::new("git")
            .arg("diff")
            .arg("--name-only")
            .arg(base)
            .current_dir(repo_dir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(AppError::Custom(format!(
                "git diff against {base} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let changes = Self::from_paths(stdout.lines());
        debug!("{} file(s) changed since {base}", changes.len());
        Ok(changes)
    }

    pub fn merge(&mut self, other: ChangeSet) {
        self.files.extend(other.files);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    pub fn intersects(&self, covered: &BTreeSet<String>) -> bool {
        // Iterate the smaller side
        if self.files.len() <= covered.len() {
            self.files.iter().any(|f| covered.contains(f))
        } else {
            covered.iter().any(|f| self.files.contains(f))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn normalize_changed_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = normalize_path(Path::new(trimmed));
    let relative = normalized.strip_prefix("/").unwrap_or(&normalized);
    let s = relative.to_string_lossy().into_owned();
    if s.is_empty() { None } else { Some(s) }
}
