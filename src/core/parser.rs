use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::types::AppResult;

pub const SUMMARY_START: &str = "ERROR:";
pub const SUMMARY_END: &str = "SUMMARY:";
pub const BUG_SUMMARY_FILENAME: &str = "bug_summary.txt";

/// The crash summary region of `output`: from the first `ERROR:` through the
/// end of the `SUMMARY:` line that follows it.
pub fn extract_summary(output: &str) -> Option<&str> {
    let start = output.find(SUMMARY_START)?;
    let end_marker = start + output[start..].find(SUMMARY_END)?;
    let end = match output[end_marker..].find('\n') {
        Some(newline) => end_marker + newline + 1,
        None => output.len(),
    };
    Some(&output[start..end])
}

/// Write the crash summary found in `output` to `dest_dir/bug_summary.txt`.
///
/// Output without a summary region writes nothing and returns `Ok(None)`;
/// a missing summary file is how downstream triage knows there is no
/// actionable crash text.
pub fn parse_fuzzer_output(output: &str, dest_dir: &Path) -> AppResult<Option<PathBuf>> {
    let Some(summary) = extract_summary(output) else {
        debug!("No crash summary found in fuzzer output");
        return Ok(None);
    };

    fs::create_dir_all(dest_dir)?;
    let path = dest_dir.join(BUG_SUMMARY_FILENAME);
    fs::write(&path, summary)?;
    info!("Wrote crash summary to {}", path.display());
    Ok(Some(path))
}
