//! Retrieval of the project's latest published build. Crashes are replayed
//! against it to tell new bugs from ones already present upstream.
//!
//! Every failure is logged and reported as `false`; a missing baseline makes
//! the caller treat the crash as new.

use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use crate::core::coverage::HttpTransport;
use crate::types::config::config;
use crate::types::{AppError, AppResult};

const BUILDS_BUCKET: &str = "clusterfuzz-builds";
const MAX_ARCHIVE_BYTES: u64 = 8 << 30;

/// Streams a remote object into `sink`. Blocking, no retries.
pub trait ArchiveTransport: Send + Sync {
    fn download(&self, url: &str, sink: &mut dyn Write) -> AppResult<u64>;
}

impl ArchiveTransport for HttpTransport {
    fn download(&self, url: &str, sink: &mut dyn Write) -> AppResult<u64> {
        let mut body = self.agent.get(url).call()?.into_reader().take(MAX_ARCHIVE_BYTES);
        Ok(io::copy(&mut body, sink)?)
    }
}

pub struct BaselineFetcher {
    transport: Box<dyn ArchiveTransport>,
    storage_url: String,
    sanitizer: String,
}

impl BaselineFetcher {
    pub fn new(transport: Box<dyn ArchiveTransport>, storage_url: &str, sanitizer: &str) -> Self {
        Self {
            transport,
            storage_url: storage_url.trim_end_matches('/').to_string(),
            sanitizer: sanitizer.to_string(),
        }
    }

    pub fn from_config() -> Self {
        let cfg = config();
        let timeout = Duration::from_secs(cfg.run().baseline_timeout_secs());
        Self::new(
            Box::new(HttpTransport::new(timeout)),
            cfg.coverage().storage_url(),
            cfg.build().sanitizer(),
        )
    }

    /// Small text object naming the newest build archive.
    pub fn latest_version_url(&self, project: &str) -> String {
        format!(
            "{}/{BUILDS_BUCKET}/{project}/{project}-{}-latest.version",
            self.storage_url, self.sanitizer
        )
    }

    pub fn build_archive_url(&self, project: &str, version: &str) -> String {
        format!("{}/{BUILDS_BUCKET}/{project}/{version}", self.storage_url)
    }

    /// Make sure `dest` holds the latest published build of `project`.
    /// An existing non-empty `dest` is left alone.
    pub fn ensure_baseline(&self, project: &str, dest: &Path) -> bool {
        if has_entries(dest) {
            debug!("Baseline already present in {}", dest.display());
            return true;
        }
        match self.try_download(project, dest) {
            Ok(count) => {
                info!(
                    "Unpacked {count} file(s) of the latest {project} build into {}",
                    dest.display()
                );
                true
            }
            Err(e) => {
                warn!("Could not download the latest build of '{project}': {e}");
                if dest.exists()
                    && let Err(e) = fs::remove_dir_all(dest)
                {
                    debug!("Failed to clean up {}: {e}", dest.display());
                }
                false
            }
        }
    }

    fn try_download(&self, project: &str, dest: &Path) -> AppResult<usize> {
        if project.is_empty() {
            return Err(AppError::Custom("project name is empty".to_string()));
        }

        let mut version = Vec::new();
        self.transport
            .download(&self.latest_version_url(project), &mut version)?;
        let version = String::from_utf8_lossy(&version).trim().to_string();
        if version.is_empty() || version.contains('/') {
            return Err(AppError::Custom(format!(
                "unexpected build version '{version}'"
            )));
        }

        let archive_path = partial_archive_path(dest);
        let result = self.download_and_unpack(
            &self.build_archive_url(project, &version),
            &archive_path,
            dest,
        );
        if archive_path.exists()
            && let Err(e) = fs::remove_file(&archive_path)
        {
            debug!("Failed to remove {}: {e}", archive_path.display());
        }
        result
    }

    fn download_and_unpack(&self, url: &str, archive_path: &Path, dest: &Path) -> AppResult<usize> {
        if let Some(parent) = archive_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(archive_path)?;
        let size = self.transport.download(url, &mut file)?;
        debug!("Downloaded {size} bytes from {url}");
        unpack_zip(File::open(archive_path)?, dest)
    }
}

/// Extract a zip archive into `dest`, returning the number of entries.
pub fn unpack_zip<R: Read + Seek>(reader: R, dest: &Path) -> AppResult<usize> {
    let mut archive = zip::ZipArchive::new(reader)?;
    fs::create_dir_all(dest)?;
    archive.extract(dest)?;
    Ok(archive.len())
}

fn has_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Archive is downloaded next to `dest`, never inside it.
fn partial_archive_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "baseline".to_string());
    dest.with_file_name(format!("{name}.zip.partial"))
}
