//! Client for the remote coverage store.
//!
//! Reports are fetched fresh on every call. Anything that goes wrong while
//! fetching or parsing is logged and surfaced as `None`; callers decide what
//! "unknown coverage" means for them.

use std::collections::BTreeSet;
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;
use thiserror::Error;

use crate::types::config::config;
use crate::types::{AppResult, CoverageReportPointer, ProjectCoverageSummary, TargetCoverageReport};

/// Fetches a JSON document. Blocking, no retries.
pub trait JsonTransport: Send + Sync {
    fn get_json(&self, url: &str) -> AppResult<Value>;
}

pub struct HttpTransport {
    pub(crate) agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(timeout)
                .timeout_connect(timeout)
                .build(),
        }
    }
}

impl JsonTransport for HttpTransport {
    fn get_json(&self, url: &str) -> AppResult<Value> {
        let value = self.agent.get(url).call()?.into_json::<Value>()?;
        Ok(value)
    }
}

#[derive(Debug, Error)]
enum CoverageError {
    #[error("project name is empty")]
    EmptyProject,
    #[error("target name is empty")]
    EmptyTarget,
    #[error("source root is empty")]
    EmptySourceRoot,
    #[error("summary does not locate per-target reports")]
    MalformedSummary,
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("unexpected JSON at {url}: {reason}")]
    Parse { url: String, reason: String },
    #[error("no covered files under {0}")]
    NothingUnderRoot(String),
}

pub struct CoverageClient {
    transport: Box<dyn JsonTransport>,
    storage_url: String,
}

impl CoverageClient {
    pub fn new(transport: Box<dyn JsonTransport>, storage_url: &str) -> Self {
        Self {
            transport,
            storage_url: storage_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config() -> Self {
        let coverage = config().coverage();
        Self::new(
            Box::new(HttpTransport::new(Duration::from_secs(coverage.timeout_secs()))),
            coverage.storage_url(),
        )
    }

    pub fn latest_report_info_url(&self, project: &str) -> String {
        format!(
            "{}/oss-fuzz-coverage/latest_report_info/{}.json",
            self.storage_url, project
        )
    }

    /// Pointer to the newest coverage snapshot of `project`.
    pub fn get_latest_cov_report_info(&self, project: &str) -> Option<CoverageReportPointer> {
        match self.try_latest_cov_report_info(project) {
            Ok(pointer) => Some(pointer),
            Err(e) => {
                warn!("Coverage report info unavailable for project '{project}': {e}");
                None
            }
        }
    }

    fn try_latest_cov_report_info(&self, project: &str) -> Result<CoverageReportPointer, CoverageError> {
        if project.is_empty() {
            return Err(CoverageError::EmptyProject);
        }
        let url = self.latest_report_info_url(project);
        let mut pointer: CoverageReportPointer = self.fetch(&url)?;
        pointer.project = project.to_string();
        Ok(pointer)
    }

    /// URL of a target's report, or `None` if the summary cannot locate it.
    pub fn target_report_url(&self, summary: &ProjectCoverageSummary, target: &str) -> Option<String> {
        let stats_path = summary.fuzzer_stats_path()?;
        Some(format!("{}/{}/{}.json", self.storage_url, stats_path, target))
    }

    pub fn get_target_coverage_report(
        &self,
        summary: &ProjectCoverageSummary,
        target: &str,
    ) -> Option<TargetCoverageReport> {
        match self.try_target_coverage_report(summary, target) {
            Ok(report) => Some(report),
            Err(e) => {
                debug!("Coverage report unavailable for target '{target}': {e}");
                None
            }
        }
    }

    fn try_target_coverage_report(
        &self,
        summary: &ProjectCoverageSummary,
        target: &str,
    ) -> Result<TargetCoverageReport, CoverageError> {
        if target.is_empty() {
            return Err(CoverageError::EmptyTarget);
        }
        let url = self
            .target_report_url(summary, target)
            .ok_or(CoverageError::MalformedSummary)?;
        self.fetch(&url)
    }

    /// Files covered by `target` under `source_root`, relative to that root.
    pub fn get_files_covered_by_target(
        &self,
        summary: &ProjectCoverageSummary,
        target: &str,
        source_root: &str,
    ) -> Option<BTreeSet<String>> {
        match self.try_files_covered_by_target(summary, target, source_root) {
            Ok(files) => Some(files),
            Err(e) => {
                debug!("Covered files unavailable for target '{target}': {e}");
                None
            }
        }
    }

    fn try_files_covered_by_target(
        &self,
        summary: &ProjectCoverageSummary,
        target: &str,
        source_root: &str,
    ) -> Result<BTreeSet<String>, CoverageError> {
        if source_root.is_empty() {
            return Err(CoverageError::EmptySourceRoot);
        }
        let report = self.try_target_coverage_report(summary, target)?;
        let files = report.files_under(source_root);
        if files.is_empty() {
            return Err(CoverageError::NothingUnderRoot(source_root.to_string()));
        }
        Ok(files)
    }

    fn fetch<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CoverageError> {
        debug!("Fetching {url}");
        let value = self.transport.get_json(url).map_err(|e| CoverageError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !value.is_object() {
            return Err(CoverageError::Parse {
                url: url.to_string(),
                reason: "expected a JSON object".to_string(),
            });
        }
        serde_json::from_value(value).map_err(|e| CoverageError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}
