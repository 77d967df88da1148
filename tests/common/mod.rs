#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cifuzz::{ArchiveTransport, JsonTransport};
use cifuzz::types::{AppError, AppResult};
use serde_json::Value;

pub const STORAGE_URL: &str = "https://storage.googleapis.com";

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn load_json(name: &str) -> Value {
    let text = fs::read_to_string(fixture_path(name)).expect("fixture exists");
    serde_json::from_str(&text).expect("fixture is valid JSON")
}

/// Serves canned JSON by URL and records every request.
#[derive(Clone, Default)]
pub struct FakeTransport {
    responses: HashMap<String, Value>,
    pub requested: Arc<Mutex<Vec<String>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: Value) -> Self {
        self.responses.insert(url.to_string(), body);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl JsonTransport for FakeTransport {
    fn get_json(&self, url: &str) -> AppResult<Value> {
        self.requested.lock().unwrap().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::Http(format!("status code 404 for {url}")))
    }
}

pub fn latest_report_url(project: &str) -> String {
    format!("{STORAGE_URL}/oss-fuzz-coverage/latest_report_info/{project}.json")
}

pub fn target_report_url(project: &str, date: &str, target: &str) -> String {
    format!("{STORAGE_URL}/oss-fuzz-coverage/{project}/fuzzer_stats/{date}/{target}.json")
}

/// Minimal llvm-cov export listing `files`.
pub fn coverage_export(files: &[&str]) -> Value {
    let files: Vec<Value> = files
        .iter()
        .map(|f| serde_json::json!({"filename": f, "summary": {"lines": {"count": 10, "covered": 5}}}))
        .collect();
    serde_json::json!({"data": [{"files": files}], "type": "llvm.coverage.json.export"})
}

/// A file that passes fuzz target discovery.
#[cfg(unix)]
pub fn write_fuzzer(dir: &Path, name: &str) -> PathBuf {
    write_script(dir, name, "#!/bin/sh\n# LLVMFuzzerTestOneInput\nexit 0\n")
}

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Serves canned build artifacts by URL and records every request.
#[derive(Clone, Default)]
pub struct FakeArchiveTransport {
    objects: HashMap<String, Vec<u8>>,
    pub requested: Arc<Mutex<Vec<String>>>,
}

impl FakeArchiveTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.objects.insert(url.to_string(), body);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl ArchiveTransport for FakeArchiveTransport {
    fn download(&self, url: &str, sink: &mut dyn Write) -> AppResult<u64> {
        self.requested.lock().unwrap().push(url.to_string());
        let body = self
            .objects
            .get(url)
            .ok_or_else(|| AppError::Http(format!("status code 404 for {url}")))?;
        sink.write_all(body)?;
        Ok(body.len() as u64)
    }
}

pub fn latest_build_version_url(project: &str) -> String {
    format!("{STORAGE_URL}/clusterfuzz-builds/{project}/{project}-address-latest.version")
}

pub fn build_archive_url(project: &str, version: &str) -> String {
    format!("{STORAGE_URL}/clusterfuzz-builds/{project}/{version}")
}

/// Zip archive holding `entries`, each marked executable.
pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    for (name, body) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
