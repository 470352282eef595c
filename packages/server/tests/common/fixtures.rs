//! Test fixtures: status message payloads and a mock-backed service.

use std::path::PathBuf;
use std::sync::Arc;

use backup_core::config::{BackupSettings, LaunchMethod};
use backup_core::domains::backup::{BackupError, BackupService};
use backup_core::kernel::TestDependencies;
use serde_json::{json, Value};
use tempfile::TempDir;

// =============================================================================
// Status messages (wire format)
// =============================================================================

pub fn handshake(tag: &str) -> Value {
    json!({ "type": 0, "tag": tag })
}

pub fn preflight(tag: &str, total: u64) -> Value {
    json!({ "type": 1, "tag": tag, "total": total })
}

pub fn progress_pages(tag: &str, done: u64, postponed: u64) -> Value {
    json!({ "type": 2, "tag": tag, "status": 1, "done": done, "postponed": postponed })
}

pub fn progress(tag: &str, status: u8) -> Value {
    json!({ "type": 2, "tag": tag, "status": status })
}

pub fn error_fatal(tag: &str, kind: u8, name: Option<&str>) -> Value {
    let mut message = json!({ "type": 3, "tag": tag, "errorKind": kind });
    if let Some(name) = name {
        message["name"] = json!(name);
    }
    message
}

pub fn error_nonfatal(tag: &str, kind: u8) -> Value {
    json!({ "type": 4, "tag": tag, "errorKind": kind })
}

pub fn finish(tag: &str) -> Value {
    json!({ "type": 5, "tag": tag })
}

pub fn bytes(message: &Value) -> Vec<u8> {
    serde_json::to_vec(message).expect("message serializes")
}

/// Crawlers post the message as a JSON string holding the JSON object.
pub fn string_wrapped(message: &Value) -> Vec<u8> {
    serde_json::to_vec(&Value::String(message.to_string())).expect("message serializes")
}

// =============================================================================
// Service over mocks
// =============================================================================

/// A `BackupService` over `TestDependencies`, with real directories for
/// the archive and workspace paths.
pub struct ServiceFixture {
    pub deps: TestDependencies,
    pub service: Arc<BackupService>,
    pub dir: TempDir,
}

impl ServiceFixture {
    pub fn new(deps: TestDependencies) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let service = deps.build_service(settings_in(&dir));
        Self { deps, service, dir }
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.dir.path().join("archives")
    }

    /// Feed one JSON message through the decoding entry point.
    pub async fn send(&self, message: &Value) -> Result<(), BackupError> {
        self.service.ingest(&bytes(message)).await.map(|_| ())
    }

    /// Drive one worker through a full successful run.
    pub async fn complete_worker(&self, tag: &str, done: u64, total: u64) {
        self.send(&preflight(tag, total)).await.expect("preflight");
        self.send(&progress_pages(tag, done, 0)).await.expect("progress");
        self.send(&finish(tag)).await.expect("finish");
    }
}

pub fn settings_in(dir: &TempDir) -> BackupSettings {
    let archives = dir.path().join("archives");
    let common = dir.path().join("common");
    std::fs::create_dir_all(&archives).expect("archive dir");
    std::fs::create_dir_all(&common).expect("common dir");

    BackupSettings::builder()
        .launch_method(Some(LaunchMethod::Command))
        .archive_path(Some(archives))
        .common_path(Some(common))
        .build()
}
