// Test doubles shared by the unit tests of every module.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use md5::{Digest, Md5};
use serde_json::{json, Value};

use crate::core::cache::{ContentHasher, Md5Hasher};
use crate::core::config::SyncSettings;
use crate::core::error::{SyncError, SyncResult};
use crate::core::http::{TransferResponse, Transport};
use crate::core::patch::PatchTool;
use crate::core::progress::NoopProgress;
use crate::core::sync::{SessionBuilder, SyncSession};

pub const CDN: &str = "https://cdn.example/game/";

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Launcher configuration pointing at [`CDN`] with the full index at
/// `index.json` and resources under `res/`.
pub fn launcher_json(version: &str, predownload: Option<Value>) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "default": {
            "cdnList": [
                { "url": CDN, "K1": 1, "K2": 1, "P": 10 },
                { "url": "https://disabled.example/", "K1": 1, "K2": 0, "P": 99 }
            ],
            "config": { "indexFile": "index.json" },
            "resourcesBasePath": "res",
            "version": version
        },
        "predownload": predownload
    }))
    .unwrap()
}

/// Resource index for `(dest, content)` pairs.
pub fn index_json(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let resource: Vec<Value> = entries
        .iter()
        .map(|(dest, data)| json!({ "dest": dest, "md5": md5_hex(data), "size": data.len() }))
        .collect();
    serde_json::to_vec(&json!({ "resource": resource })).unwrap()
}

#[derive(Debug, Clone)]
struct FakeResource {
    data: Vec<u8>,
    failures_left: usize,
    truncate_to: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub offset: u64,
}

/// In-memory CDN. Honours range requests and records every request.
#[derive(Default)]
pub struct FakeTransport {
    resources: Mutex<HashMap<String, FakeResource>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn serve(&self, url: &str, data: Vec<u8>) {
        self.insert(url, data, 0, None);
    }

    /// The first `failures` requests answer `503`.
    pub fn serve_flaky(&self, url: &str, data: Vec<u8>, failures: usize) {
        self.insert(url, data, failures, None);
    }

    /// Every response body stops after `len` bytes.
    pub fn serve_truncated(&self, url: &str, data: Vec<u8>, len: usize) {
        self.insert(url, data, 0, Some(len));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.url == url).count()
    }

    fn insert(&self, url: &str, data: Vec<u8>, failures_left: usize, truncate_to: Option<usize>) {
        self.resources.lock().unwrap().insert(
            url.to_string(),
            FakeResource {
                data,
                failures_left,
                truncate_to,
            },
        );
    }

    /// Records the request and returns the status plus body to answer with.
    fn answer(&self, url: &str, offset: u64) -> (u16, Vec<u8>) {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            offset,
        });
        let mut resources = self.resources.lock().unwrap();
        let Some(resource) = resources.get_mut(url) else {
            return (404, Vec::new());
        };
        if resource.failures_left > 0 {
            resource.failures_left -= 1;
            return (503, Vec::new());
        }
        let (status, mut body) = if offset > 0 {
            let start = (offset as usize).min(resource.data.len());
            (206, resource.data[start..].to_vec())
        } else {
            (200, resource.data.clone())
        };
        if let Some(len) = resource.truncate_to {
            body.truncate(len);
        }
        (status, body)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get_bytes(&self, url: &str) -> SyncResult<Vec<u8>> {
        match self.answer(url, 0) {
            (200, body) => Ok(body),
            (status, _) => Err(SyncError::DownloadFailed {
                url: url.to_string(),
                status,
            }),
        }
    }

    async fn open(&self, url: &str, offset: u64) -> SyncResult<TransferResponse> {
        let (status, body) = self.answer(url, offset);
        let chunks: Vec<SyncResult<Bytes>> = body
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(TransferResponse {
            status,
            body: stream::iter(chunks).boxed(),
        })
    }
}

/// MD5 hasher that counts how often file bytes were actually read.
#[derive(Default)]
pub struct CountingHasher {
    calls: AtomicUsize,
}

impl CountingHasher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContentHasher for CountingHasher {
    fn hash_file(&self, path: &Path) -> std::io::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Md5Hasher.hash_file(path)
    }
}

/// Patch tool stand-in: the "delta" holds the complete new file content.
/// Bases whose file name is listed in `failing` make the merge exit non-zero
/// after writing a partial output.
pub struct ScriptedPatchTool {
    available: bool,
    failing: Vec<String>,
    merges: Mutex<Vec<PathBuf>>,
    probes: AtomicUsize,
}

impl ScriptedPatchTool {
    pub fn available() -> Self {
        Self {
            available: true,
            failing: Vec::new(),
            merges: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn missing() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.failing.push(file_name.to_string());
        self
    }

    pub fn merges(&self) -> Vec<PathBuf> {
        self.merges.lock().unwrap().clone()
    }

    /// How often availability was checked.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PatchTool for ScriptedPatchTool {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.available
    }

    async fn merge(&self, old: &Path, delta: &Path, new: &Path) -> SyncResult<bool> {
        self.merges.lock().unwrap().push(old.to_path_buf());
        let name = old
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            std::fs::write(new, b"partial").unwrap();
            return Ok(false);
        }
        std::fs::copy(delta, new).unwrap();
        Ok(true)
    }
}

/// Session on `root` for `server` wired to the given doubles, with retries
/// that do not sleep.
pub fn session(
    root: &Path,
    server: &str,
    transport: Arc<FakeTransport>,
    tool: Arc<ScriptedPatchTool>,
) -> SyncSession {
    let settings = SyncSettings {
        concurrency: 4,
        retry_delay_ms: 0,
        ..SyncSettings::default()
    };
    SessionBuilder::new(root, server)
        .settings(settings)
        .transport(transport)
        .progress(Arc::new(NoopProgress::default()))
        .patch_tool(tool)
        .build()
        .unwrap()
}

/// Write `data` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, data: &[u8]) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, data).unwrap();
    path
}
