// ─── Pre-download Staging ───
// Layout of `<root>/.predownload` and its version marker.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::downloader::TEMP_SUFFIX;
use crate::core::error::{SyncError, SyncResult};

/// Staging directory under the install root.
pub const STAGING_DIR: &str = ".predownload";

/// Marker describing what was staged.
pub const STATE_FILE: &str = "predownload_version.json";

/// Suffix of staged binary deltas.
pub const PATCH_SUFFIX: &str = ".hpatch";

pub fn staging_root(root: &Path) -> PathBuf {
    root.join(STAGING_DIR)
}

/// Version marker written after a pre-download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredownloadState {
    /// Version the staged content updates to.
    pub version: String,
    pub server: String,
    pub is_patch: bool,
    /// Installed version the deltas were built against.
    #[serde(default)]
    pub base_version: Option<String>,
}

impl PredownloadState {
    /// Read the marker from `staging`. A missing directory or marker is
    /// `NoStagedContent`, an unreadable one `CorruptState`.
    pub fn load(staging: &Path) -> SyncResult<Self> {
        let path = staging.join(STATE_FILE);
        if !staging.is_dir() || !path.is_file() {
            return Err(SyncError::NoStagedContent(staging.to_path_buf()));
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| SyncError::io(&path, e))?;
        serde_json::from_str(&raw).map_err(|e| SyncError::CorruptState {
            path,
            reason: e.to_string(),
        })
    }

    pub fn save(&self, staging: &Path) -> SyncResult<()> {
        std::fs::create_dir_all(staging).map_err(|e| SyncError::io(staging, e))?;
        let path = staging.join(STATE_FILE);
        let json = serde_json::to_string(self)?;
        std::fs::write(&path, json).map_err(|e| SyncError::io(&path, e))
    }
}

/// Every staged payload file below `staging`, as paths relative to
/// `staging` with forward slashes, sorted. The marker and unfinished
/// downloads are left out.
pub fn staged_files(staging: &Path) -> SyncResult<Vec<String>> {
    let mut files = Vec::new();
    collect_files(staging, staging, &mut files)?;
    files.retain(|rel| rel != STATE_FILE && !rel.ends_with(TEMP_SUFFIX));
    files.sort();
    Ok(files)
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<String>) -> SyncResult<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| SyncError::io(dir, e))? {
        let entry = entry.map_err(|e| SyncError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(rel);
        }
    }
    Ok(())
}
