use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{SyncError, SyncResult};

/// Version marker in the install root, shared with the official launcher.
pub const LOCAL_VERSION_FILE: &str = "launcherDownloadConfig.json";

/// Installed version, server app id and content group.
///
/// Fields written by other tools are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalVersion {
    pub version: String,
    #[serde(rename = "appId", default)]
    pub app_id: String,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_group() -> String {
    "default".to_string()
}

impl LocalVersion {
    pub fn new(version: &str, app_id: &str) -> Self {
        Self {
            version: version.to_string(),
            app_id: app_id.to_string(),
            group: default_group(),
            extra: serde_json::Map::new(),
        }
    }

    /// Read the marker; `Ok(None)` when the install has none yet.
    pub fn load(root: &Path) -> SyncResult<Option<Self>> {
        let path = root.join(LOCAL_VERSION_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::io(&path, e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| SyncError::CorruptState {
                path,
                reason: e.to_string(),
            })
    }

    pub fn save(&self, root: &Path) -> SyncResult<()> {
        std::fs::create_dir_all(root).map_err(|e| SyncError::io(root, e))?;
        let path = root.join(LOCAL_VERSION_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| SyncError::io(&path, e))
    }
}
