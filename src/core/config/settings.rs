use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Tunables of a synchronization session. Every field has a default, so a
/// partial settings file only overrides what it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Parallel transfers in a batch.
    pub concurrency: usize,
    /// Attempts per file before it is reported as failed.
    pub max_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_delay_ms`.
    pub retry_delay_ms: u64,
    pub manifest_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    /// Executable used to merge binary deltas.
    pub patch_tool: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_attempts: 3,
            retry_delay_ms: 1000,
            manifest_timeout_secs: 10,
            transfer_timeout_secs: 15,
            patch_tool: "hpatchz".to_string(),
        }
    }
}

impl SyncSettings {
    /// Load settings from a JSON file, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring corrupt settings file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "concurrency": 2 }"#).unwrap();

        let settings = SyncSettings::load(&path);
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.patch_tool, "hpatchz");
    }

    #[test]
    fn corrupt_or_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(SyncSettings::load(&path).concurrency, 8);

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(SyncSettings::load(&path).retry_delay(), Duration::from_secs(1));
    }
}
