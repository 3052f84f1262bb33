use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::hasher::{ContentHasher, Md5Hasher};
use crate::core::error::{SyncError, SyncResult};

/// Cache file kept at the top of the install root.
pub const CACHE_FILE_NAME: &str = "wwm_md5_cache.json";

/// Last verified hash of a file, valid while its mtime is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub mtime: DateTime<Utc>,
    pub md5: String,
}

#[derive(Debug, Default)]
struct CacheState {
    records: HashMap<String, CacheRecord>,
    dirty: bool,
}

/// Persistent `relative path -> (mtime, md5)` map.
///
/// Shared by every download worker of a session. The map is guarded by a
/// mutex; hashing happens outside it so workers never serialize on disk I/O.
pub struct IntegrityCache {
    root: PathBuf,
    cache_path: PathBuf,
    hasher: Arc<dyn ContentHasher>,
    /// `None` until first use.
    state: Mutex<Option<CacheState>>,
}

impl IntegrityCache {
    pub fn new(root: &Path) -> Self {
        Self::with_hasher(root, Arc::new(Md5Hasher))
    }

    pub fn with_hasher(root: &Path, hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            root: root.to_path_buf(),
            cache_path: root.join(CACHE_FILE_NAME),
            hasher,
            state: Mutex::new(None),
        }
    }

    /// Hash of `path`, served from the cache while the file's mtime matches
    /// the recorded one. Missing files yield `None` and leave no record.
    pub fn get(&self, path: &Path) -> SyncResult<Option<String>> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::io(path, e)),
        };
        let mtime: DateTime<Utc> = metadata
            .modified()
            .map_err(|e| SyncError::io(path, e))?
            .into();
        let key = self.key_for(path);

        {
            let state = self.lock();
            if let Some(record) = state.as_ref().and_then(|s| s.records.get(&key)) {
                if record.mtime == mtime {
                    return Ok(Some(record.md5.clone()));
                }
            }
        }

        debug!("Hashing {:?}", path);
        let md5 = self
            .hasher
            .hash_file(path)
            .map_err(|e| SyncError::io(path, e))?;

        let mut state = self.lock();
        if let Some(state) = state.as_mut() {
            state.records.insert(
                key,
                CacheRecord {
                    mtime,
                    md5: md5.clone(),
                },
            );
            state.dirty = true;
        }
        Ok(Some(md5))
    }

    /// Forget the record for `path`. Must follow every in-place rewrite of
    /// the file, since coarse mtimes could otherwise keep a stale hash alive.
    pub fn invalidate(&self, path: &Path) {
        let key = self.key_for(path);
        let mut state = self.lock();
        if let Some(state) = state.as_mut() {
            if state.records.remove(&key).is_some() {
                state.dirty = true;
            }
        }
    }

    /// Write the cache back to disk if anything changed this session.
    pub fn save(&self) -> SyncResult<()> {
        let mut state = self.lock();
        let Some(state) = state.as_mut() else {
            return Ok(());
        };
        if !state.dirty {
            return Ok(());
        }

        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&state.records)?;
        std::fs::write(&self.cache_path, json).map_err(|e| SyncError::io(&self.cache_path, e))?;
        state.dirty = false;

        debug!("Integrity cache saved ({} records)", state.records.len());
        Ok(())
    }

    /// Recorded entry for `path`, without touching the file.
    pub fn record(&self, path: &Path) -> Option<CacheRecord> {
        let key = self.key_for(path);
        self.lock()
            .as_ref()
            .and_then(|s| s.records.get(&key).cloned())
    }

    /// Key relative to the install root with forward slashes. Files outside
    /// the root are keyed by their bare file name.
    fn key_for(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }

    /// Lock the map, loading it from disk on first use.
    fn lock(&self) -> MutexGuard<'_, Option<CacheState>> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(CacheState {
                records: load_records(&self.cache_path),
                dirty: false,
            });
        }
        guard
    }
}

fn load_records(path: &Path) -> HashMap<String, CacheRecord> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(_) => return HashMap::new(),
    };
    match serde_json::from_slice(&raw) {
        Ok(records) => records,
        Err(e) => {
            warn!("Integrity cache {:?} is unreadable, starting empty: {}", path, e);
            HashMap::new()
        }
    }
}
