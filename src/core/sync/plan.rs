// ─── Diff Planning ───
// Classifies manifest entries against the files on disk.

use std::path::Path;

use tracing::warn;

use crate::core::cache::IntegrityCache;
use crate::core::manifest::ManifestEntry;

/// How thoroughly local files are compared with the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Existence and size only. A corrupted file of the right size passes.
    Fast,
    /// Existence and MD5 through the integrity cache.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    UpToDate,
    NeedsDownload,
}

/// Decide whether `entry` has to be fetched again.
pub fn classify(
    root: &Path,
    entry: &ManifestEntry,
    mode: VerifyMode,
    cache: &IntegrityCache,
) -> EntryState {
    let dest = root.join(entry.relative_path());
    let metadata = match std::fs::metadata(&dest) {
        Ok(m) if m.is_file() => m,
        _ => return EntryState::NeedsDownload,
    };

    let up_to_date = match mode {
        VerifyMode::Fast => metadata.len() == entry.size,
        VerifyMode::Full => match cache.get(&dest) {
            Ok(Some(hash)) => hash.eq_ignore_ascii_case(&entry.md5),
            Ok(None) => false,
            Err(e) => {
                warn!("Cannot hash {:?}, scheduling download: {}", dest, e);
                false
            }
        },
    };

    if up_to_date {
        EntryState::UpToDate
    } else {
        EntryState::NeedsDownload
    }
}

/// Entries of `entries` that need a download, in manifest order.
pub fn plan_downloads(
    root: &Path,
    entries: &[ManifestEntry],
    mode: VerifyMode,
    cache: &IntegrityCache,
) -> Vec<ManifestEntry> {
    entries
        .iter()
        .filter(|entry| classify(root, entry, mode, cache) == EntryState::NeedsDownload)
        .cloned()
        .collect()
}
