// ─── Pre-download ───
// Stages the next client version ahead of its release.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::session::SyncSession;
use crate::core::cache::IntegrityCache;
use crate::core::downloader::{BatchReport, DownloadTask};
use crate::core::error::{SyncError, SyncResult};
use crate::core::manifest::{resource_url, ManifestEntry, ResourceIndex};
use crate::core::patch::{staging_root, PredownloadState, PATCH_SUFFIX};

/// Version assumed when the install has no readable marker.
const UNKNOWN_LOCAL_VERSION: &str = "0.0.0";

/// How a pre-download was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredownloadMode {
    /// Binary deltas against the installed version.
    Incremental,
    /// Complete files of the new version.
    Full,
    /// The server advertises no pre-download.
    Unavailable,
}

#[derive(Debug)]
pub struct PredownloadReport {
    pub mode: PredownloadMode,
    pub target_version: Option<String>,
    /// Installed version the deltas apply to, in incremental mode.
    pub base_version: Option<String>,
    /// Why an advertised patch was not used.
    pub fallback_reason: Option<String>,
    pub queued: usize,
    /// Entries whose installed copy already matches the new version.
    pub skipped_installed: usize,
    pub skipped_bytes: u64,
    /// Entries fully staged by an earlier run.
    pub already_staged: usize,
    pub batch: BatchReport,
}

impl PredownloadReport {
    fn unavailable() -> Self {
        Self {
            mode: PredownloadMode::Unavailable,
            target_version: None,
            base_version: None,
            fallback_reason: None,
            queued: 0,
            skipped_installed: 0,
            skipped_bytes: 0,
            already_staged: 0,
            batch: BatchReport::default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.batch.is_complete()
    }
}

/// Entries left to stage after skipping what is already in place.
#[derive(Debug, Default)]
struct StagePlan {
    pending: Vec<(ManifestEntry, PathBuf)>,
    skipped_installed: usize,
    skipped_bytes: u64,
    already_staged: usize,
}

fn plan_staging(
    root: &Path,
    staging: &Path,
    entries: &[ManifestEntry],
    incremental: bool,
    cache: &IntegrityCache,
) -> StagePlan {
    let mut plan = StagePlan::default();
    for entry in entries {
        let rel = entry.relative_path();

        if !incremental && installed_matches(root, &rel, entry, cache) {
            plan.skipped_installed += 1;
            plan.skipped_bytes += entry.size;
            continue;
        }

        let staged = if incremental {
            staging.join(format!("{rel}{PATCH_SUFFIX}"))
        } else {
            staging.join(&rel)
        };
        if std::fs::metadata(&staged).is_ok_and(|m| m.is_file() && m.len() == entry.size) {
            plan.already_staged += 1;
            continue;
        }
        plan.pending.push((entry.clone(), staged));
    }
    plan
}

/// Installed copy has the new size and hash. Hashing only happens once the
/// size already matches.
fn installed_matches(root: &Path, rel: &str, entry: &ManifestEntry, cache: &IntegrityCache) -> bool {
    let path = root.join(rel);
    match std::fs::metadata(&path) {
        Ok(m) if m.is_file() && m.len() == entry.size => {}
        _ => return false,
    }
    match cache.get(&path) {
        Ok(Some(hash)) => hash.eq_ignore_ascii_case(&entry.md5),
        Ok(None) => false,
        Err(e) => {
            warn!("Cannot hash {:?}: {}", path, e);
            false
        }
    }
}

/// Remove staging left by a run for another version or in the other mode.
/// Staging without a marker is an interrupted run and is kept for resuming.
fn discard_stale_staging(staging: &Path, version: &str, is_patch: bool) -> SyncResult<()> {
    let reason = match PredownloadState::load(staging) {
        Ok(previous) if previous.version == version && previous.is_patch == is_patch => {
            return Ok(());
        }
        Ok(previous) => format!(
            "staged for {} (patch={}), now {} (patch={})",
            previous.version, previous.is_patch, version, is_patch
        ),
        Err(SyncError::NoStagedContent(_)) => return Ok(()),
        Err(e) => e.to_string(),
    };
    warn!("Discarding previous pre-download: {}", reason);
    std::fs::remove_dir_all(staging).map_err(|e| SyncError::io(staging, e))
}

impl SyncSession {
    /// Stage the advertised next version under `<root>/.predownload`.
    ///
    /// Deltas are fetched when a patch exists for the installed version, the
    /// patch tool is present and the patch index can be read; otherwise the
    /// complete new files are staged. The report names the mode used.
    pub async fn predownload(&mut self) -> SyncResult<PredownloadReport> {
        let info = self.resolver.launcher_info().await?;
        let Some(section) = info.predownload.as_ref() else {
            warn!("Server '{}' advertises no pre-download", self.server.id);
            return Ok(PredownloadReport::unavailable());
        };
        let cdn = self.resolver.cdn_node().await?;

        let local_version = match self.local_version() {
            Ok(Some(marker)) => marker.version,
            Ok(None) => UNKNOWN_LOCAL_VERSION.to_string(),
            Err(e) => {
                warn!("Cannot read local version: {}", e);
                UNKNOWN_LOCAL_VERSION.to_string()
            }
        };

        let mut fallback_reason = None;
        let mut incremental: Option<(String, ResourceIndex)> = None;
        if let Some(patch) = section.config.patch_for(&local_version) {
            if !self.patch_tool_available().await {
                warn!(
                    "Incremental update available but '{}' was not found; staging full files",
                    self.patch_tool.name()
                );
                fallback_reason = Some(format!("patch tool '{}' not found", self.patch_tool.name()));
            } else {
                info!("Incremental update path: {} -> {}", local_version, section.version);
                match self.resolver.patch_index(patch).await {
                    Ok(index) => incremental = Some((patch.base_url.clone(), index)),
                    Err(e) => {
                        warn!("Patch index unavailable, staging full files: {}", e);
                        fallback_reason = Some(format!("patch index unavailable: {e}"));
                    }
                }
            }
        }

        let (mode, base_path, index) = match incremental {
            Some((base_url, index)) => (PredownloadMode::Incremental, base_url, index),
            None => {
                let index = self.resolver.predownload_index().await?.ok_or_else(|| {
                    SyncError::MalformedManifest("pre-download section has no indexFile".into())
                })?;
                info!("Full pre-download (target version: {})", section.version);
                (PredownloadMode::Full, section.resources_base_path.clone(), index)
            }
        };
        let is_patch = mode == PredownloadMode::Incremental;

        let staging = staging_root(&self.root);
        discard_stale_staging(&staging, &section.version, is_patch)?;
        std::fs::create_dir_all(&staging).map_err(|e| SyncError::io(&staging, e))?;

        let plan = {
            let root = self.root.clone();
            let staging = staging.clone();
            let cache = self.cache.clone();
            tokio::task::spawn_blocking(move || {
                plan_staging(&root, &staging, &index.resource, is_patch, &cache)
            })
            .await
            .map_err(|e| SyncError::Other(format!("Task join error: {e}")))?
        };

        let tasks = plan
            .pending
            .iter()
            .map(|(entry, staged)| {
                let base = entry.from_folder.as_deref().unwrap_or(base_path.as_str());
                Ok(DownloadTask {
                    url: resource_url(&cdn, base, &entry.relative_path())?,
                    dest: staged.clone(),
                    size: entry.size,
                })
            })
            .collect::<SyncResult<Vec<_>>>()?;
        if let Some(first) = tasks.first() {
            debug!("First task URL: {}", first.url);
        }
        if plan.skipped_installed > 0 {
            info!(
                "{} files already up to date, {:.2} MB skipped",
                plan.skipped_installed,
                plan.skipped_bytes as f64 / 1024.0 / 1024.0
            );
        }

        let queued = tasks.len();
        let batch = self.downloader.download_all(tasks).await;
        if let Err(e) = self.cache.save() {
            warn!("Failed to save integrity cache: {}", e);
        }

        let base_version = is_patch.then(|| local_version.clone());
        PredownloadState {
            version: section.version.clone(),
            server: self.server.id.to_string(),
            is_patch,
            base_version: base_version.clone(),
        }
        .save(&staging)?;

        info!("Pre-download finished ({:?}, target {})", mode, section.version);
        Ok(PredownloadReport {
            mode,
            target_version: Some(section.version.clone()),
            base_version,
            fallback_reason,
            queued,
            skipped_installed: plan.skipped_installed,
            skipped_bytes: plan.skipped_bytes,
            already_staged: plan.already_staged,
            batch,
        })
    }
}
