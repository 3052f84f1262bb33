use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use super::marker::LocalVersion;
use super::plan::{plan_downloads, VerifyMode};
use crate::core::cache::{ContentHasher, IntegrityCache};
use crate::core::config::{server_by_app_id, server_by_id, ServerConfig, SyncSettings};
use crate::core::downloader::{DownloadTask, Downloader};
use crate::core::error::{SyncError, SyncResult};
use crate::core::http::{HttpTransport, Transport};
use crate::core::manifest::{resource_url, ManifestEntry, ManifestResolver};
use crate::core::patch::{HPatchTool, PatchTool};
use crate::core::progress::{LogProgress, ProgressSink};

/// Server assumed when an install carries no usable marker.
const FALLBACK_SERVER: &str = "cn";

/// Result of one synchronization pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Version declared by the manifest that was synced against.
    pub version: String,
    /// Manifest entries examined.
    pub checked: usize,
    /// Entries that needed a download.
    pub queued: usize,
    pub downloaded: usize,
    /// Destinations still missing or stale after the batch.
    pub failed: Vec<PathBuf>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What the local version marker says about an install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStatus {
    pub version: String,
    /// `None` when the recorded app id matches no known server.
    pub server: Option<&'static str>,
}

/// Assembles a [`SyncSession`], defaulting every collaborator that is not
/// supplied explicitly.
pub struct SessionBuilder {
    root: PathBuf,
    server_id: String,
    settings: SyncSettings,
    transport: Option<Arc<dyn Transport>>,
    progress: Option<Arc<dyn ProgressSink>>,
    patch_tool: Option<Arc<dyn PatchTool>>,
    hasher: Option<Arc<dyn ContentHasher>>,
}

impl SessionBuilder {
    pub fn new(root: &Path, server_id: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            server_id: server_id.to_string(),
            settings: SyncSettings::default(),
            transport: None,
            progress: None,
            patch_tool: None,
            hasher: None,
        }
    }

    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn patch_tool(mut self, patch_tool: Arc<dyn PatchTool>) -> Self {
        self.patch_tool = Some(patch_tool);
        self
    }

    pub fn hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn build(self) -> SyncResult<SyncSession> {
        let server = server_by_id(&self.server_id)
            .ok_or_else(|| SyncError::UnknownServer(self.server_id.clone()))?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.settings)?),
        };
        let progress = self
            .progress
            .unwrap_or_else(|| Arc::new(LogProgress::default()));
        let patch_tool = self
            .patch_tool
            .unwrap_or_else(|| Arc::new(HPatchTool::new(&self.settings.patch_tool)));
        let cache = Arc::new(match self.hasher {
            Some(hasher) => IntegrityCache::with_hasher(&self.root, hasher),
            None => IntegrityCache::new(&self.root),
        });
        let downloader = Downloader::new(transport.clone(), cache.clone(), progress)
            .with_settings(&self.settings);

        Ok(SyncSession {
            resolver: ManifestResolver::new(server, transport),
            root: self.root,
            server,
            settings: self.settings,
            cache,
            downloader,
            patch_tool,
            tool_available: OnceLock::new(),
        })
    }
}

/// One synchronization session over an install root.
///
/// Owns the integrity cache (single writer of its records), the manifest
/// resolver and the downloader. One session per install root at a time.
pub struct SyncSession {
    pub(crate) root: PathBuf,
    pub(crate) server: &'static ServerConfig,
    pub(crate) settings: SyncSettings,
    pub(crate) resolver: ManifestResolver,
    pub(crate) cache: Arc<IntegrityCache>,
    pub(crate) downloader: Downloader,
    pub(crate) patch_tool: Arc<dyn PatchTool>,
    tool_available: OnceLock<bool>,
}

impl SyncSession {
    /// Session with the real HTTP transport and patch tool.
    pub fn new(root: &Path, server_id: &str) -> SyncResult<Self> {
        SessionBuilder::new(root, server_id).build()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn server(&self) -> &'static ServerConfig {
        self.server
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<IntegrityCache> {
        &self.cache
    }

    pub fn resolver(&mut self) -> &mut ManifestResolver {
        &mut self.resolver
    }

    /// Whether the external patch tool can be run. Probed once per session,
    /// off the async runtime.
    pub async fn patch_tool_available(&self) -> bool {
        if let Some(available) = self.tool_available.get() {
            return *available;
        }
        let tool = self.patch_tool.clone();
        let available = tokio::task::spawn_blocking(move || tool.is_available())
            .await
            .unwrap_or_else(|e| {
                warn!("Patch tool probe task failed: {}", e);
                false
            });
        debug!(
            "Patch tool '{}' {}",
            self.patch_tool.name(),
            if available { "found" } else { "not found" }
        );
        *self.tool_available.get_or_init(|| available)
    }

    // ── Local state ─────────────────────────────────────

    pub fn local_version(&self) -> SyncResult<Option<LocalVersion>> {
        LocalVersion::load(&self.root)
    }

    /// Installed version and server according to the local marker.
    pub fn status(&self) -> SyncResult<Option<LocalStatus>> {
        Ok(self.local_version()?.map(|marker| LocalStatus {
            server: server_by_app_id(&marker.app_id).map(|s| s.id),
            version: marker.version,
        }))
    }

    /// Server recorded in the install's marker, or the default server when
    /// there is none or it cannot be read.
    pub fn detect_server(root: &Path) -> &'static str {
        match LocalVersion::load(root) {
            Ok(Some(marker)) => server_by_app_id(&marker.app_id)
                .map(|s| s.id)
                .unwrap_or(FALLBACK_SERVER),
            Ok(None) => FALLBACK_SERVER,
            Err(e) => {
                warn!("Cannot read local version marker: {}", e);
                FALLBACK_SERVER
            }
        }
    }

    /// Record `version` for the session's server, keeping foreign fields of
    /// an existing marker.
    pub(crate) fn write_local_version(&self, version: &str) -> SyncResult<()> {
        let mut marker = match LocalVersion::load(&self.root) {
            Ok(Some(marker)) => marker,
            Ok(None) => LocalVersion::new(version, self.server.app_id),
            Err(e) => {
                warn!("Replacing unreadable version marker: {}", e);
                LocalVersion::new(version, self.server.app_id)
            }
        };
        marker.version = version.to_string();
        marker.app_id = self.server.app_id.to_string();
        marker.save(&self.root)?;
        info!("Local config updated: {} ({})", self.server.id, version);
        Ok(())
    }

    // ── Synchronization ─────────────────────────────────

    /// Bring the install in line with the released manifest.
    ///
    /// The cache and the version marker are written even when some files
    /// failed; running sync again retries exactly the files still off.
    pub async fn sync_files(&mut self, mode: VerifyMode) -> SyncResult<SyncReport> {
        let info = self.resolver.launcher_info().await?;
        let cdn = self.resolver.cdn_node().await?;
        let index = self.resolver.game_index().await?;

        info!("Verifying {} files ({:?})...", index.resource.len(), mode);
        let pending = {
            let root = self.root.clone();
            let cache = self.cache.clone();
            let index = index.clone();
            tokio::task::spawn_blocking(move || {
                plan_downloads(&root, &index.resource, mode, &cache)
            })
            .await
            .map_err(|e| SyncError::Other(format!("Task join error: {e}")))?
        };

        let base = &info.default.resources_base_path;
        let tasks = pending
            .iter()
            .map(|entry| self.build_task(&cdn, base, entry))
            .collect::<SyncResult<Vec<_>>>()?;

        let mut report = SyncReport {
            version: info.default.version.clone(),
            checked: index.resource.len(),
            queued: tasks.len(),
            ..SyncReport::default()
        };

        if tasks.is_empty() {
            info!("All files verified, nothing to download.");
        } else {
            let batch = self.downloader.download_all(tasks).await;
            report.downloaded = batch.succeeded;
            report.failed = batch.failed.into_iter().map(|(task, _)| task.dest).collect();
        }

        if let Err(e) = self.cache.save() {
            warn!("Failed to save integrity cache: {}", e);
        }
        self.write_local_version(&info.default.version)?;
        Ok(report)
    }

    /// Initial install: fetch everything missing or of the wrong size.
    pub async fn download_full(&mut self) -> SyncResult<SyncReport> {
        self.sync_files(VerifyMode::Fast).await
    }

    pub(crate) fn build_task(
        &self,
        cdn: &str,
        base_path: &str,
        entry: &ManifestEntry,
    ) -> SyncResult<DownloadTask> {
        let rel = entry.relative_path();
        Ok(DownloadTask {
            url: resource_url(cdn, base_path, &rel)?,
            dest: self.root.join(&rel),
            size: entry.size,
        })
    }
}
