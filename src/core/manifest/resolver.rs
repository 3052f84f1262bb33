use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{error, info};

use super::links::join_url;
use super::model::{select_cdn, LauncherInfo, PatchDescriptor, ResourceIndex};
use crate::core::config::ServerConfig;
use crate::core::error::{SyncError, SyncResult};
use crate::core::http::Transport;

/// Resolve-once view of a server's remote state.
///
/// The launcher configuration, selected CDN node and file index are fetched
/// on first use and kept for the session; `invalidate` drops them so the
/// next access re-resolves (e.g. after an update was applied).
pub struct ManifestResolver {
    server: &'static ServerConfig,
    transport: Arc<dyn Transport>,
    launcher_info: Option<Arc<LauncherInfo>>,
    cdn_node: Option<String>,
    game_index: Option<Arc<ResourceIndex>>,
}

impl ManifestResolver {
    pub fn new(server: &'static ServerConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            server,
            transport,
            launcher_info: None,
            cdn_node: None,
            game_index: None,
        }
    }

    pub fn server(&self) -> &'static ServerConfig {
        self.server
    }

    /// Point the resolver at another server, dropping everything resolved
    /// for the previous one.
    pub fn set_server(&mut self, server: &'static ServerConfig) {
        if self.server.id != server.id {
            self.server = server;
            self.invalidate();
        }
    }

    pub fn invalidate(&mut self) {
        self.launcher_info = None;
        self.cdn_node = None;
        self.game_index = None;
    }

    /// Launcher configuration if it was already fetched this session.
    pub fn cached_launcher_info(&self) -> Option<Arc<LauncherInfo>> {
        self.launcher_info.clone()
    }

    pub async fn launcher_info(&mut self) -> SyncResult<Arc<LauncherInfo>> {
        if let Some(info) = &self.launcher_info {
            return Ok(info.clone());
        }
        info!("Fetching launcher configuration for '{}'...", self.server.id);
        let info: Arc<LauncherInfo> =
            Arc::new(fetch_json(self.transport.as_ref(), self.server.api_url).await?);
        self.launcher_info = Some(info.clone());
        Ok(info)
    }

    pub async fn cdn_node(&mut self) -> SyncResult<String> {
        if let Some(node) = &self.cdn_node {
            return Ok(node.clone());
        }
        let info = self.launcher_info().await?;
        let node = select_cdn(&info.default.cdn_list)?.url.clone();
        info!("Using CDN: {}", node);
        self.cdn_node = Some(node.clone());
        Ok(node)
    }

    /// File index of the released client.
    pub async fn game_index(&mut self) -> SyncResult<Arc<ResourceIndex>> {
        if let Some(index) = &self.game_index {
            return Ok(index.clone());
        }
        let info = self.launcher_info().await?;
        let cdn = self.cdn_node().await?;
        let url = join_url(&cdn, &info.default.config.index_file)?;
        info!("Fetching file index...");
        let index: Arc<ResourceIndex> =
            Arc::new(fetch_json(self.transport.as_ref(), &url).await?);
        info!("File index lists {} entries", index.resource.len());
        self.game_index = Some(index.clone());
        Ok(index)
    }

    /// Full file index of the advertised pre-download, if the server has one.
    pub async fn predownload_index(&mut self) -> SyncResult<Option<ResourceIndex>> {
        let info = self.launcher_info().await?;
        let Some(uri) = info
            .predownload
            .as_ref()
            .and_then(|p| p.config.index_file.as_deref())
        else {
            return Ok(None);
        };
        let url = join_url(&self.cdn_node().await?, uri)?;
        info!("Fetching pre-download file index (full)...");
        Ok(Some(fetch_json(self.transport.as_ref(), &url).await?))
    }

    /// Delta index of one incremental patch.
    pub async fn patch_index(&mut self, patch: &PatchDescriptor) -> SyncResult<ResourceIndex> {
        let url = join_url(&self.cdn_node().await?, &patch.index_file)?;
        info!("Fetching patch index for base {}...", patch.version);
        fetch_json(self.transport.as_ref(), &url).await
    }
}

/// GET + JSON decode. Every failure is reported as an unavailable manifest;
/// retrying is left to the caller.
async fn fetch_json<T: DeserializeOwned>(transport: &dyn Transport, url: &str) -> SyncResult<T> {
    let unavailable = |reason: String| {
        error!("Manifest request failed {}: {}", url, reason);
        SyncError::ManifestUnavailable {
            url: url.to_string(),
            reason,
        }
    };
    let bytes = transport
        .get_bytes(url)
        .await
        .map_err(|e| unavailable(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| unavailable(e.to_string()))
}
