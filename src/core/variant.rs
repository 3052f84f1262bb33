// ─── Variant Switch ───
// Moves one install tree between server variants by parking the override
// files of inactive variants under a `.bak` suffix.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::config::servers::VARIANT_OVERRIDES;
use crate::core::config::{override_files, server_by_id};
use crate::core::error::{SyncError, SyncResult};
use crate::core::sync::{LocalVersion, SyncReport, SyncSession, VerifyMode};

const BACKUP_SUFFIX: &str = ".bak";

#[derive(Debug)]
pub struct CheckoutReport {
    /// Override files of the target found neither active nor parked.
    pub missing: Vec<String>,
    /// Present when a sync ran to fetch missing files or on request.
    pub sync: Option<SyncReport>,
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

impl SyncSession {
    /// Switch the install to `target`.
    ///
    /// Every active override file is parked first, then the target's set is
    /// restored. A full sync follows when any target file was missing or
    /// `force_sync` is set.
    pub async fn checkout(&mut self, target: &str, force_sync: bool) -> SyncResult<CheckoutReport> {
        let server =
            server_by_id(target).ok_or_else(|| SyncError::UnknownServer(target.to_string()))?;
        info!("Switching install to '{}'...", server.id);

        for (_, files) in VARIANT_OVERRIDES {
            for rel in files.iter() {
                let active = self.root.join(rel);
                if active.is_file() {
                    let parked = backup_path(&active);
                    std::fs::rename(&active, &parked).map_err(|e| SyncError::io(&active, e))?;
                    self.cache.invalidate(&active);
                    debug!("Parked {}", rel);
                }
            }
        }

        let mut missing = Vec::new();
        for rel in override_files(server.id) {
            let active = self.root.join(rel);
            let parked = backup_path(&active);
            if parked.is_file() {
                std::fs::rename(&parked, &active).map_err(|e| SyncError::io(&parked, e))?;
                self.cache.invalidate(&active);
                debug!("Restored {}", rel);
            } else if !active.is_file() {
                missing.push(rel.to_string());
            }
        }

        self.server = server;
        self.resolver.set_server(server);
        if let Err(e) = self.mark_server() {
            warn!("Could not update local version marker: {}", e);
        }

        let sync = if !missing.is_empty() || force_sync {
            info!(
                "{} override files missing (force_sync={}), synchronizing...",
                missing.len(),
                force_sync
            );
            Some(self.sync_files(VerifyMode::Full).await?)
        } else {
            None
        };

        Ok(CheckoutReport { missing, sync })
    }

    /// Record the session's server in an existing marker, keeping its version.
    fn mark_server(&self) -> SyncResult<()> {
        match LocalVersion::load(&self.root)? {
            Some(mut marker) => {
                marker.app_id = self.server.app_id.to_string();
                marker.save(&self.root)
            }
            None => Ok(()),
        }
    }
}
