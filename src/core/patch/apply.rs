// ─── Update Application ───
// Turns staged pre-download content into the installed version.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::staging::{staged_files, staging_root, PredownloadState, PATCH_SUFFIX};
use crate::core::error::{SyncError, SyncResult};
use crate::core::sync::{SyncReport, SyncSession, VerifyMode};

const MERGE_SUFFIX: &str = ".new";

/// Outcome of applying a staged update.
#[derive(Debug)]
pub struct ApplyReport {
    pub target_version: String,
    /// Complete files moved into place.
    pub moved: usize,
    /// Deltas merged into their base file.
    pub patched: usize,
    /// Deltas not applied: their base file was missing, or they were staged
    /// alongside full files.
    pub skipped: Vec<String>,
    /// Deltas the tool failed to merge; the old file was kept.
    pub failed: Vec<String>,
    /// Integrity pass run after applying.
    pub sync: SyncReport,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn ensure_parent(path: &Path) -> SyncResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
    }
    Ok(())
}

impl SyncSession {
    /// Apply the staged pre-download, then verify the whole install.
    ///
    /// Per-file merge problems are reported, not raised; the closing full
    /// sync repairs whatever is still off.
    pub async fn apply_predownload(&mut self) -> SyncResult<ApplyReport> {
        let staging = staging_root(&self.root);
        let state = PredownloadState::load(&staging)?;
        info!("Applying update (target version: {})...", state.version);

        if state.is_patch {
            if !self.patch_tool_available().await {
                return Err(SyncError::PatchToolMissing(self.patch_tool.name().to_string()));
            }
            info!("Merging staged deltas, this may take a while...");
        }

        let mut report = ApplyReport {
            target_version: state.version.clone(),
            moved: 0,
            patched: 0,
            skipped: Vec::new(),
            failed: Vec::new(),
            sync: SyncReport::default(),
        };

        for rel in staged_files(&staging)? {
            let staged = staging.join(&rel);
            match rel.strip_suffix(PATCH_SUFFIX).filter(|_| state.is_patch) {
                Some(origin) => self.merge_delta(origin, &staged, &mut report).await?,
                None if rel.ends_with(PATCH_SUFFIX) => {
                    warn!("Ignoring delta staged alongside full files: {}", rel);
                    report.skipped.push(rel.clone());
                }
                None => {
                    let dest = self.root.join(&rel);
                    ensure_parent(&dest)?;
                    std::fs::rename(&staged, &dest).map_err(|e| SyncError::io(&dest, e))?;
                    self.cache.invalidate(&dest);
                    report.moved += 1;
                }
            }
        }
        info!(
            "Merged {} deltas, moved {} files",
            report.patched, report.moved
        );

        std::fs::remove_dir_all(&staging).map_err(|e| SyncError::io(&staging, e))?;
        self.write_local_version(&state.version)?;
        self.resolver.invalidate();

        info!("Running final integrity check...");
        report.sync = self.sync_files(VerifyMode::Full).await?;
        info!("Update complete, current version: {}", report.sync.version);
        Ok(report)
    }

    async fn merge_delta(
        &self,
        origin: &str,
        delta: &Path,
        report: &mut ApplyReport,
    ) -> SyncResult<()> {
        let old = self.root.join(origin);
        if !old.is_file() {
            warn!("Base file missing, cannot patch: {}", origin);
            report.skipped.push(origin.to_string());
            return Ok(());
        }

        let new = with_suffix(&old, MERGE_SUFFIX);
        ensure_parent(&new)?;
        debug!("Patching: {}", origin);

        let merged = match self.patch_tool.merge(&old, delta, &new).await {
            Ok(merged) => merged,
            Err(e) => {
                error!("Patch tool failed on {}: {}", origin, e);
                false
            }
        };

        if merged {
            std::fs::rename(&new, &old).map_err(|e| SyncError::io(&old, e))?;
            self.cache.invalidate(&old);
            report.patched += 1;
        } else {
            error!("Patch merge failed: {}", origin);
            if new.exists() {
                std::fs::remove_file(&new).map_err(|e| SyncError::io(&new, e))?;
            }
            report.failed.push(origin.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::config::server_by_id;
    use crate::core::patch::STATE_FILE;
    use crate::core::sync::LocalVersion;
    use crate::core::testing::{
        index_json, launcher_json, session, write_file, FakeTransport, ScriptedPatchTool, CDN,
    };

    /// Server already released 1.1.0 with the given files.
    fn release(transport: &FakeTransport, files: &[(&str, &[u8])], served: &[&str]) {
        let server = server_by_id("cn").unwrap();
        transport.serve(server.api_url, launcher_json("1.1.0", None));
        transport.serve(&format!("{CDN}index.json"), index_json(files));
        for (dest, data) in files {
            if served.contains(dest) {
                transport.serve(&format!("{CDN}res/{dest}"), data.to_vec());
            }
        }
    }

    fn stage(root: &Path, is_patch: bool, files: &[(&str, &[u8])]) {
        let staging = staging_root(root);
        for (rel, data) in files {
            write_file(&staging, rel, data);
        }
        PredownloadState {
            version: "1.1.0".into(),
            server: "cn".into(),
            is_patch,
            base_version: is_patch.then(|| "1.0.0".to_string()),
        }
        .save(&staging)
        .unwrap();
    }

    #[tokio::test]
    async fn staged_full_files_replace_the_install() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::default());
        release(&transport, &[("Client/a.bin", b"new a")], &[]);
        write_file(dir.path(), "Client/a.bin", b"old");
        LocalVersion::new("1.0.0", "10003").save(dir.path()).unwrap();
        stage(dir.path(), false, &[("Client/a.bin", b"new a")]);
        let mut session = session(
            dir.path(),
            "cn",
            transport,
            Arc::new(ScriptedPatchTool::missing()),
        );

        let report = session.apply_predownload().await.unwrap();
        assert_eq!(report.moved, 1);
        assert_eq!(report.sync.queued, 0);
        assert_eq!(std::fs::read(dir.path().join("Client/a.bin")).unwrap(), b"new a");
        assert!(!staging_root(dir.path()).exists());
        assert_eq!(session.local_version().unwrap().unwrap().version, "1.1.0");
    }

    #[tokio::test]
    async fn stray_delta_in_full_staging_is_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::default());
        release(&transport, &[("b.bin", b"new b")], &[]);
        stage(
            dir.path(),
            false,
            &[("a.bin.hpatch", b"stale delta"), ("b.bin", b"new b")],
        );
        let mut session = session(
            dir.path(),
            "cn",
            transport,
            Arc::new(ScriptedPatchTool::missing()),
        );

        let report = session.apply_predownload().await.unwrap();
        assert_eq!(report.moved, 1);
        assert_eq!(report.skipped, vec!["a.bin.hpatch".to_string()]);
        assert!(!dir.path().join("a.bin.hpatch").exists());
        assert!(!staging_root(dir.path()).exists());
    }

    #[tokio::test]
    async fn delta_without_base_is_skipped_and_repaired_by_final_sync() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::default());
        release(
            &transport,
            &[("a.bin", b"merged a"), ("c.bin", b"fresh c")],
            &["c.bin"],
        );
        write_file(dir.path(), "a.bin", b"old a");
        stage(
            dir.path(),
            true,
            &[("a.bin.hpatch", b"merged a"), ("c.bin.hpatch", b"delta c")],
        );
        let tool = Arc::new(ScriptedPatchTool::available());
        let mut session = session(dir.path(), "cn", transport, tool.clone());

        let report = session.apply_predownload().await.unwrap();
        assert_eq!(report.patched, 1);
        assert_eq!(report.skipped, vec!["c.bin".to_string()]);
        assert_eq!(tool.merges(), vec![dir.path().join("a.bin")]);
        assert_eq!(std::fs::read(dir.path().join("a.bin")).unwrap(), b"merged a");

        assert_eq!(report.sync.downloaded, 1);
        assert_eq!(std::fs::read(dir.path().join("c.bin")).unwrap(), b"fresh c");
    }

    #[tokio::test]
    async fn failed_merge_discards_output_and_keeps_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::default());
        // The repair download is not served either, so the old file survives.
        release(&transport, &[("a.bin", b"merged a")], &[]);
        write_file(dir.path(), "a.bin", b"old a");
        stage(dir.path(), true, &[("a.bin.hpatch", b"merged a")]);
        let tool = Arc::new(ScriptedPatchTool::available().failing_on("a.bin"));
        let mut session = session(dir.path(), "cn", transport, tool);

        let report = session.apply_predownload().await.unwrap();
        assert_eq!(report.failed, vec!["a.bin".to_string()]);
        assert!(!dir.path().join("a.bin.new").exists());
        assert_eq!(std::fs::read(dir.path().join("a.bin")).unwrap(), b"old a");
        assert_eq!(report.sync.failed, vec![dir.path().join("a.bin")]);
    }

    #[tokio::test]
    async fn staged_deltas_require_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        stage(dir.path(), true, &[("a.bin.hpatch", b"d")]);
        let mut session = session(
            dir.path(),
            "cn",
            Arc::new(FakeTransport::default()),
            Arc::new(ScriptedPatchTool::missing()),
        );

        assert!(matches!(
            session.apply_predownload().await,
            Err(SyncError::PatchToolMissing(_))
        ));
        assert!(staging_root(dir.path()).join("a.bin.hpatch").exists());
    }

    #[tokio::test]
    async fn nothing_staged_or_corrupt_marker_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(
            dir.path(),
            "cn",
            Arc::new(FakeTransport::default()),
            Arc::new(ScriptedPatchTool::available()),
        );
        assert!(matches!(
            session.apply_predownload().await,
            Err(SyncError::NoStagedContent(_))
        ));

        write_file(&staging_root(dir.path()), STATE_FILE, b"garbage");
        assert!(matches!(
            session.apply_predownload().await,
            Err(SyncError::CorruptState { .. })
        ));
    }
}
