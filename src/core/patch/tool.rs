use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::debug;

use crate::core::error::{SyncError, SyncResult};

/// External binary-delta merger.
#[async_trait]
pub trait PatchTool: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the tool can be run at all.
    fn is_available(&self) -> bool;

    /// Rebuild `new` from `old` and `delta`. `Ok(false)` means the tool ran
    /// and reported failure; `new` may then hold partial output.
    async fn merge(&self, old: &Path, delta: &Path, new: &Path) -> SyncResult<bool>;
}

/// `hpatchz` (HDiffPatch) found on `PATH` or at an explicit location.
#[derive(Debug, Clone)]
pub struct HPatchTool {
    program: String,
}

impl HPatchTool {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl Default for HPatchTool {
    fn default() -> Self {
        Self::new("hpatchz")
    }
}

#[async_trait]
impl PatchTool for HPatchTool {
    fn name(&self) -> &str {
        &self.program
    }

    /// Probe with `-v`. Only a failure to spawn counts as absent; the exit
    /// code of the probe is irrelevant.
    fn is_available(&self) -> bool {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.arg("-v").stdout(Stdio::null()).stderr(Stdio::null());
        configure_platform_spawn(&mut cmd);
        match cmd.status() {
            Ok(_) => true,
            Err(e) => {
                debug!("Probe of '{}' failed: {}", self.program, e);
                false
            }
        }
    }

    async fn merge(&self, old: &Path, delta: &Path, new: &Path) -> SyncResult<bool> {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.arg("-f")
            .arg(old)
            .arg(delta)
            .arg(new)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        configure_platform_spawn(&mut cmd);
        debug!("Command: {:?}", cmd);

        let status = tokio::process::Command::from(cmd)
            .status()
            .await
            .map_err(|e| SyncError::PatchToolMissing(format!("{}: {}", self.program, e)))?;
        Ok(status.success())
    }
}

#[cfg(target_os = "windows")]
fn configure_platform_spawn(cmd: &mut std::process::Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(target_os = "windows"))]
fn configure_platform_spawn(_cmd: &mut std::process::Command) {}
