use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::core::cache::IntegrityCache;
use crate::core::config::SyncSettings;
use crate::core::error::{SyncError, SyncResult};
use crate::core::http::Transport;
use crate::core::progress::{ProgressSink, TaskId};

/// Suffix of in-progress downloads.
pub const TEMP_SUFFIX: &str = ".temp";

/// A single file to fetch into `dest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub dest: PathBuf,
    pub size: u64,
}

/// Outcome of a batch. Failed tasks keep their temp files for a later resume.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: Vec<(DownloadTask, SyncError)>,
    pub total_bytes: u64,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// `dest` with the temp suffix appended (`a.pak` -> `a.pak.temp`).
pub fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Concurrent, resumable downloader.
///
/// Each file streams into a sibling temp file, resuming with a range request
/// when a partial one exists, and is renamed into place once its size
/// matches the manifest.
pub struct Downloader {
    transport: Arc<dyn Transport>,
    cache: Arc<IntegrityCache>,
    progress: Arc<dyn ProgressSink>,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Downloader {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<IntegrityCache>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            transport,
            cache,
            progress,
            concurrency: 8,
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn with_settings(self, settings: &SyncSettings) -> Self {
        self.with_concurrency(settings.concurrency)
            .with_retry(settings.max_attempts, settings.retry_delay())
    }

    // ── Single file download ────────────────────────────

    /// Download one file with retries. `false` means every attempt failed.
    pub async fn download_one(&self, task: &DownloadTask) -> bool {
        match self.download_with_retry(task, None).await {
            Ok(()) => true,
            Err(e) => {
                error!("Download failed {:?}: {}", task.dest, e);
                false
            }
        }
    }

    async fn download_with_retry(
        &self,
        task: &DownloadTask,
        overall: Option<TaskId>,
    ) -> SyncResult<()> {
        if let Some(parent) = task.dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }

        let name = task
            .dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let id = self.progress.register(&name, task.size);
        let temp = temp_path_for(&task.dest);
        let mut reported = 0_u64;
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.attempt(task, &temp, id, overall, &mut reported).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    debug!(
                        "{} [attempt {}/{}]: {}",
                        task.url, attempt, self.max_attempts, e
                    );
                    last_error = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                }
            }
        }

        let result = match last_error {
            Some(e) => Err(e),
            None => self.finish(task, &temp).await,
        };
        self.progress.complete(id);
        result
    }

    /// One transfer attempt into `temp`. Succeeds once the temp file has
    /// exactly the expected size.
    async fn attempt(
        &self,
        task: &DownloadTask,
        temp: &Path,
        id: TaskId,
        overall: Option<TaskId>,
        reported: &mut u64,
    ) -> SyncResult<()> {
        let resume_from = match tokio::fs::metadata(temp).await {
            Ok(m) if m.len() == task.size => {
                self.report(id, overall, reported, task.size);
                return Ok(());
            }
            Ok(m) if m.len() > task.size => {
                // Appending can never shrink it back to the right size.
                tokio::fs::remove_file(temp)
                    .await
                    .map_err(|e| SyncError::io(temp, e))?;
                0
            }
            Ok(m) => m.len(),
            Err(_) => 0,
        };

        let response = self.transport.open(&task.url, resume_from).await?;
        if !response.is_success() {
            return Err(SyncError::DownloadFailed {
                url: task.url.clone(),
                status: response.status,
            });
        }

        // A server that ignores the range sends the whole file again.
        let append = resume_from > 0 && response.is_partial();
        let mut written = if append { resume_from } else { 0 };
        self.report(id, overall, reported, written);

        let mut options = tokio::fs::OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }

        // Write inside a block so the handle is closed before the size check
        // and the rename.
        {
            let mut file = options
                .open(temp)
                .await
                .map_err(|e| SyncError::io(temp, e))?;
            let mut body = response.body;
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| SyncError::io(temp, e))?;
                written += chunk.len() as u64;
                self.report(id, overall, reported, written);
            }
            file.flush().await.map_err(|e| SyncError::io(temp, e))?;
        }

        let actual = tokio::fs::metadata(temp)
            .await
            .map_err(|e| SyncError::io(temp, e))?
            .len();
        if actual != task.size {
            return Err(SyncError::SizeMismatch {
                path: task.dest.clone(),
                expected: task.size,
                actual,
            });
        }
        Ok(())
    }

    /// Move the completed temp file over the destination.
    async fn finish(&self, task: &DownloadTask, temp: &Path) -> SyncResult<()> {
        tokio::fs::rename(temp, &task.dest)
            .await
            .map_err(|e| SyncError::io(&task.dest, e))?;
        self.cache.invalidate(&task.dest);
        debug!("Downloaded: {} -> {:?}", task.url, task.dest);
        Ok(())
    }

    /// Advance per-task and aggregate progress up to `position` bytes.
    fn report(&self, id: TaskId, overall: Option<TaskId>, reported: &mut u64, position: u64) {
        if position <= *reported {
            return;
        }
        let delta = position - *reported;
        *reported = position;
        self.progress.advance(id, delta);
        if let Some(overall) = overall {
            self.progress.advance(overall, delta);
        }
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Download many files concurrently using `buffer_unordered`.
    ///
    /// Returns once every task succeeded or ran out of attempts; a failed
    /// task never stops its siblings.
    pub async fn download_all(&self, tasks: Vec<DownloadTask>) -> BatchReport {
        if tasks.is_empty() {
            info!("Nothing to download");
            return BatchReport::default();
        }

        let total_bytes: u64 = tasks.iter().map(|t| t.size).sum();
        info!(
            "Downloading {} files, {:.2} MB total, concurrency={}",
            tasks.len(),
            total_bytes as f64 / 1024.0 / 1024.0,
            self.concurrency
        );

        let overall = self.progress.register("Total Download", total_bytes);
        let results: Vec<_> = stream::iter(tasks)
            .map(|task| async move {
                let result = self.download_with_retry(&task, Some(overall)).await;
                (task, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        self.progress.complete(overall);

        let mut report = BatchReport {
            total_bytes,
            ..BatchReport::default()
        };
        for (task, result) in results {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    error!("Download failed {:?}: {}", task.dest, e);
                    report.failed.push((task, e));
                }
            }
        }

        if report.is_complete() {
            info!("Batch finished: {} files", report.succeeded);
        } else {
            warn!(
                "{} of {} files failed to download, run sync again to retry them",
                report.failed.len(),
                report.succeeded + report.failed.len()
            );
        }
        report
    }
}
