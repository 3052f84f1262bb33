use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the synchronization engine.
/// Every module returns `Result<T, SyncError>`.
#[derive(Debug, Error)]
pub enum SyncError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Size mismatch for {path:?}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    // ── Manifest ────────────────────────────────────────
    #[error("Manifest unavailable at {url}: {reason}")]
    ManifestUnavailable { url: String, reason: String },

    #[error("No eligible CDN node in launcher configuration")]
    NoEligibleCdn,

    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    // ── Configuration ───────────────────────────────────
    #[error("Unknown server: {0}")]
    UnknownServer(String),

    #[error("Patch tool '{0}' is required for staged deltas but was not found")]
    PatchToolMissing(String),

    // ── Staged state ────────────────────────────────────
    #[error("No staged pre-download content under {0:?}")]
    NoStagedContent(PathBuf),

    #[error("Corrupt state file {path:?}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type SyncResult<T> = Result<T, SyncError>;

impl From<std::io::Error> for SyncError {
    fn from(source: std::io::Error) -> Self {
        SyncError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl SyncError {
    /// Wraps an IO error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }
}
