// ─── WaveSync Core ───
// Asset synchronization engine for a game client install tree.
//
// Architecture:
//   core/
//     config/     — Server catalog, variant overrides, tunables
//     manifest/   — Launcher + index documents, CDN selection, URL joining
//     cache/      — Persistent mtime-keyed MD5 cache
//     downloader/ — Concurrent resumable downloads with size validation
//     sync/       — Diff planning, sync session, pre-download staging
//     patch/      — Staged update application through hpatchz
//     variant     — Server variant switch
//     http        — reqwest transport behind a trait
//     progress    — Progress event sink

pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod manifest;
pub mod patch;
pub mod progress;
pub mod sync;
pub mod variant;

#[cfg(test)]
pub mod testing;
