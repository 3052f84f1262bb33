pub mod client;

pub use client::{temp_path_for, BatchReport, DownloadTask, Downloader, TEMP_SUFFIX};
