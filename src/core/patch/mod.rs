pub mod apply;
pub mod staging;
pub mod tool;

pub use apply::ApplyReport;
pub use staging::{staging_root, PredownloadState, PATCH_SUFFIX, STAGING_DIR, STATE_FILE};
pub use tool::{HPatchTool, PatchTool};
