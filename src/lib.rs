pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::config::{ServerConfig, SyncSettings, SERVERS};
pub use crate::core::error::{SyncError, SyncResult};
pub use crate::core::patch::{ApplyReport, HPatchTool, PatchTool};
pub use crate::core::progress::{LogProgress, NoopProgress, ProgressSink};
pub use crate::core::sync::{
    LocalStatus, PredownloadMode, PredownloadReport, SessionBuilder, SyncReport, SyncSession,
    VerifyMode,
};
pub use crate::core::variant::CheckoutReport;

/// Install the structured logging subscriber. `RUST_LOG` overrides the
/// default filter. Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,wavesync_lib=debug")),
        )
        .try_init();
}
