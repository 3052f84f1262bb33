pub mod marker;
pub mod plan;
pub mod predownload;
pub mod session;

pub use marker::{LocalVersion, LOCAL_VERSION_FILE};
pub use plan::{classify, plan_downloads, EntryState, VerifyMode};
pub use predownload::{PredownloadMode, PredownloadReport};
pub use session::{LocalStatus, SessionBuilder, SyncReport, SyncSession};
