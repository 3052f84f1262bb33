pub mod servers;
pub mod settings;

pub use servers::{override_files, server_by_app_id, server_by_id, ServerConfig, SERVERS};
pub use settings::SyncSettings;
