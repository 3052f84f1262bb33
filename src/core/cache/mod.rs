pub mod hasher;
pub mod integrity;

pub use hasher::{ContentHasher, Md5Hasher};
pub use integrity::{CacheRecord, IntegrityCache, CACHE_FILE_NAME};
