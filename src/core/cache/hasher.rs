use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

/// Files are hashed in chunks of this size so large paks never sit in memory.
const HASH_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Hashing primitive behind the integrity cache.
pub trait ContentHasher: Send + Sync {
    /// Lowercase hex digest of the file's bytes.
    fn hash_file(&self, path: &Path) -> std::io::Result<String>;
}

/// MD5, the digest used by the CDN manifests. Only accidental corruption
/// has to be detected, not tampering.
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5Hasher;

impl ContentHasher for Md5Hasher {
    fn hash_file(&self, path: &Path) -> std::io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Md5::new();
        let mut buffer = vec![0_u8; HASH_CHUNK_SIZE];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();

        assert_eq!(
            Md5Hasher.hash_file(&path).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }
}
