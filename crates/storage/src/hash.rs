//! 64-bit content hashing.
//!
//! Content identity is xxHash3-64: fast, non-cryptographic, and stored as 8
//! big-endian bytes on the remote side. Two contents that collide are treated
//! as identical; there is no secondary verification.

use crate::error::{ErrorKind, Result};
use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;
use xxhash_rust::xxh3::{Xxh3, xxh3_64};

const READ_BUFFER: usize = 64 * 1024;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(u64);

impl ContentHash {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Hash an in-memory buffer.
    pub fn of(bytes: &[u8]) -> Self {
        Self(xxh3_64(bytes))
    }

    /// Stream a file through the hasher without loading it whole.
    pub async fn of_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = tokio::fs::File::open(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
        let mut hasher = Xxh3::new();
        let mut buffer = vec![0u8; READ_BUFFER];
        loop {
            let read = file.read(&mut buffer).await.map_err(|e| ErrorKind::from_io(e, path))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(Self(hasher.digest()))
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Storage form: 8 bytes, big-endian.
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Inverse of [`to_bytes`](Self::to_bytes); `None` unless exactly 8 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_be_bytes(array)))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_bytes_same_hash() {
        assert_eq!(ContentHash::of(b"hello"), ContentHash::of(b"hello"));
        assert_ne!(ContentHash::of(b"hello"), ContentHash::of(b"hello!"));
    }

    #[test]
    fn test_storage_form() {
        let hash = ContentHash::new(0x0102_0304_0506_0708);
        assert_eq!(hash.to_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(ContentHash::from_bytes(&hash.to_bytes()), Some(hash));
        assert_eq!(ContentHash::from_bytes(&[1, 2, 3]), None);
        assert_eq!(hash.to_string(), "0102030405060708");
    }

    #[tokio::test]
    async fn test_streamed_file_matches_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        // Larger than one read buffer so the streaming path is exercised.
        let data: Vec<u8> = (0..(READ_BUFFER * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();
        assert_eq!(ContentHash::of_file(&path).await.unwrap(), ContentHash::of(&data));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ContentHash::of_file(dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}
