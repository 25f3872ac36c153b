//! Stable hashing for partition assignment.
//!
//! SHA-256 keeps assignments identical across processes and restarts, which
//! `std`'s randomly keyed hashers do not.

use crate::core::StreamDescriptor;
use sha2::{Digest, Sha256};

/// Hashes the given fields, length-prefixing each so field boundaries matter.
pub(crate) fn stable_hash<I, B>(fields: I) -> u64
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for field in fields {
        let bytes = field.as_ref();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

pub(crate) fn stream_hash(stream: &StreamDescriptor) -> u64 {
    // The leading tag keeps `None` apart from `Some("")`.
    match &stream.namespace {
        Some(ns) => stable_hash([b"ns".as_slice(), ns.as_bytes(), stream.name.as_bytes()]),
        None => stable_hash([b"".as_slice(), stream.name.as_bytes()]),
    }
}

/// Maps a hash onto `0..num_parts`.
pub(crate) fn bucket(hash: u64, num_parts: usize) -> usize {
    if num_parts <= 1 {
        return 0;
    }
    (hash % num_parts as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_hash_is_deterministic() {
        assert_eq!(stable_hash(["a", "b"]), stable_hash(["a", "b"]));
        assert_ne!(stable_hash(["ab", ""]), stable_hash(["a", "b"]));
    }

    #[test]
    fn test_namespace_changes_hash() {
        let plain = StreamDescriptor::new("users");
        let scoped = StreamDescriptor::new("users").with_namespace("public");
        assert_ne!(stream_hash(&plain), stream_hash(&scoped));
    }

    #[test]
    fn test_empty_namespace_differs_from_none() {
        let plain = StreamDescriptor::new("users");
        let empty = StreamDescriptor::new("users").with_namespace("");
        assert_ne!(stream_hash(&plain), stream_hash(&empty));
    }

    #[test]
    fn test_bucket_range() {
        for hash in [0, 1, 7, u64::MAX] {
            assert!(bucket(hash, 5) < 5);
            assert_eq!(bucket(hash, 1), 0);
            assert_eq!(bucket(hash, 0), 0);
        }
    }
}
