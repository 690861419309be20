//! Hashing helpers shared by the state digests.
//!
//! All consensus digests are sha3-256 over an explicit byte layout; callers
//! build the layout, this module only hashes it.

use sha3::{Digest, Sha3_256};

/// Width of every identifier slot in a digest layout.
pub const ID_WIDTH: usize = 32;

/// compute sha3-256 raw bytes (32 bytes)
pub fn sha3_256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// compute sha3-256 hex string of bytes
pub fn sha3_256_hex(data: &[u8]) -> String {
    hex::encode(sha3_256_bytes(data))
}

/// Copies an identifier into a fixed 32-byte slot: longer identifiers are
/// truncated, shorter ones zero-padded.
pub fn id_slot(id: &str) -> [u8; ID_WIDTH] {
    let mut slot = [0u8; ID_WIDTH];
    let bytes = id.as_bytes();
    let n = bytes.len().min(ID_WIDTH);
    slot[..n].copy_from_slice(&bytes[..n]);
    slot
}
