//! Digest helpers. SHA3-256 is the chain digest (tx hashes, block hashes);
//! SHA-256 is only offered to contracts as a builtin.

use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Sha3};

pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Standard method for hashing bytes into a hex string
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(sha3_256(data))
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
