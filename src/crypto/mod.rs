//! Crypto module: key management, signing, verification, digests.
//!
//! - Keys: generation, hex import/export
//! - Sign: Ed25519 detached signatures over canonical payloads
//! - Hash: SHA3-256 chain digest, SHA-256 for contracts

pub mod keys;
pub mod sign;
pub mod hash;

pub use keys::{Keypair, PublicKey};
pub use sign::{verify_hex, Signature, Signer, Verifier};
pub use hash::{hash_bytes, sha256_hex, sha3_256};
