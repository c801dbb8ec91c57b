use ed25519_dalek::{Signature as DalekSig, Signer as DalekSigner, Verifier as DalekVerifier};
use anyhow::{Result, anyhow};
use crate::crypto::{Keypair, PublicKey};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 64] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("signature must be 64 bytes, got {}", bytes.len()))?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Trait for signing
pub trait Signer {
    fn sign(&self, msg: &[u8]) -> Signature;
}

/// Trait for verifying
pub trait Verifier {
    fn verify(&self, msg: &[u8], sig: &Signature) -> Result<()>;
}

impl Signer for Keypair {
    fn sign(&self, msg: &[u8]) -> Signature {
        let sig = self.signing.sign(msg);
        Signature(sig.to_bytes())
    }
}

impl Verifier for PublicKey {
    fn verify(&self, msg: &[u8], sig: &Signature) -> Result<()> {
        let pk = self.verifying_key()?;
        let ds = DalekSig::from_bytes(&sig.0);
        pk.verify(msg, &ds).map_err(|_| anyhow!("signature verification failed"))
    }
}

/// Verify a detached signature given hex-encoded key and signature.
/// Any decoding problem counts as a failed verification.
pub fn verify_hex(public_hex: &str, signature_hex: &str, msg: &[u8]) -> bool {
    let pk = match PublicKey::from_hex(public_hex) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let sig = match Signature::from_hex(signature_hex) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    pk.verify(msg, &sig).is_ok()
}
