use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Serialize, Deserialize};
use anyhow::{Result, anyhow};

/// Raw ed25519 public key; transactions carry it hex-encoded as `sender`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("public key must be 32 bytes, got {}", bytes.len()))?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub(crate) fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| anyhow!("invalid public key: {}", e))
    }
}

#[derive(Clone)]
pub struct Keypair {
    pub(crate) signing: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self { signing: SigningKey::generate(&mut OsRng) }
    }

    /// Construct from the 32 secret bytes
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = secret
            .try_into()
            .map_err(|_| anyhow!("secret key must be 32 bytes, got {}", secret.len()))?;
        Ok(Self { signing: SigningKey::from_bytes(&arr) })
    }

    pub fn from_hex(secret: &str) -> Result<Self> {
        Self::from_bytes(&hex::decode(secret)?)
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    pub fn public_hex(&self) -> String {
        self.public().to_hex()
    }

    /// Export secret as bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_restores_from_secret() {
        let kp = Keypair::generate();
        let restored = Keypair::from_hex(&hex::encode(kp.secret_bytes())).unwrap();
        assert_eq!(kp.public(), restored.public());
        assert_eq!(PublicKey::from_hex(&kp.public_hex()).unwrap(), kp.public());
    }

    #[test]
    fn test_bad_lengths_rejected() {
        assert!(Keypair::from_bytes(&[1u8; 31]).is_err());
        assert!(PublicKey::from_hex("abcd").is_err());
        assert!(PublicKey::from_hex("not hex").is_err());
    }
}
