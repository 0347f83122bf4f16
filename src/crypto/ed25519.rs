//! Ed25519 signatures in the RFC 9580 native encoding.
//!
//! Public keys are 32 raw octets and signatures 64 raw octets, with no MPI
//! framing. The legacy `EdDSALegacy` framing lives in [`crate::crypto::eddsa`].

use ed25519_dalek::{Signer as _, Verifier as _};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::Result;

const MIN_HASH_LEN_BITS: usize = 256;

/// Secret key for Ed25519.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SecretKey {
    #[debug("..")]
    secret: ed25519_dalek::SigningKey,
}

impl SecretKey {
    /// Generate an Ed25519 `SecretKey`.
    pub fn generate<R: Rng + CryptoRng>(mut rng: R) -> Self {
        let mut bytes = Zeroizing::new([0u8; ed25519_dalek::SECRET_KEY_LENGTH]);
        rng.fill_bytes(&mut *bytes);
        let secret = ed25519_dalek::SigningKey::from_bytes(&bytes);

        SecretKey { secret }
    }

    pub fn from_bytes(raw_secret: &[u8; 32]) -> Self {
        Self {
            secret: ed25519_dalek::SigningKey::from_bytes(raw_secret),
        }
    }

    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    pub fn public(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    pub fn sign(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<[u8; 64]> {
        check_hash(hash, digest)?;
        Ok(self.secret.sign(digest).to_bytes())
    }
}

fn check_hash(hash: HashAlgorithm, digest: &[u8]) -> Result<()> {
    let Some(digest_size) = hash.digest_size() else {
        unsupported_err!("EdDSA signature: invalid hash algorithm: {:?}", hash);
    };
    ensure_eq!(
        digest.len(),
        digest_size,
        "Unexpected digest length {} for hash algorithm {:?}",
        digest.len(),
        hash,
    );
    if digest_size * 8 < MIN_HASH_LEN_BITS {
        unsupported_err!(
            "EdDSA signature: hash algorithm {:?} is too weak for Ed25519",
            hash
        );
    }
    Ok(())
}

/// Verify an Ed25519 signature.
pub fn verify(public: &[u8; 32], hash: HashAlgorithm, hashed: &[u8], sig_bytes: &[u8]) -> Result<()> {
    check_hash(hash, hashed)?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(public)?;
    let sig = ed25519_dalek::Signature::from_slice(sig_bytes)?;

    Ok(key.verify(hashed, &sig)?)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_sign_verify() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let key = SecretKey::generate(&mut rng);
        let digest = HashAlgorithm::Sha256.digest(b"hello").unwrap();

        let sig = key.sign(HashAlgorithm::Sha256, &digest).unwrap();
        verify(&key.public(), HashAlgorithm::Sha256, &digest, &sig).unwrap();

        let other = HashAlgorithm::Sha256.digest(b"hellO").unwrap();
        assert!(verify(&key.public(), HashAlgorithm::Sha256, &other, &sig).is_err());
    }

    #[test]
    fn test_weak_hash_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let key = SecretKey::generate(&mut rng);
        let digest = HashAlgorithm::Sha1.digest(b"hello").unwrap();

        assert!(key.sign(HashAlgorithm::Sha1, &digest).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_roundtrip_secret_bytes() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let key = SecretKey::generate(&mut rng);
        let again = SecretKey::from_bytes(&key.to_bytes());
        assert_eq!(key, again);
    }
}
