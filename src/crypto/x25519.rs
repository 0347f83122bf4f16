use hkdf::Hkdf;
use log::debug;
use rand::{CryptoRng, Rng};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::aes_kw;
use crate::errors::{Error, Result};

/// Secret key for X25519
#[derive(Clone, derive_more::Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    #[debug("..")]
    pub(crate) secret: [u8; 32],
}

impl SecretKey {
    /// Generate an X25519 key pair, returning the secret and the public point.
    pub fn generate<R: Rng + CryptoRng>(mut rng: R) -> (Self, [u8; 32]) {
        let mut secret_key_bytes = Zeroizing::new([0u8; 32]);
        rng.fill_bytes(&mut *secret_key_bytes);

        let secret = StaticSecret::from(*secret_key_bytes);
        let public = PublicKey::from(&secret).to_bytes();

        (
            Self {
                secret: secret.to_bytes(),
            },
            public,
        )
    }

    pub fn from_bytes(secret: [u8; 32]) -> Self {
        Self { secret }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// The public point matching this secret.
    pub fn public(&self) -> [u8; 32] {
        PublicKey::from(&StaticSecret::from(self.secret)).to_bytes()
    }

    /// Unwraps a session key encrypted to this key.
    pub fn decrypt(
        &self,
        ephemeral: [u8; 32],
        recipient_public: [u8; 32],
        encrypted_session_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        debug!("X25519 decrypt");

        let shared_secret = {
            let their_public = PublicKey::from(ephemeral);
            let our_secret = StaticSecret::from(self.secret);
            our_secret.diffie_hellman(&their_public).to_bytes()
        };

        let okm = hkdf(&ephemeral, &recipient_public, &shared_secret)?;

        let decrypted_key = aes_kw::unwrap(&okm, encrypted_session_key)?;
        ensure!(!decrypted_key.is_empty(), "empty key is not valid");

        Ok(decrypted_key)
    }
}

/// HKDF for X25519
/// Ref <https://www.rfc-editor.org/rfc/rfc9580.html#name-algorithm-specific-fields-for-x>
pub fn hkdf(
    ephemeral: &[u8; 32],
    recipient_public: &[u8; 32],
    shared_secret: &[u8; 32],
) -> Result<[u8; 16]> {
    const INFO: &[u8] = b"OpenPGP X25519";

    // ephemeral public key || recipient public key || shared secret
    let mut input = Zeroizing::new(Vec::with_capacity(96));
    input.extend_from_slice(ephemeral);
    input.extend_from_slice(recipient_public);
    input.extend_from_slice(shared_secret);

    // HKDF with SHA256, no salt.
    let hk = Hkdf::<Sha256>::new(None, &input);
    let mut okm = [0u8; 16];
    hk.expand(INFO, &mut okm)
        .map_err(|_| Error::InvalidKeyLength)?;

    Ok(okm)
}

/// X25519 encryption.
///
/// Returns (ephemeral, encrypted session key)
pub fn encrypt<R: CryptoRng + Rng>(
    mut rng: R,
    recipient_public: [u8; 32],
    plain: &[u8],
) -> Result<([u8; 32], Vec<u8>)> {
    debug!("X25519 encrypt");

    const MAX_SIZE: usize = 255;
    ensure!(
        plain.len() <= MAX_SIZE,
        "unable to encrypt larger than {} bytes",
        MAX_SIZE
    );

    let (ephemeral_public, shared_secret) = {
        let their_public = PublicKey::from(recipient_public);

        let mut ephemeral_secret_key_bytes = Zeroizing::new([0u8; 32]);
        rng.fill_bytes(&mut *ephemeral_secret_key_bytes);
        let our_secret = StaticSecret::from(*ephemeral_secret_key_bytes);

        let shared_secret = our_secret.diffie_hellman(&their_public);
        let ephemeral_public = PublicKey::from(&our_secret);

        (ephemeral_public, shared_secret)
    };

    let okm = hkdf(
        ephemeral_public.as_bytes(),
        &recipient_public,
        shared_secret.as_bytes(),
    )?;

    let wrapped = aes_kw::wrap(&okm, plain)?;

    Ok((ephemeral_public.to_bytes(), wrapped))
}
