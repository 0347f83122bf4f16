use std::io;

use bytes::{Buf, Bytes};
use chrono::{DateTime, Utc};
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::ecc_curve::EccCurve;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::{ecdh, ed25519, eddsa, rsa, x25519};
use crate::errors::Result;
use crate::packet::public_key_encrypted_session_key::decode_session_key;
use crate::packet::{PacketTrait, PkeskBytes, PublicKey};
use crate::ser::Serialize;
use crate::types::{
    Fingerprint, KeyId, PkeskVersion, PlainSecretParams, PublicParams, SecretParams, Tag,
};

/// Secret-Key and Secret-Subkey Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-secret-key-packet-formats>
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SecretKey {
    public_key: PublicKey,
    secret_params: SecretParams,
}

impl SecretKey {
    pub fn new(public_key: PublicKey, secret_params: SecretParams) -> Self {
        Self {
            public_key,
            secret_params,
        }
    }

    pub fn try_from_buf<B: Buf>(mut i: B, is_subkey: bool) -> Result<Self> {
        let public_key = PublicKey::try_from_secret_buf(&mut i, is_subkey)?;
        let secret_params =
            SecretParams::try_from_buf(public_key.algorithm(), public_key.public_params(), i)?;

        Ok(Self {
            public_key,
            secret_params,
        })
    }

    /// Generates a fresh Ed25519 key.
    pub fn generate_ed25519<R: Rng + CryptoRng>(
        rng: R,
        created_at: DateTime<Utc>,
        is_subkey: bool,
    ) -> Result<Self> {
        let secret = ed25519::SecretKey::generate(rng);
        let public_key = PublicKey::new(
            PublicKeyAlgorithm::Ed25519,
            created_at,
            PublicParams::Ed25519 {
                public: secret.public(),
            },
            is_subkey,
        )?;
        Ok(Self::new(
            public_key,
            SecretParams::Plain(PlainSecretParams::Ed25519(secret)),
        ))
    }

    /// Generates a fresh X25519 key.
    pub fn generate_x25519<R: Rng + CryptoRng>(
        rng: R,
        created_at: DateTime<Utc>,
        is_subkey: bool,
    ) -> Result<Self> {
        let (secret, public) = x25519::SecretKey::generate(rng);
        let public_key = PublicKey::new(
            PublicKeyAlgorithm::X25519,
            created_at,
            PublicParams::X25519 { public },
            is_subkey,
        )?;
        Ok(Self::new(
            public_key,
            SecretParams::Plain(PlainSecretParams::X25519(secret)),
        ))
    }

    /// Generates a fresh RSA key with a modulus of `bits` bits.
    pub fn generate_rsa<R: Rng + CryptoRng>(
        rng: R,
        bits: usize,
        created_at: DateTime<Utc>,
        is_subkey: bool,
    ) -> Result<Self> {
        let (secret, n, e) = rsa::SecretKey::generate(rng, bits)?;
        let public_key = PublicKey::new(
            PublicKeyAlgorithm::RSA,
            created_at,
            PublicParams::RSA { n, e },
            is_subkey,
        )?;
        Ok(Self::new(
            public_key,
            SecretParams::Plain(PlainSecretParams::RSA(secret)),
        ))
    }

    /// Generates a fresh Ed25519 key in the legacy `EdDSALegacy` encoding.
    pub fn generate_eddsa_legacy<R: Rng + CryptoRng>(
        rng: R,
        created_at: DateTime<Utc>,
        is_subkey: bool,
    ) -> Result<Self> {
        let secret = ed25519::SecretKey::generate(rng);
        let public_key = PublicKey::new(
            PublicKeyAlgorithm::EdDSALegacy,
            created_at,
            PublicParams::EdDSALegacy {
                curve: EccCurve::Ed25519,
                q: eddsa::public(&secret),
            },
            is_subkey,
        )?;
        Ok(Self::new(
            public_key,
            SecretParams::Plain(PlainSecretParams::EdDSALegacy(secret)),
        ))
    }

    /// Generates a fresh Curve25519 `ECDH` key with SHA-256 and AES-128 as
    /// KDF parameters.
    pub fn generate_ecdh<R: Rng + CryptoRng>(
        rng: R,
        created_at: DateTime<Utc>,
        is_subkey: bool,
    ) -> Result<Self> {
        let (secret, p) = ecdh::generate_key(rng);
        let public_key = PublicKey::new(
            PublicKeyAlgorithm::ECDH,
            created_at,
            PublicParams::ECDH {
                curve: EccCurve::Curve25519,
                p,
                kdf: ecdh::KdfParams::default(),
            },
            is_subkey,
        )?;
        Ok(Self::new(
            public_key,
            SecretParams::Plain(PlainSecretParams::ECDH(secret)),
        ))
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_params(&self) -> &SecretParams {
        &self.secret_params
    }

    pub fn key_id(&self) -> KeyId {
        self.public_key.key_id()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.public_key.fingerprint()
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.public_key.algorithm()
    }

    pub fn is_subkey(&self) -> bool {
        self.public_key.is_subkey()
    }

    /// The secret material requires a passphrase before use.
    pub fn is_encrypted(&self) -> bool {
        self.secret_params.is_encrypted()
    }

    /// The secret material is absent (GnuPG stub).
    pub fn is_dummy(&self) -> bool {
        self.secret_params.is_dummy()
    }

    /// Decrypts passphrase protected material in place.
    pub fn unlock(&mut self, passphrase: &[u8]) -> Result<()> {
        match &self.secret_params {
            SecretParams::Plain(_) => Ok(()),
            SecretParams::Encrypted(enc) => {
                let plain = enc.unlock(
                    passphrase,
                    self.public_key.algorithm(),
                    self.public_key.public_params(),
                )?;
                debug!("unlocked key {}", self.key_id());
                self.secret_params = SecretParams::Plain(plain);
                Ok(())
            }
            SecretParams::Dummy(_) => {
                invalid_argument_err!("dummy key {} has no secret material", self.key_id())
            }
        }
    }

    /// Protects plain material with `passphrase`.
    pub fn protect<R: Rng + CryptoRng>(
        &mut self,
        passphrase: &[u8],
        rng: R,
        config: &Config,
    ) -> Result<()> {
        match &self.secret_params {
            SecretParams::Plain(plain) => {
                let enc = plain.encrypt(rng, passphrase, config.s2k_count())?;
                self.secret_params = SecretParams::Encrypted(enc);
                Ok(())
            }
            SecretParams::Encrypted(_) => {
                invalid_argument_err!("key {} is already protected", self.key_id())
            }
            SecretParams::Dummy(_) => {
                invalid_argument_err!("dummy key {} has no secret material", self.key_id())
            }
        }
    }

    fn plain_params(&self) -> Result<&PlainSecretParams> {
        match &self.secret_params {
            SecretParams::Plain(plain) => Ok(plain),
            SecretParams::Encrypted(_) => {
                invalid_argument_err!("private key {} must be decrypted", self.key_id())
            }
            SecretParams::Dummy(_) => {
                invalid_argument_err!("dummy key {} can not be used", self.key_id())
            }
        }
    }

    /// Signs a digest made with `hash`, returning the raw signature material.
    pub fn create_signature(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<Bytes> {
        match self.plain_params()? {
            PlainSecretParams::RSA(key) => {
                let sig = key.sign(hash, digest)?;
                Ok(sig.to_bytes()?.into())
            }
            PlainSecretParams::EdDSALegacy(key) => eddsa::sign(key, hash, digest),
            PlainSecretParams::Ed25519(key) => {
                let sig = key.sign(hash, digest)?;
                Ok(Bytes::copy_from_slice(&sig))
            }
            _ => unsupported_err!("signing with {} keys", self.algorithm()),
        }
    }

    /// Recovers a session key encrypted to this key, and the cipher it is
    /// used with when the packet names one.
    pub fn decrypt_session_key(
        &self,
        values: &PkeskBytes,
        version: PkeskVersion,
    ) -> Result<(Option<SymmetricKeyAlgorithm>, Zeroizing<Vec<u8>>)> {
        match (self.plain_params()?, self.public_key.public_params(), values) {
            (PlainSecretParams::RSA(key), PublicParams::RSA { .. }, PkeskBytes::Rsa { mpi }) => {
                let data = key.decrypt(mpi)?;
                decode_session_key(version, &data)
            }
            (
                PlainSecretParams::ECDH(key),
                PublicParams::ECDH { curve, kdf, .. },
                PkeskBytes::Ecdh {
                    public_point,
                    encrypted_session_key,
                },
            ) => {
                let data = ecdh::decrypt(
                    key,
                    curve,
                    kdf,
                    &self.fingerprint(),
                    public_point,
                    encrypted_session_key,
                )?;
                decode_session_key(version, &data)
            }
            (
                PlainSecretParams::X25519(key),
                PublicParams::X25519 { public },
                PkeskBytes::X25519 {
                    ephemeral,
                    sym_alg,
                    session_key,
                },
            ) => {
                let session_key = key.decrypt(*ephemeral, *public, session_key)?;
                Ok((*sym_alg, session_key))
            }
            _ => unsupported_err!("session key decryption with {} keys", self.algorithm()),
        }
    }
}

impl Serialize for SecretKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.public_key.to_writer(writer)?;
        self.secret_params.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.public_key.write_len() + self.secret_params.write_len()
    }
}

impl PacketTrait for SecretKey {
    fn tag(&self) -> Tag {
        if self.is_subkey() {
            Tag::SecretSubkey
        } else {
            Tag::SecretKey
        }
    }
}
