use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Buf;
use chrono::{DateTime, Utc};
use digest::DynDigest;
use log::debug;
use rand::{CryptoRng, Rng};

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::{ecdh, ed25519, eddsa, rsa, x25519};
use crate::errors::Result;
use crate::packet::public_key_encrypted_session_key::encode_session_key;
use crate::packet::{PacketTrait, PkeskBytes, Signature};
use crate::parsing::BufParsing;
use crate::ser::{time_to_u32, u32_to_time, Serialize};
use crate::types::{Fingerprint, KeyId, Mpi, PublicParams, Tag};

/// The only key version handled by this crate.
pub const KEY_VERSION: u8 = 4;

/// Public-Key and Public-Subkey Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-public-key-packet-formats>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct PublicKey {
    algorithm: PublicKeyAlgorithm,
    created_at: DateTime<Utc>,
    public_params: PublicParams,
    is_subkey: bool,
    #[debug(skip)]
    fingerprint: Fingerprint,
}

impl PublicKey {
    pub fn new(
        algorithm: PublicKeyAlgorithm,
        created_at: DateTime<Utc>,
        public_params: PublicParams,
        is_subkey: bool,
    ) -> Result<Self> {
        let mut key = PublicKey {
            algorithm,
            created_at,
            public_params,
            is_subkey,
            fingerprint: Fingerprint::default(),
        };
        key.fingerprint = key.compute_fingerprint()?;
        Ok(key)
    }

    /// Parses the body of a key packet.
    pub fn try_from_buf<B: Buf>(mut i: B, is_subkey: bool) -> Result<Self> {
        let version = i.read_u8()?;
        if version != KEY_VERSION {
            unsupported_err!("key version {}", version);
        }
        let created_at = u32_to_time(i.read_be_u32()?);
        let algorithm = PublicKeyAlgorithm::from(i.read_u8()?);
        let public_params = PublicParams::try_from_buf(algorithm, &mut i)?;
        if i.has_remaining() {
            structural_err!("{} trailing octets in public key packet", i.remaining());
        }

        Self::new(algorithm, created_at, public_params, is_subkey)
    }

    /// Reads the public part at the start of a secret key packet, leaving the
    /// secret material in the buffer.
    pub(crate) fn try_from_secret_buf<B: Buf>(i: &mut B, is_subkey: bool) -> Result<Self> {
        let version = i.read_u8()?;
        if version != KEY_VERSION {
            unsupported_err!("key version {}", version);
        }
        let created_at = u32_to_time(i.read_be_u32()?);
        let algorithm = PublicKeyAlgorithm::from(i.read_u8()?);
        if let PublicKeyAlgorithm::Unknown(id) = algorithm {
            unsupported_err!("secret key with unknown algorithm {}", id);
        }
        let public_params = PublicParams::try_from_buf(algorithm, i)?;

        Self::new(algorithm, created_at, public_params, is_subkey)
    }

    fn compute_fingerprint(&self) -> Result<Fingerprint> {
        let mut hasher = HashAlgorithm::Sha1.new_hasher()?;
        self.hash_for_signature(&mut *hasher)?;
        let digest = hasher.finalize();
        Fingerprint::from_slice(&digest)
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn public_params(&self) -> &PublicParams {
        &self.public_params
    }

    pub fn is_subkey(&self) -> bool {
        self.is_subkey
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }

    pub fn can_sign(&self) -> bool {
        self.algorithm.can_sign()
    }

    pub fn can_encrypt(&self) -> bool {
        self.algorithm.can_encrypt()
    }

    /// The same key material, flagged as primary key or subkey.
    pub fn with_subkey_flag(&self, is_subkey: bool) -> Self {
        PublicKey {
            is_subkey,
            ..self.clone()
        }
    }

    /// Whether the key has expired at `now`, according to the lifetime in `sig`.
    ///
    /// A key created in the future counts as expired.
    pub fn key_expired(&self, sig: &Signature, now: DateTime<Utc>) -> bool {
        if self.created_at > now {
            return true;
        }
        match sig.key_expiration_time() {
            None => false,
            Some(lifetime) if lifetime.is_zero() => false,
            Some(lifetime) => match chrono::Duration::from_std(lifetime) {
                Ok(lifetime) => now > self.created_at + lifetime,
                Err(_) => false,
            },
        }
    }

    /// Feeds the key into a signature hash: `0x99`, two octet length, body.
    pub fn hash_for_signature(&self, hasher: &mut dyn DynDigest) -> Result<()> {
        let len = self.write_len();
        let mut prefix = vec![0x99];
        prefix.write_u16::<BigEndian>(len.try_into()?)?;
        hasher.update(&prefix);
        let body = self.to_bytes()?;
        hasher.update(&body);
        Ok(())
    }

    /// Checks `sig_bytes` over `hashed` made with `hash`.
    pub fn verify_signature(
        &self,
        hash: HashAlgorithm,
        hashed: &[u8],
        sig_bytes: &[u8],
    ) -> Result<()> {
        match &self.public_params {
            PublicParams::RSA { n, e } => {
                let mut i = sig_bytes;
                let sig = Mpi::try_from_buf(&mut i)?;
                if !i.is_empty() {
                    structural_err!("{} trailing octets in RSA signature", i.len());
                }
                rsa::verify(n, e, hash, hashed, &sig)
            }
            PublicParams::EdDSALegacy { curve, q } => {
                eddsa::verify(curve, q, hash, hashed, sig_bytes)
            }
            PublicParams::Ed25519 { public } => ed25519::verify(public, hash, hashed, sig_bytes),
            _ => unsupported_err!("verifying {} signatures", self.algorithm),
        }
    }

    /// Encrypts a session key to this key.
    ///
    /// `sym_alg` is given for v3 packets only. RSA and ECDH encrypt it along
    /// with the key, X25519 sends it in the clear.
    pub fn encrypt_session_key<R: Rng + CryptoRng>(
        &self,
        mut rng: R,
        session_key: &[u8],
        sym_alg: Option<SymmetricKeyAlgorithm>,
    ) -> Result<PkeskBytes> {
        debug!("encrypting session key to {}", self.key_id());
        match &self.public_params {
            PublicParams::RSA { n, e } => {
                let data = encode_session_key(sym_alg, session_key);
                let mpi = rsa::encrypt(&mut rng, n, e, &data)?;
                Ok(PkeskBytes::Rsa { mpi })
            }
            PublicParams::ECDH { curve, p, kdf } => {
                let data = encode_session_key(sym_alg, session_key);
                let (public_point, wrapped) =
                    ecdh::encrypt(&mut rng, curve, p, kdf, &self.fingerprint, &data)?;
                Ok(PkeskBytes::Ecdh {
                    public_point,
                    encrypted_session_key: wrapped.into(),
                })
            }
            PublicParams::X25519 { public } => {
                let (ephemeral, wrapped) = x25519::encrypt(&mut rng, *public, session_key)?;
                Ok(PkeskBytes::X25519 {
                    ephemeral,
                    sym_alg,
                    session_key: wrapped.into(),
                })
            }
            _ => unsupported_err!("encrypting to {} keys", self.algorithm),
        }
    }
}

impl Serialize for PublicKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(KEY_VERSION)?;
        writer.write_u32::<BigEndian>(time_to_u32(&self.created_at))?;
        writer.write_u8(self.algorithm.into())?;
        self.public_params.to_writer(writer)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + 4 + 1 + self.public_params.write_len()
    }
}

impl PacketTrait for PublicKey {
    fn tag(&self) -> Tag {
        if self.is_subkey {
            Tag::PublicSubkey
        } else {
            Tag::PublicKey
        }
    }
}
