//! Algorithm specific key material.

use std::io;

use byteorder::WriteBytesExt;
use bytes::{Buf, Bytes};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::ecc_curve::EccCurve;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::{checksum, ecdh, ed25519, eddsa, rsa, x25519};
use crate::errors::{Error, Result};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{Mpi, StringToKey};

/// Public key material.
///
/// RSA, the legacy Curve25519 algorithms and the RFC 9580 native Curve25519
/// algorithms are interpreted. All other algorithms are carried as their raw
/// encoding, so keys using them can be read, listed and written back, but not
/// used.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum PublicParams {
    RSA {
        n: Mpi,
        e: Mpi,
    },
    EdDSALegacy {
        curve: EccCurve,
        q: Mpi,
    },
    ECDH {
        curve: EccCurve,
        p: Mpi,
        kdf: ecdh::KdfParams,
    },
    Ed25519 {
        #[debug("{}", hex::encode(public))]
        public: [u8; 32],
    },
    X25519 {
        #[debug("{}", hex::encode(public))]
        public: [u8; 32],
    },
    Unknown {
        #[debug("{}", hex::encode(data))]
        data: Bytes,
    },
}

/// Copies one MPI, including its bit count, into `out`.
fn take_mpi<B: Buf>(i: &mut B, out: &mut Vec<u8>) -> Result<()> {
    let bits = i.read_be_u16()?;
    let body = i.read_take(usize::from(bits).div_ceil(8))?;
    out.extend_from_slice(&bits.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(())
}

/// Reads a length prefixed field (curve OIDs, ECDH KDF parameters).
fn read_short_field<B: Buf>(i: &mut B) -> Result<Bytes> {
    let len = i.read_u8()?;
    if len == 0 || len == 0xFF {
        unsupported_err!("reserved field length {}", len);
    }
    Ok(i.read_take(usize::from(len))?)
}

fn write_short_field<W: io::Write>(writer: &mut W, field: &[u8]) -> Result<()> {
    writer.write_u8(field.len().try_into()?)?;
    writer.write_all(field)?;
    Ok(())
}

/// Version 1 of the ECDH KDF parameters is the only one defined.
const ECDH_KDF_VERSION: u8 = 1;

fn read_kdf_params<B: Buf>(i: &mut B) -> Result<ecdh::KdfParams> {
    let len = i.read_u8()?;
    if len != 3 {
        unsupported_err!("ECDH KDF parameters of {} octets", len);
    }
    let version = i.read_u8()?;
    if version != ECDH_KDF_VERSION {
        unsupported_err!("ECDH KDF parameters version {}", version);
    }
    Ok(ecdh::KdfParams {
        hash: HashAlgorithm::from(i.read_u8()?),
        alg_sym: SymmetricKeyAlgorithm::from(i.read_u8()?),
    })
}

impl PublicParams {
    /// Parses the public material of `alg`.
    ///
    /// For algorithms with unknown framing, the remainder of the buffer is taken.
    pub fn try_from_buf<B: Buf>(alg: PublicKeyAlgorithm, i: &mut B) -> Result<Self> {
        use PublicKeyAlgorithm::*;

        let mut raw = Vec::new();
        match alg {
            Ed25519 => {
                return Ok(PublicParams::Ed25519 {
                    public: i.read_array::<32>()?,
                })
            }
            X25519 => {
                return Ok(PublicParams::X25519 {
                    public: i.read_array::<32>()?,
                })
            }
            RSA | RSAEncrypt | RSASign => {
                let n = Mpi::try_from_buf(i)?;
                let e = Mpi::try_from_buf(i)?;
                return Ok(PublicParams::RSA { n, e });
            }
            EdDSALegacy => {
                let curve = EccCurve::from_oid(read_short_field(i)?);
                let q = Mpi::try_from_buf(i)?;
                return Ok(PublicParams::EdDSALegacy { curve, q });
            }
            ECDH => {
                let curve = EccCurve::from_oid(read_short_field(i)?);
                let p = Mpi::try_from_buf(i)?;
                let kdf = read_kdf_params(i)?;
                return Ok(PublicParams::ECDH { curve, p, kdf });
            }
            DSA => {
                for _ in 0..4 {
                    take_mpi(i, &mut raw)?;
                }
            }
            Elgamal | ElgamalEncryptSign => {
                for _ in 0..3 {
                    take_mpi(i, &mut raw)?;
                }
            }
            ECDSA => {
                let oid = read_short_field(i)?;
                raw.push(oid.len() as u8);
                raw.extend_from_slice(&oid);
                take_mpi(i, &mut raw)?;
            }
            X448 => raw.extend_from_slice(&i.read_take(56)?),
            Ed448 => raw.extend_from_slice(&i.read_take(57)?),
            Unknown(_) => raw.extend_from_slice(&i.rest()),
        }

        Ok(PublicParams::Unknown { data: raw.into() })
    }
}

impl Serialize for PublicParams {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            PublicParams::RSA { n, e } => {
                n.to_writer(writer)?;
                e.to_writer(writer)?;
            }
            PublicParams::EdDSALegacy { curve, q } => {
                write_short_field(writer, curve.oid())?;
                q.to_writer(writer)?;
            }
            PublicParams::ECDH { curve, p, kdf } => {
                write_short_field(writer, curve.oid())?;
                p.to_writer(writer)?;
                writer.write_all(&[3, ECDH_KDF_VERSION, kdf.hash.into(), kdf.alg_sym.into()])?;
            }
            PublicParams::Ed25519 { public } | PublicParams::X25519 { public } => {
                writer.write_all(public)?
            }
            PublicParams::Unknown { data } => writer.write_all(data)?,
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            PublicParams::RSA { n, e } => n.write_len() + e.write_len(),
            PublicParams::EdDSALegacy { curve, q } => 1 + curve.oid().len() + q.write_len(),
            PublicParams::ECDH { curve, p, .. } => 1 + curve.oid().len() + p.write_len() + 4,
            PublicParams::Ed25519 { .. } | PublicParams::X25519 { .. } => 32,
            PublicParams::Unknown { data } => data.len(),
        }
    }
}

/// Unencrypted secret key material.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum PlainSecretParams {
    RSA(rsa::SecretKey),
    EdDSALegacy(ed25519::SecretKey),
    ECDH(x25519::SecretKey),
    Ed25519(ed25519::SecretKey),
    X25519(x25519::SecretKey),
    Unknown(#[debug("..")] Bytes),
}

impl PlainSecretParams {
    pub fn try_from_buf<B: Buf>(
        alg: PublicKeyAlgorithm,
        public_params: &PublicParams,
        mut i: B,
    ) -> Result<Self> {
        let params = match (alg, public_params) {
            (
                PublicKeyAlgorithm::RSA
                | PublicKeyAlgorithm::RSAEncrypt
                | PublicKeyAlgorithm::RSASign,
                PublicParams::RSA { n, e },
            ) => {
                let d = Mpi::try_from_buf(&mut i)?;
                let p = Mpi::try_from_buf(&mut i)?;
                let q = Mpi::try_from_buf(&mut i)?;
                let _u = Mpi::try_from_buf(&mut i)?;
                PlainSecretParams::RSA(rsa::SecretKey::try_from_mpi(n, e, &d, &p, &q)?)
            }
            (
                PublicKeyAlgorithm::EdDSALegacy,
                PublicParams::EdDSALegacy {
                    curve: curve @ EccCurve::Ed25519,
                    q,
                },
            ) => {
                let secret = Mpi::try_from_buf(&mut i)?;
                PlainSecretParams::EdDSALegacy(eddsa::secret_from_mpi(curve, q, &secret)?)
            }
            (
                PublicKeyAlgorithm::ECDH,
                PublicParams::ECDH {
                    curve: curve @ EccCurve::Curve25519,
                    p,
                    ..
                },
            ) => {
                let secret = Mpi::try_from_buf(&mut i)?;
                PlainSecretParams::ECDH(ecdh::secret_from_mpi(curve, p, &secret)?)
            }
            (PublicKeyAlgorithm::Ed25519, PublicParams::Ed25519 { public }) => {
                let secret = Zeroizing::new(i.read_array::<32>()?);
                let key = ed25519::SecretKey::from_bytes(&secret);
                ensure!(
                    &key.public() == public,
                    "ed25519 secret does not match the public key"
                );
                PlainSecretParams::Ed25519(key)
            }
            (PublicKeyAlgorithm::X25519, PublicParams::X25519 { public }) => {
                let key = x25519::SecretKey::from_bytes(i.read_array::<32>()?);
                ensure!(
                    &key.public() == public,
                    "x25519 secret does not match the public key"
                );
                PlainSecretParams::X25519(key)
            }
            _ => PlainSecretParams::Unknown(i.rest()),
        };
        ensure!(
            !i.has_remaining(),
            "trailing data after secret key material"
        );

        Ok(params)
    }

    fn to_zeroizing_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        let mut buf = Zeroizing::new(Vec::with_capacity(self.write_len()));
        self.to_writer(&mut *buf)?;
        Ok(buf)
    }

    /// Encrypts the material under `passphrase`.
    ///
    /// Uses AES-256 with an iterated and salted SHA-256 S2K and the SHA-1
    /// integrity check.
    pub fn encrypt<R: Rng + CryptoRng>(
        &self,
        mut rng: R,
        passphrase: &[u8],
        s2k_count: u8,
    ) -> Result<EncryptedSecretParams> {
        let sym_alg = SymmetricKeyAlgorithm::AES256;
        let s2k = StringToKey::new_iterated(&mut rng, HashAlgorithm::Sha256, s2k_count);
        let key = s2k.derive_key(passphrase, sym_alg.key_size())?;

        let mut iv = vec![0u8; sym_alg.block_size()];
        rng.fill_bytes(&mut iv);

        let mut data = self.to_zeroizing_bytes()?;
        let check = checksum::calculate_sha1(&data);
        data.extend_from_slice(&check);
        sym_alg.encrypt_with_iv(&key, &iv, &mut data)?;

        Ok(EncryptedSecretParams {
            usage: S2K_USAGE_SHA1,
            sym_alg,
            s2k,
            iv: iv.into(),
            data: Bytes::from(data.to_vec()),
        })
    }
}

impl Serialize for PlainSecretParams {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            PlainSecretParams::RSA(key) => {
                for mpi in key.to_mpi() {
                    mpi.to_writer(writer)?;
                }
            }
            PlainSecretParams::EdDSALegacy(key) => {
                Mpi::from_slice(&key.to_bytes()[..]).to_writer(writer)?
            }
            PlainSecretParams::ECDH(key) => ecdh::secret_to_mpi(key).to_writer(writer)?,
            PlainSecretParams::Ed25519(key) => writer.write_all(&key.to_bytes()[..])?,
            PlainSecretParams::X25519(key) => writer.write_all(key.as_bytes())?,
            PlainSecretParams::Unknown(data) => writer.write_all(data)?,
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            PlainSecretParams::RSA(key) => key.to_mpi().iter().map(|mpi| mpi.write_len()).sum(),
            PlainSecretParams::EdDSALegacy(key) => Mpi::from_slice(&key.to_bytes()[..]).write_len(),
            PlainSecretParams::ECDH(key) => ecdh::secret_to_mpi(key).write_len(),
            PlainSecretParams::Ed25519(_) | PlainSecretParams::X25519(_) => 32,
            PlainSecretParams::Unknown(data) => data.len(),
        }
    }
}

/// S2K usage octet: material is followed by a SHA-1 hash.
const S2K_USAGE_SHA1: u8 = 254;
/// S2K usage octet: material is followed by a two octet checksum.
const S2K_USAGE_CHECKSUM: u8 = 255;

/// Secret key material encrypted with a passphrase.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct EncryptedSecretParams {
    usage: u8,
    sym_alg: SymmetricKeyAlgorithm,
    s2k: StringToKey,
    #[debug("{}", hex::encode(iv))]
    iv: Bytes,
    #[debug("{} bytes", data.len())]
    data: Bytes,
}

impl EncryptedSecretParams {
    pub fn sym_alg(&self) -> SymmetricKeyAlgorithm {
        self.sym_alg
    }

    pub fn s2k(&self) -> &StringToKey {
        &self.s2k
    }

    /// Decrypts the material, verifying its integrity check.
    pub fn unlock(
        &self,
        passphrase: &[u8],
        alg: PublicKeyAlgorithm,
        public_params: &PublicParams,
    ) -> Result<PlainSecretParams> {
        let key = self.s2k.derive_key(passphrase, self.sym_alg.key_size())?;
        let mut plain = Zeroizing::new(self.data.to_vec());
        self.sym_alg
            .decrypt_with_iv(&key, &self.iv, &mut plain)?;

        let check_len = if self.usage == S2K_USAGE_SHA1 { 20 } else { 2 };
        if plain.len() < check_len {
            structural_err!("encrypted secret key material is too short");
        }
        let (material, check) = plain.split_at(plain.len() - check_len);
        let valid = if self.usage == S2K_USAGE_SHA1 {
            checksum::sha1(check, material).is_ok()
        } else {
            checksum::simple([check[0], check[1]], material).is_ok()
        };
        if !valid {
            return Err(Error::InvalidArgument {
                message: "private key checksum failure, wrong passphrase?".into(),
            });
        }

        PlainSecretParams::try_from_buf(alg, public_params, material)
    }
}

/// GnuPG stub for secret material that is not available.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct DummySecretParams {
    usage: u8,
    sym_alg: SymmetricKeyAlgorithm,
    s2k: StringToKey,
    #[debug("{}", hex::encode(rest))]
    rest: Bytes,
}

/// The secret part of a secret key packet.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SecretParams {
    Plain(PlainSecretParams),
    Encrypted(EncryptedSecretParams),
    Dummy(DummySecretParams),
}

impl SecretParams {
    pub fn try_from_buf<B: Buf>(
        alg: PublicKeyAlgorithm,
        public_params: &PublicParams,
        mut i: B,
    ) -> Result<Self> {
        let usage = i.read_u8()?;
        match usage {
            0 => {
                let rest = i.rest();
                if rest.len() < 2 {
                    structural_err!("secret key material is too short");
                }
                let (material, check) = rest.split_at(rest.len() - 2);
                checksum::simple([check[0], check[1]], material).map_err(|_| {
                    Error::Structural {
                        message: "secret key checksum failure".into(),
                    }
                })?;
                let plain = PlainSecretParams::try_from_buf(alg, public_params, material)?;
                Ok(SecretParams::Plain(plain))
            }
            S2K_USAGE_SHA1 | S2K_USAGE_CHECKSUM => {
                let sym_alg = SymmetricKeyAlgorithm::from(i.read_u8()?);
                let s2k = StringToKey::try_from_buf(&mut i)?;
                if s2k.is_gnu_dummy() {
                    return Ok(SecretParams::Dummy(DummySecretParams {
                        usage,
                        sym_alg,
                        s2k,
                        rest: i.rest(),
                    }));
                }
                if let StringToKey::Gnu { mode, .. } = s2k {
                    unsupported_err!("GNU S2K mode {}", mode);
                }
                if !sym_alg.is_supported() {
                    unsupported_err!("secret key cipher {}", sym_alg);
                }
                let iv = i.read_take(sym_alg.block_size())?;
                Ok(SecretParams::Encrypted(EncryptedSecretParams {
                    usage,
                    sym_alg,
                    s2k,
                    iv,
                    data: i.rest(),
                }))
            }
            _ => unsupported_err!("legacy secret key protection {}", usage),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, SecretParams::Encrypted(_))
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self, SecretParams::Dummy(_))
    }
}

impl Serialize for SecretParams {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            SecretParams::Plain(plain) => {
                let bytes = plain.to_zeroizing_bytes()?;
                writer.write_all(&[0])?;
                writer.write_all(&bytes)?;
                writer.write_all(&checksum::calculate_simple(&bytes).to_be_bytes())?;
            }
            SecretParams::Encrypted(enc) => {
                writer.write_all(&[enc.usage, enc.sym_alg.into()])?;
                enc.s2k.to_writer(writer)?;
                writer.write_all(&enc.iv)?;
                writer.write_all(&enc.data)?;
            }
            SecretParams::Dummy(dummy) => {
                writer.write_all(&[dummy.usage, dummy.sym_alg.into()])?;
                dummy.s2k.to_writer(writer)?;
                writer.write_all(&dummy.rest)?;
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            SecretParams::Plain(plain) => 1 + plain.write_len() + 2,
            SecretParams::Encrypted(enc) => {
                2 + enc.s2k.write_len() + enc.iv.len() + enc.data.len()
            }
            SecretParams::Dummy(dummy) => 2 + dummy.s2k.write_len() + dummy.rest.len(),
        }
    }
}
