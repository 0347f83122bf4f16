use std::io;
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use chrono::{DateTime, Utc};
use log::debug;
use smallvec::SmallVec;

use crate::crypto::{aead::AeadAlgorithm, hash::HashAlgorithm, sym::SymmetricKeyAlgorithm};
use crate::errors::Result;
use crate::parsing::BufParsing;
use crate::ser::{duration_to_u32, time_to_u32, u32_to_time, Serialize};
use crate::types::{CompressionAlgorithm, Fingerprint, KeyId};

use super::{RevocationCode, Signature};

/// Version octet in front of a v4 issuer fingerprint.
const FINGERPRINT_VERSION: u8 = 4;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
/// Available signature subpacket types
pub enum SubpacketType {
    SignatureCreationTime,
    SignatureExpirationTime,
    KeyExpirationTime,
    PreferredSymmetricAlgorithms,
    Issuer,
    PreferredHashAlgorithms,
    PreferredCompressionAlgorithms,
    PrimaryUserId,
    KeyFlags,
    RevocationReason,
    Features,
    EmbeddedSignature,
    IssuerFingerprint,
    PreferredEncryptionModes,
    Other(u8),
}

impl SubpacketType {
    pub fn as_u8(&self, is_critical: bool) -> u8 {
        let raw: u8 = match self {
            SubpacketType::SignatureCreationTime => 2,
            SubpacketType::SignatureExpirationTime => 3,
            SubpacketType::KeyExpirationTime => 9,
            SubpacketType::PreferredSymmetricAlgorithms => 11,
            SubpacketType::Issuer => 16,
            SubpacketType::PreferredHashAlgorithms => 21,
            SubpacketType::PreferredCompressionAlgorithms => 22,
            SubpacketType::PrimaryUserId => 25,
            SubpacketType::KeyFlags => 27,
            SubpacketType::RevocationReason => 29,
            SubpacketType::Features => 30,
            SubpacketType::EmbeddedSignature => 32,
            SubpacketType::IssuerFingerprint => 33,
            SubpacketType::PreferredEncryptionModes => 34,
            SubpacketType::Other(n) => *n,
        };

        if is_critical {
            raw | 0b1000_0000
        } else {
            raw
        }
    }

    #[inline]
    pub fn from_u8(n: u8) -> (Self, bool) {
        let is_critical = (n >> 7) == 1;
        let n = n & 0b0111_1111;

        let m = match n {
            2 => SubpacketType::SignatureCreationTime,
            3 => SubpacketType::SignatureExpirationTime,
            9 => SubpacketType::KeyExpirationTime,
            11 => SubpacketType::PreferredSymmetricAlgorithms,
            16 => SubpacketType::Issuer,
            21 => SubpacketType::PreferredHashAlgorithms,
            22 => SubpacketType::PreferredCompressionAlgorithms,
            25 => SubpacketType::PrimaryUserId,
            27 => SubpacketType::KeyFlags,
            29 => SubpacketType::RevocationReason,
            30 => SubpacketType::Features,
            32 => SubpacketType::EmbeddedSignature,
            33 => SubpacketType::IssuerFingerprint,
            34 => SubpacketType::PreferredEncryptionModes,
            _ => SubpacketType::Other(n),
        };

        (m, is_critical)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Subpacket {
    pub is_critical: bool,
    pub data: SubpacketData,
}

impl Subpacket {
    /// Construct a new regular subpacket.
    pub const fn regular(data: SubpacketData) -> Self {
        Subpacket {
            is_critical: false,
            data,
        }
    }

    /// Construct a new critical subpacket.
    pub const fn critical(data: SubpacketData) -> Self {
        Subpacket {
            is_critical: true,
            data,
        }
    }

    pub fn typ(&self) -> SubpacketType {
        match &self.data {
            SubpacketData::SignatureCreationTime(_) => SubpacketType::SignatureCreationTime,
            SubpacketData::SignatureExpirationTime(_) => SubpacketType::SignatureExpirationTime,
            SubpacketData::KeyExpirationTime(_) => SubpacketType::KeyExpirationTime,
            SubpacketData::Issuer(_) => SubpacketType::Issuer,
            SubpacketData::PreferredSymmetricAlgorithms(_) => {
                SubpacketType::PreferredSymmetricAlgorithms
            }
            SubpacketData::PreferredHashAlgorithms(_) => SubpacketType::PreferredHashAlgorithms,
            SubpacketData::PreferredCompressionAlgorithms(_) => {
                SubpacketType::PreferredCompressionAlgorithms
            }
            SubpacketData::IsPrimary(_) => SubpacketType::PrimaryUserId,
            SubpacketData::KeyFlags(_) => SubpacketType::KeyFlags,
            SubpacketData::RevocationReason(_, _) => SubpacketType::RevocationReason,
            SubpacketData::Features(_) => SubpacketType::Features,
            SubpacketData::EmbeddedSignature(_) => SubpacketType::EmbeddedSignature,
            SubpacketData::IssuerFingerprint(_) => SubpacketType::IssuerFingerprint,
            SubpacketData::PreferredEncryptionModes(_) => SubpacketType::PreferredEncryptionModes,
            SubpacketData::Other(n, _) => SubpacketType::Other(*n),
        }
    }

    /// Parses a single subpacket body, `typ` already stripped.
    fn try_from_body(typ: SubpacketType, is_critical: bool, mut body: Bytes) -> Result<Self> {
        let data = match typ {
            SubpacketType::SignatureCreationTime => {
                SubpacketData::SignatureCreationTime(u32_to_time(body.read_be_u32()?))
            }
            SubpacketType::SignatureExpirationTime => SubpacketData::SignatureExpirationTime(
                Duration::from_secs(body.read_be_u32()?.into()),
            ),
            SubpacketType::KeyExpirationTime => SubpacketData::KeyExpirationTime(
                Duration::from_secs(body.read_be_u32()?.into()),
            ),
            SubpacketType::PreferredSymmetricAlgorithms => {
                SubpacketData::PreferredSymmetricAlgorithms(
                    body.iter().map(|b| SymmetricKeyAlgorithm::from(*b)).collect(),
                )
            }
            SubpacketType::Issuer => SubpacketData::Issuer(KeyId::from(body.read_array::<8>()?)),
            SubpacketType::PreferredHashAlgorithms => SubpacketData::PreferredHashAlgorithms(
                body.iter().map(|b| HashAlgorithm::from(*b)).collect(),
            ),
            SubpacketType::PreferredCompressionAlgorithms => {
                SubpacketData::PreferredCompressionAlgorithms(
                    body.iter().map(|b| CompressionAlgorithm::from(*b)).collect(),
                )
            }
            SubpacketType::PrimaryUserId => SubpacketData::IsPrimary(body.read_u8()? != 0),
            SubpacketType::KeyFlags => SubpacketData::KeyFlags(body.iter().copied().collect()),
            SubpacketType::RevocationReason => {
                let code = RevocationCode::from(body.read_u8()?);
                SubpacketData::RevocationReason(code, body.rest())
            }
            SubpacketType::Features => SubpacketData::Features(body.iter().copied().collect()),
            SubpacketType::EmbeddedSignature => {
                SubpacketData::EmbeddedSignature(Box::new(Signature::try_from_buf(body)?))
            }
            SubpacketType::IssuerFingerprint => {
                let version = body.read_u8()?;
                if version != FINGERPRINT_VERSION {
                    unsupported_err!("issuer fingerprint version {}", version);
                }
                SubpacketData::IssuerFingerprint(Fingerprint::from(body.read_array::<20>()?))
            }
            SubpacketType::PreferredEncryptionModes => SubpacketData::PreferredEncryptionModes(
                body.iter().map(|b| AeadAlgorithm::from(*b)).collect(),
            ),
            SubpacketType::Other(n) => SubpacketData::Other(n, body.rest()),
        };

        Ok(Subpacket { is_critical, data })
    }

    fn body_len(&self) -> usize {
        match &self.data {
            SubpacketData::SignatureCreationTime(_)
            | SubpacketData::SignatureExpirationTime(_)
            | SubpacketData::KeyExpirationTime(_) => 4,
            SubpacketData::Issuer(_) => 8,
            SubpacketData::PreferredSymmetricAlgorithms(algs) => algs.len(),
            SubpacketData::PreferredHashAlgorithms(algs) => algs.len(),
            SubpacketData::PreferredCompressionAlgorithms(algs) => algs.len(),
            SubpacketData::IsPrimary(_) => 1,
            SubpacketData::KeyFlags(flags) => flags.len(),
            SubpacketData::RevocationReason(_, reason) => 1 + reason.len(),
            SubpacketData::Features(features) => features.len(),
            SubpacketData::EmbeddedSignature(sig) => sig.write_len(),
            SubpacketData::IssuerFingerprint(_) => 1 + 20,
            SubpacketData::PreferredEncryptionModes(modes) => modes.len(),
            SubpacketData::Other(_, body) => body.len(),
        }
    }

    fn body_to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match &self.data {
            SubpacketData::SignatureCreationTime(t) => {
                writer.write_u32::<BigEndian>(time_to_u32(t))?;
            }
            SubpacketData::SignatureExpirationTime(d) | SubpacketData::KeyExpirationTime(d) => {
                writer.write_u32::<BigEndian>(duration_to_u32(d))?;
            }
            SubpacketData::Issuer(id) => writer.write_all(id.as_ref())?,
            SubpacketData::PreferredSymmetricAlgorithms(algs) => {
                for alg in algs {
                    writer.write_u8((*alg).into())?;
                }
            }
            SubpacketData::PreferredHashAlgorithms(algs) => {
                for alg in algs {
                    writer.write_u8((*alg).into())?;
                }
            }
            SubpacketData::PreferredCompressionAlgorithms(algs) => {
                for alg in algs {
                    writer.write_u8((*alg).into())?;
                }
            }
            SubpacketData::IsPrimary(is_primary) => writer.write_u8(u8::from(*is_primary))?,
            SubpacketData::KeyFlags(flags) => writer.write_all(flags)?,
            SubpacketData::RevocationReason(code, reason) => {
                writer.write_u8((*code).into())?;
                writer.write_all(reason)?;
            }
            SubpacketData::Features(features) => writer.write_all(features)?,
            SubpacketData::EmbeddedSignature(sig) => sig.to_writer(writer)?,
            SubpacketData::IssuerFingerprint(fp) => {
                writer.write_u8(FINGERPRINT_VERSION)?;
                writer.write_all(fp.as_bytes())?;
            }
            SubpacketData::PreferredEncryptionModes(modes) => {
                for mode in modes {
                    writer.write_u8((*mode).into())?;
                }
            }
            SubpacketData::Other(_, body) => writer.write_all(body)?,
        }
        Ok(())
    }
}

#[derive(derive_more::Debug, PartialEq, Eq, Clone)]
pub enum SubpacketData {
    /// The time the signature was made.
    SignatureCreationTime(DateTime<Utc>),
    /// How long after its creation the signature expires.
    SignatureExpirationTime(Duration),
    /// How long after its creation the key expires.
    KeyExpirationTime(Duration),
    /// The OpenPGP Key ID of the key issuing the signature.
    Issuer(KeyId),
    /// Renamed to "Preferred Symmetric Ciphers for v1 SEIPD" in RFC 9580
    PreferredSymmetricAlgorithms(SmallVec<[SymmetricKeyAlgorithm; 8]>),
    PreferredHashAlgorithms(SmallVec<[HashAlgorithm; 8]>),
    PreferredCompressionAlgorithms(SmallVec<[CompressionAlgorithm; 8]>),
    IsPrimary(bool),
    KeyFlags(#[debug("{}", hex::encode(_0))] SmallVec<[u8; 1]>),
    RevocationReason(RevocationCode, #[debug("{:?}", String::from_utf8_lossy(_1))] Bytes),
    Features(#[debug("{}", hex::encode(_0))] SmallVec<[u8; 1]>),
    EmbeddedSignature(Box<Signature>),
    IssuerFingerprint(Fingerprint),
    /// AEAD modes the key holder accepts for SEIPDv2.
    PreferredEncryptionModes(SmallVec<[AeadAlgorithm; 4]>),
    Other(u8, #[debug("{}", hex::encode(_1))] Bytes),
}

/// Parses a complete subpacket area.
///
/// Unknown critical subpackets in the hashed area make the whole signature
/// unsupported.
pub fn parse_subpackets(mut area: Bytes, hashed: bool) -> Result<Vec<Subpacket>> {
    let mut packets = Vec::new();
    while area.has_remaining() {
        let len = read_subpacket_len(&mut area)?;
        if len == 0 {
            structural_err!("empty signature subpacket");
        }
        let mut body = area.read_take(len)?;
        let (typ, is_critical) = SubpacketType::from_u8(body.read_u8()?);
        if is_critical && hashed {
            if let SubpacketType::Other(n) = typ {
                unsupported_err!("unknown critical signature subpacket {}", n);
            }
        }
        let packet = Subpacket::try_from_body(typ, is_critical, body)?;
        debug!("subpacket {:?}", packet);
        packets.push(packet);
    }
    Ok(packets)
}

fn read_subpacket_len<B: Buf>(i: &mut B) -> Result<usize> {
    let olen = i.read_u8()?;
    let len = match olen {
        0..=191 => usize::from(olen),
        192..=254 => {
            let a = i.read_u8()?;
            ((usize::from(olen) - 192) << 8) + 192 + usize::from(a)
        }
        255 => i.read_be_u32()?.try_into()?,
    };
    Ok(len)
}

fn write_subpacket_len<W: io::Write>(writer: &mut W, len: usize) -> Result<()> {
    if len < 192 {
        writer.write_u8(len.try_into()?)?;
    } else if len < 16320 {
        let len = len - 192;
        writer.write_u8(((len >> 8) + 192).try_into()?)?;
        writer.write_u8((len & 0xFF).try_into()?)?;
    } else {
        writer.write_u8(255)?;
        writer.write_u32::<BigEndian>(len.try_into()?)?;
    }
    Ok(())
}

fn subpacket_len_len(len: usize) -> usize {
    if len < 192 {
        1
    } else if len < 16320 {
        2
    } else {
        5
    }
}

impl Serialize for Subpacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        let len = 1 + self.body_len();
        write_subpacket_len(writer, len)?;
        writer.write_u8(self.typ().as_u8(self.is_critical))?;
        self.body_to_writer(writer)
    }

    fn write_len(&self) -> usize {
        let len = 1 + self.body_len();
        subpacket_len_len(len) + len
    }
}
