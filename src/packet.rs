//! # Packet module
//!
//! Handles everything in relationship to packets: parsing single packet
//! bodies, the [`Packet`] sum type, and the [`PacketReader`] that pulls packets
//! off a byte stream.

mod compressed_data;
mod header;
mod literal_data;
mod marker;
mod one_pass_signature;
mod padding;
mod partial_body;
mod public_key;
mod public_key_encrypted_session_key;
mod reader;
mod secret_key;
mod signature;
mod sym_encrypted_protected_data;
mod sym_key_encrypted_session_key;
mod trust;
mod user_attribute;
mod user_id;

use std::io;

use bytes::Bytes;

pub use self::{
    compressed_data::*,
    header::PacketHeader,
    literal_data::*,
    marker::*,
    one_pass_signature::*,
    padding::*,
    partial_body::PartialBodyWriter,
    public_key::*,
    public_key_encrypted_session_key::*,
    reader::PacketReader,
    secret_key::*,
    signature::*,
    sym_encrypted_protected_data::*,
    sym_key_encrypted_session_key::*,
    trust::*,
    user_attribute::*,
    user_id::*,
};

use crate::errors::Result;
use crate::ser::Serialize;
use crate::types::Tag;

/// A packet body that knows its own tag.
pub trait PacketTrait: Serialize {
    fn tag(&self) -> Tag;

    /// Write this packet including the packet header.
    fn to_writer_with_header<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.tag().write_header(writer, self.write_len())?;
        self.to_writer(writer)
    }

    /// Length in bytes used when calling `to_writer_with_header`.
    fn write_len_with_header(&self) -> usize {
        let len = self.write_len();
        Tag::header_len(len) + len
    }
}

impl<T: PacketTrait> PacketTrait for &T {
    fn tag(&self) -> Tag {
        (*self).tag()
    }
}

/// Represents a Packet. A packet is the record structure used to encode a chunk of data in OpenPGP.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-packet-syntax>
#[derive(Debug, PartialEq, Eq, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum Packet {
    PublicKey(PublicKey),
    PublicSubkey(PublicKey),
    SecretKey(SecretKey),
    SecretSubkey(SecretKey),
    UserId(UserId),
    UserAttribute(UserAttribute),
    Signature(Signature),
    OnePassSignature(OnePassSignature),
    LiteralData(LiteralData),
    CompressedData(CompressedData),
    PublicKeyEncryptedSessionKey(PublicKeyEncryptedSessionKey),
    SymKeyEncryptedSessionKey(SymKeyEncryptedSessionKey),
    SymEncryptedProtectedData(SymEncryptedProtectedData),
    Marker(Marker),
    Trust(Trust),
    Padding(Padding),
    /// A packet type this crate does not interpret, kept verbatim.
    Unknown { tag: Tag, body: Bytes },
    /// A key or subkey packet whose version or algorithm is not supported,
    /// kept verbatim. It still marks where a key starts.
    UnsupportedKey { tag: Tag, body: Bytes },
}

impl Packet {
    /// Parses a packet body, dispatching on its tag.
    pub fn from_body(tag: Tag, body: Bytes) -> Result<Self> {
        let packet = match tag {
            Tag::PublicKey => Packet::PublicKey(PublicKey::try_from_buf(body, false)?),
            Tag::PublicSubkey => Packet::PublicSubkey(PublicKey::try_from_buf(body, true)?),
            Tag::SecretKey => Packet::SecretKey(SecretKey::try_from_buf(body, false)?),
            Tag::SecretSubkey => Packet::SecretSubkey(SecretKey::try_from_buf(body, true)?),
            Tag::UserId => Packet::UserId(UserId::try_from_buf(body)?),
            Tag::UserAttribute => Packet::UserAttribute(UserAttribute::try_from_buf(body)?),
            Tag::Signature => Packet::Signature(Signature::try_from_buf(body)?),
            Tag::OnePassSignature => {
                Packet::OnePassSignature(OnePassSignature::try_from_buf(body)?)
            }
            Tag::LiteralData => Packet::LiteralData(LiteralData::try_from_buf(body)?),
            Tag::CompressedData => Packet::CompressedData(CompressedData::try_from_buf(body)?),
            Tag::PublicKeyEncryptedSessionKey => Packet::PublicKeyEncryptedSessionKey(
                PublicKeyEncryptedSessionKey::try_from_buf(body)?,
            ),
            Tag::SymKeyEncryptedSessionKey => {
                Packet::SymKeyEncryptedSessionKey(SymKeyEncryptedSessionKey::try_from_buf(body)?)
            }
            Tag::SymEncryptedProtectedData => {
                Packet::SymEncryptedProtectedData(SymEncryptedProtectedData::try_from_buf(body)?)
            }
            Tag::SymEncryptedData => {
                unsupported_err!("symmetrically encrypted data without integrity protection")
            }
            Tag::Marker => Packet::Marker(Marker::try_from_buf(body)?),
            Tag::Trust => Packet::Trust(Trust::try_from_buf(body)?),
            Tag::Padding => Packet::Padding(Padding::try_from_buf(body)?),
            Tag::ModDetectionCode | Tag::Other(_) => Packet::Unknown { tag, body },
        };
        Ok(packet)
    }

    /// Whether this packet starts a new entity.
    pub fn is_primary_key(&self) -> bool {
        matches!(
            self,
            Self::PublicKey(_)
                | Self::SecretKey(_)
                | Self::UnsupportedKey {
                    tag: Tag::PublicKey | Tag::SecretKey,
                    ..
                }
        )
    }

    pub fn tag(&self) -> Tag {
        match self {
            Self::PublicKey(p) => p.tag(),
            Self::PublicSubkey(p) => p.tag(),
            Self::SecretKey(p) => p.tag(),
            Self::SecretSubkey(p) => p.tag(),
            Self::UserId(p) => p.tag(),
            Self::UserAttribute(p) => p.tag(),
            Self::Signature(p) => p.tag(),
            Self::OnePassSignature(p) => p.tag(),
            Self::LiteralData(p) => p.tag(),
            Self::CompressedData(p) => p.tag(),
            Self::PublicKeyEncryptedSessionKey(p) => p.tag(),
            Self::SymKeyEncryptedSessionKey(p) => p.tag(),
            Self::SymEncryptedProtectedData(p) => p.tag(),
            Self::Marker(p) => p.tag(),
            Self::Trust(p) => p.tag(),
            Self::Padding(p) => p.tag(),
            Self::Unknown { tag, .. } | Self::UnsupportedKey { tag, .. } => *tag,
        }
    }
}

/// Serializes the packet including its header.
impl Serialize for Packet {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Self::PublicKey(p) => p.to_writer_with_header(writer),
            Self::PublicSubkey(p) => p.to_writer_with_header(writer),
            Self::SecretKey(p) => p.to_writer_with_header(writer),
            Self::SecretSubkey(p) => p.to_writer_with_header(writer),
            Self::UserId(p) => p.to_writer_with_header(writer),
            Self::UserAttribute(p) => p.to_writer_with_header(writer),
            Self::Signature(p) => p.to_writer_with_header(writer),
            Self::OnePassSignature(p) => p.to_writer_with_header(writer),
            Self::LiteralData(p) => p.to_writer_with_header(writer),
            Self::CompressedData(p) => p.to_writer_with_header(writer),
            Self::PublicKeyEncryptedSessionKey(p) => p.to_writer_with_header(writer),
            Self::SymKeyEncryptedSessionKey(p) => p.to_writer_with_header(writer),
            Self::SymEncryptedProtectedData(p) => p.to_writer_with_header(writer),
            Self::Marker(p) => p.to_writer_with_header(writer),
            Self::Trust(p) => p.to_writer_with_header(writer),
            Self::Padding(p) => p.to_writer_with_header(writer),
            Self::Unknown { tag, body } | Self::UnsupportedKey { tag, body } => {
                tag.write_header(writer, body.len())?;
                writer.write_all(body)?;
                Ok(())
            }
        }
    }

    fn write_len(&self) -> usize {
        match self {
            Self::PublicKey(p) => p.write_len_with_header(),
            Self::PublicSubkey(p) => p.write_len_with_header(),
            Self::SecretKey(p) => p.write_len_with_header(),
            Self::SecretSubkey(p) => p.write_len_with_header(),
            Self::UserId(p) => p.write_len_with_header(),
            Self::UserAttribute(p) => p.write_len_with_header(),
            Self::Signature(p) => p.write_len_with_header(),
            Self::OnePassSignature(p) => p.write_len_with_header(),
            Self::LiteralData(p) => p.write_len_with_header(),
            Self::CompressedData(p) => p.write_len_with_header(),
            Self::PublicKeyEncryptedSessionKey(p) => p.write_len_with_header(),
            Self::SymKeyEncryptedSessionKey(p) => p.write_len_with_header(),
            Self::SymEncryptedProtectedData(p) => p.write_len_with_header(),
            Self::Marker(p) => p.write_len_with_header(),
            Self::Trust(p) => p.write_len_with_header(),
            Self::Padding(p) => p.write_len_with_header(),
            Self::Unknown { body, .. } | Self::UnsupportedKey { body, .. } => {
                Tag::header_len(body.len()) + body.len()
            }
        }
    }
}

macro_rules! impl_from_packet {
    ($( $name:ident => $variant_type:ty ),*) => {
        $(
            impl From<$variant_type> for Packet {
                fn from(other: $variant_type) -> Packet {
                    Packet::$name(other)
                }
            }
        )*
    }
}

impl_from_packet!(
    UserId => UserId,
    UserAttribute => UserAttribute,
    Signature => Signature,
    OnePassSignature => OnePassSignature,
    LiteralData => LiteralData,
    CompressedData => CompressedData,
    PublicKeyEncryptedSessionKey => PublicKeyEncryptedSessionKey,
    SymKeyEncryptedSessionKey => SymKeyEncryptedSessionKey,
    SymEncryptedProtectedData => SymEncryptedProtectedData,
    Marker => Marker,
    Trust => Trust,
    Padding => Padding
);

impl From<PublicKey> for Packet {
    fn from(key: PublicKey) -> Packet {
        if key.is_subkey() {
            Packet::PublicSubkey(key)
        } else {
            Packet::PublicKey(key)
        }
    }
}

impl From<SecretKey> for Packet {
    fn from(key: SecretKey) -> Packet {
        if key.is_subkey() {
            Packet::SecretSubkey(key)
        } else {
            Packet::SecretKey(key)
        }
    }
}
