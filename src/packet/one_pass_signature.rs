use std::io;

use bytes::Buf;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::Result;
use crate::packet::{PacketTrait, SignatureType};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{KeyId, Tag};

const OPS_VERSION: u8 = 3;

/// One-Pass Signature Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-one-pass-signature-packet-t>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnePassSignature {
    pub typ: SignatureType,
    pub hash_alg: HashAlgorithm,
    pub pub_alg: PublicKeyAlgorithm,
    pub key_id: KeyId,
    /// Whether the signature is not nested around another one-pass signature.
    pub is_last: bool,
}

impl OnePassSignature {
    pub fn new(
        typ: SignatureType,
        hash_alg: HashAlgorithm,
        pub_alg: PublicKeyAlgorithm,
        key_id: KeyId,
    ) -> Self {
        OnePassSignature {
            typ,
            hash_alg,
            pub_alg,
            key_id,
            is_last: true,
        }
    }

    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != OPS_VERSION {
            unsupported_err!("one-pass signature version {}", version);
        }
        let typ = SignatureType::from(i.read_u8()?);
        let hash_alg = HashAlgorithm::from(i.read_u8()?);
        let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
        let key_id = KeyId::from(i.read_array::<8>()?);
        let is_last = i.read_u8()? != 0;

        Ok(OnePassSignature {
            typ,
            hash_alg,
            pub_alg,
            key_id,
            is_last,
        })
    }
}

impl Serialize for OnePassSignature {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[
            OPS_VERSION,
            self.typ.into(),
            self.hash_alg.into(),
            self.pub_alg.into(),
        ])?;
        writer.write_all(self.key_id.as_ref())?;
        writer.write_all(&[u8::from(self.is_last)])?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        4 + 8 + 1
    }
}

impl PacketTrait for OnePassSignature {
    fn tag(&self) -> Tag {
        Tag::OnePassSignature
    }
}
