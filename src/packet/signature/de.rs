use bytes::Buf;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::Result;
use crate::packet::signature::subpacket::parse_subpackets;
use crate::packet::{Signature, SignatureConfig, SignatureType, SIGNATURE_VERSION};
use crate::parsing::BufParsing;

impl Signature {
    /// Parses a `Signature` packet body.
    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != SIGNATURE_VERSION {
            unsupported_err!("signature version {}", version);
        }

        let typ = SignatureType::from(i.read_u8()?);
        let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
        let hash_alg = HashAlgorithm::from(i.read_u8()?);

        let hashed_len = i.read_be_u16()?;
        let hashed_area = i.read_take(hashed_len.into())?;
        let hashed_subpackets = parse_subpackets(hashed_area, true)?;

        let unhashed_len = i.read_be_u16()?;
        let unhashed_area = i.read_take(unhashed_len.into())?;
        let unhashed_subpackets = parse_subpackets(unhashed_area, false)?;

        let signed_hash_value = i.read_array::<2>()?;
        let signature = i.rest();

        let config = SignatureConfig {
            typ,
            pub_alg,
            hash_alg,
            hashed_subpackets,
            unhashed_subpackets,
        };
        let sig = Signature::from_config(config, signed_hash_value, signature);
        if sig.created().is_none() {
            structural_err!("signature without creation time");
        }

        Ok(sig)
    }
}
