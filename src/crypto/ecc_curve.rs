use bytes::Bytes;

/// DER encoded OID of Ed25519, as used by `EdDSALegacy` keys.
const ED25519_OID: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01];
/// DER encoded OID of Curve25519, as used by `ECDH` keys.
const CURVE25519_OID: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05, 0x01];

/// Named curves of the RFC 6637 style ECC keys.
///
/// Only the Curve25519 family is interpreted. Other curves are kept by OID, so
/// their keys survive reading and writing.
#[derive(Clone, PartialEq, Eq, derive_more::Debug, derive_more::Display)]
pub enum EccCurve {
    #[display("Curve25519")]
    Curve25519,
    #[display("Ed25519")]
    Ed25519,
    #[display("unknown curve {}", hex::encode(_0))]
    Unknown(#[debug("{}", hex::encode(_0))] Bytes),
}

impl EccCurve {
    pub fn from_oid(oid: Bytes) -> Self {
        match &oid[..] {
            ED25519_OID => EccCurve::Ed25519,
            CURVE25519_OID => EccCurve::Curve25519,
            _ => EccCurve::Unknown(oid),
        }
    }

    pub fn oid(&self) -> &[u8] {
        match self {
            EccCurve::Curve25519 => CURVE25519_OID,
            EccCurve::Ed25519 => ED25519_OID,
            EccCurve::Unknown(oid) => oid,
        }
    }
}
