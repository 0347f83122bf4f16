use num_enum::{FromPrimitive, IntoPrimitive};

/// Public key algorithm ids.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-public-key-algorithms>
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, FromPrimitive, IntoPrimitive, derive_more::Display)]
#[repr(u8)]
pub enum PublicKeyAlgorithm {
    /// RSA (Encrypt and Sign)
    #[display("RSA")]
    RSA = 1,
    /// DEPRECATED: RSA (Encrypt-Only)
    #[display("RSAEncrypt")]
    RSAEncrypt = 2,
    /// DEPRECATED: RSA (Sign-Only)
    #[display("RSASign")]
    RSASign = 3,
    /// Elgamal (Encrypt-Only)
    #[display("Elgamal")]
    Elgamal = 16,
    /// DSA (Digital Signature Algorithm)
    #[display("DSA")]
    DSA = 17,
    /// Elliptic Curve: RFC-6637
    #[display("ECDH")]
    ECDH = 18,
    /// ECDSA: RFC-6637
    #[display("ECDSA")]
    ECDSA = 19,
    /// DEPRECATED: Elgamal (Encrypt and Sign)
    #[display("ElgamalEncryptSign")]
    ElgamalEncryptSign = 20,
    /// EdDSA legacy format [deprecated in RFC 9580, superseded by Ed25519 (27)]
    #[display("EdDSALegacy")]
    EdDSALegacy = 22,

    /// X25519 [RFC 9580]
    #[display("X25519")]
    X25519 = 25,
    /// X448 [RFC 9580]
    #[display("X448")]
    X448 = 26,
    /// Ed25519 [RFC 9580]
    #[display("Ed25519")]
    Ed25519 = 27,
    /// Ed448 [RFC 9580]
    #[display("Ed448")]
    Ed448 = 28,

    #[num_enum(catch_all)]
    #[display("Unknown({_0})")]
    Unknown(u8),
}

impl PublicKeyAlgorithm {
    /// Whether keys of this algorithm can make signatures.
    pub fn can_sign(self) -> bool {
        use PublicKeyAlgorithm::*;

        matches!(self, RSA | RSASign | DSA | ECDSA | EdDSALegacy | Ed25519 | Ed448)
    }

    /// Whether keys of this algorithm can encrypt session keys.
    pub fn can_encrypt(self) -> bool {
        use PublicKeyAlgorithm::*;

        matches!(self, RSA | RSAEncrypt | Elgamal | ECDH | X25519 | X448)
    }
}
