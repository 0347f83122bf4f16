use bitfield::bitfield;
use num_enum::{FromPrimitive, IntoPrimitive};
use smallvec::{smallvec, SmallVec};

/// The only signature version handled by this crate.
pub const SIGNATURE_VERSION: u8 = 4;

/// Features bit announcing support for SEIPDv1.
pub const FEATURE_SEIPD_V1: u8 = 0x01;
/// Features bit announcing support for SEIPDv2 (AEAD).
pub const FEATURE_SEIPD_V2: u8 = 0x08;

#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SignatureType {
    /// Signature of a binary document.
    Binary = 0x00,
    /// Signature of a canonical text document.
    /// The signature is calculated over the text data with its line endings
    /// converted to `<CR><LF>`.
    Text = 0x01,
    /// Standalone signature.
    Standalone = 0x02,
    /// Generic certification of a User ID and Public-Key packet.
    CertGeneric = 0x10,
    /// Persona certification of a User ID and Public-Key packet.
    CertPersona = 0x11,
    /// Casual certification of a User ID and Public-Key packet.
    CertCasual = 0x12,
    /// Positive certification of a User ID and Public-Key packet.
    CertPositive = 0x13,
    /// Subkey Binding Signature
    /// A signature that binds a signing subkey MUST have an Embedded Signature
    /// subpacket that contains a 0x19 signature made by the signing subkey on
    /// the primary key and subkey.
    SubkeyBinding = 0x18,
    /// Primary Key Binding Signature
    /// Calculated the same way as a 0x18 signature, but made by the subkey.
    KeyBinding = 0x19,
    /// Signature directly on a key
    Key = 0x1F,
    /// Key revocation signature
    KeyRevocation = 0x20,
    /// Subkey revocation signature
    SubkeyRevocation = 0x28,
    /// Certification revocation signature
    /// This signature revokes an earlier User ID certification signature.
    CertRevocation = 0x30,
    /// Timestamp signature.
    Timestamp = 0x40,
    /// Third-Party Confirmation signature.
    ThirdParty = 0x50,

    #[num_enum(catch_all)]
    Other(u8),
}

impl SignatureType {
    /// Signature types allowed directly after a User ID packet.
    pub fn is_certification(self) -> bool {
        matches!(
            self,
            SignatureType::CertGeneric
                | SignatureType::CertPersona
                | SignatureType::CertCasual
                | SignatureType::CertPositive
                | SignatureType::CertRevocation
        )
    }
}

bitfield! {
    #[derive(Default, PartialEq, Eq, Copy, Clone)]
    pub struct KeyFlags(u8);
    impl Debug;

    pub certify, set_certify: 0;
    pub sign, set_sign: 1;
    pub encrypt_comms, set_encrypt_comms: 2;
    pub encrypt_storage, set_encrypt_storage: 3;
    pub shared, set_shared: 4;
    pub authentication, set_authentication: 5;
    pub group, set_group: 7;
}

impl KeyFlags {
    /// Whether every flag set in `other` is also set here.
    pub fn contains(self, other: KeyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl<'a> From<&'a [u8]> for KeyFlags {
    fn from(other: &'a [u8]) -> Self {
        if other.is_empty() {
            Default::default()
        } else {
            KeyFlags(other[0])
        }
    }
}

impl From<u8> for KeyFlags {
    fn from(bits: u8) -> Self {
        KeyFlags(bits)
    }
}

impl From<KeyFlags> for SmallVec<[u8; 1]> {
    fn from(flags: KeyFlags) -> Self {
        smallvec![flags.0]
    }
}

/// Codes for revocation reasons
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RevocationCode {
    /// No reason specified (key revocations or cert revocations)
    NoReason = 0,
    /// Key is superseded (key revocations)
    KeySuperseded = 1,
    /// Key material has been compromised (key revocations)
    KeyCompromised = 2,
    /// Key is retired and no longer used (key revocations)
    KeyRetired = 3,
    /// User ID information is no longer valid (cert revocations)
    CertUserIdInvalid = 32,

    /// Undefined code
    #[num_enum(catch_all)]
    Other(u8),
}
