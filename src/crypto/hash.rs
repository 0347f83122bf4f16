use digest::{Digest, DynDigest};
use md5::Md5;
use num_enum::{FromPrimitive, IntoPrimitive};
use ripemd::Ripemd160;
use sha1_checked::{CollisionResult, Sha1};

use crate::errors::Result;

/// Hash algorithm ids this crate reads, writes or negotiates. Anything else is
/// kept as [`HashAlgorithm::Other`] and has no hasher.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-hash-algorithms>
#[derive(
    Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive, Hash, derive_more::Display,
)]
#[repr(u8)]
pub enum HashAlgorithm {
    #[display("NONE")]
    None = 0,
    #[display("MD5")]
    Md5 = 1,
    #[display("SHA1")]
    Sha1 = 2,
    #[display("RIPEMD160")]
    Ripemd160 = 3,
    #[display("SHA256")]
    Sha256 = 8,
    #[display("SHA384")]
    Sha384 = 9,
    #[display("SHA512")]
    Sha512 = 10,
    #[display("SHA224")]
    Sha224 = 11,

    #[num_enum(catch_all)]
    #[display("Other({_0})")]
    Other(u8),
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Sha256
    }
}

impl HashAlgorithm {
    /// A streaming hasher. SHA-1 hashers run collision detection.
    pub fn new_hasher(self) -> Result<Box<dyn DynDigest>> {
        Ok(match self {
            HashAlgorithm::Md5 => Box::<Md5>::default(),
            HashAlgorithm::Sha1 => Box::<Sha1>::default(),
            HashAlgorithm::Ripemd160 => Box::<Ripemd160>::default(),
            HashAlgorithm::Sha256 => Box::<sha2::Sha256>::default(),
            HashAlgorithm::Sha384 => Box::<sha2::Sha384>::default(),
            HashAlgorithm::Sha512 => Box::<sha2::Sha512>::default(),
            HashAlgorithm::Sha224 => Box::<sha2::Sha224>::default(),
            HashAlgorithm::None | HashAlgorithm::Other(_) => {
                unsupported_err!("hasher {:?}", self)
            }
        })
    }

    /// Digest of a complete buffer. Fails on detected SHA-1 collisions.
    pub fn digest(self, data: &[u8]) -> Result<Vec<u8>> {
        if self == HashAlgorithm::Sha1 {
            return match Sha1::try_digest(data) {
                CollisionResult::Ok(output) => Ok(output.to_vec()),
                CollisionResult::Collision(_) | CollisionResult::Mitigated(_) => {
                    bail!("SHA1 hash collision detected")
                }
            };
        }
        let mut hasher = self.new_hasher()?;
        hasher.update(data);
        Ok(hasher.finalize().to_vec())
    }

    /// Digest size in octets, `None` for algorithms without a hasher.
    pub fn digest_size(self) -> Option<usize> {
        let size = match self {
            HashAlgorithm::Md5 => <Md5 as Digest>::output_size(),
            HashAlgorithm::Sha1 => <Sha1 as Digest>::output_size(),
            HashAlgorithm::Ripemd160 => <Ripemd160 as Digest>::output_size(),
            HashAlgorithm::Sha256 => <sha2::Sha256 as Digest>::output_size(),
            HashAlgorithm::Sha384 => <sha2::Sha384 as Digest>::output_size(),
            HashAlgorithm::Sha512 => <sha2::Sha512 as Digest>::output_size(),
            HashAlgorithm::Sha224 => <sha2::Sha224 as Digest>::output_size(),
            HashAlgorithm::None | HashAlgorithm::Other(_) => return None,
        };
        Some(size)
    }
}

impl zeroize::DefaultIsZeroes for HashAlgorithm {}
