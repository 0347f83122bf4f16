use std::fmt;

use crate::errors::{Error, Result};

/// Represents a Key ID, the low 64 bits of a v4 fingerprint.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct KeyId([u8; 8]);

impl AsRef<[u8]> for KeyId {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl From<[u8; 8]> for KeyId {
    fn from(value: [u8; 8]) -> Self {
        Self(value)
    }
}

impl From<u64> for KeyId {
    fn from(value: u64) -> Self {
        Self(value.to_be_bytes())
    }
}

impl From<KeyId> for u64 {
    fn from(value: KeyId) -> Self {
        u64::from_be_bytes(value.0)
    }
}

impl KeyId {
    /// The all-zero id, matching any key in lookups.
    pub const WILDCARD: KeyId = KeyId([0u8; 8]);

    pub fn from_slice(input: &[u8]) -> Result<KeyId> {
        let r: [u8; 8] = input
            .try_into()
            .map_err(|_| Error::Message {
                message: format!("invalid key id length {}", input.len()),
            })?;

        Ok(KeyId(r))
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }

    /// Wildcards match every id.
    pub fn matches(&self, other: &KeyId) -> bool {
        self.is_wildcard() || self == other
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KeyId({})", hex::encode(self.as_ref()))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.as_ref()))
    }
}
