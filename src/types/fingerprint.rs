use std::fmt;

use crate::errors::{Error, Result};
use crate::types::KeyId;

/// Represents a v4 key fingerprint.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    pub const LEN: usize = 20;

    pub fn from_slice(fp: &[u8]) -> Result<Self> {
        let fp: [u8; 20] = fp.try_into().map_err(|_| Error::Message {
            message: format!("invalid fingerprint length {}", fp.len()),
        })?;
        Ok(Self(fp))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }

    /// The key id is the low 64 bits of the fingerprint.
    pub fn key_id(&self) -> KeyId {
        let mut id = [0u8; 8];
        id.copy_from_slice(&self.0[12..]);
        KeyId::from(id)
    }
}

impl From<[u8; 20]> for Fingerprint {
    fn from(value: [u8; 20]) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fingerprint({})", hex::encode(self.0))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}
