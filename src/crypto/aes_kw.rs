use aes_kw::{KekAes128, KekAes192, KekAes256};
use cipher::generic_array::GenericArray;
use zeroize::Zeroizing;

use crate::errors::Result;

/// AES Key Wrap
/// As defined in RFC 3394.
pub fn wrap(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let res = match key.len() {
        16 => KekAes128::new(GenericArray::from_slice(key)).wrap_vec(data)?,
        24 => KekAes192::new(GenericArray::from_slice(key)).wrap_vec(data)?,
        32 => KekAes256::new(GenericArray::from_slice(key)).wrap_vec(data)?,
        size => bail!("invalid aes key wrap key size: {}", size),
    };
    Ok(res)
}

/// AES Key Unwrap
/// As defined in RFC 3394.
pub fn unwrap(key: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let res = match key.len() {
        16 => KekAes128::new(GenericArray::from_slice(key)).unwrap_vec(data)?,
        24 => KekAes192::new(GenericArray::from_slice(key)).unwrap_vec(data)?,
        32 => KekAes256::new(GenericArray::from_slice(key)).unwrap_vec(data)?,
        size => bail!("invalid aes key wrap key size: {}", size),
    };
    Ok(Zeroizing::new(res))
}
