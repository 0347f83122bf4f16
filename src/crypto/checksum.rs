use digest::Digest;
use sha1_checked::Sha1;

use crate::errors::Result;

/// Two octet checksum: sum of all octets mod 65536.
#[inline]
pub fn calculate_simple(data: &[u8]) -> u16 {
    let sum = data.iter().map(|v| u32::from(*v)).sum::<u32>() & 0xffff;
    sum as u16
}

/// Verifies a two octet checksum.
#[inline]
pub fn simple(actual: [u8; 2], data: &[u8]) -> Result<()> {
    ensure_eq!(
        u16::from_be_bytes(actual),
        calculate_simple(data),
        "invalid simple checksum"
    );

    Ok(())
}

/// SHA1 checksum, first 20 octets.
#[inline]
pub fn calculate_sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

/// Verifies a SHA1 checksum.
#[inline]
pub fn sha1(hash: &[u8], data: &[u8]) -> Result<()> {
    ensure_eq!(hash, &calculate_sha1(data)[..], "invalid SHA1 checksum");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_checksum() {
        assert_eq!(calculate_simple(&[0xff; 300]), ((0xff * 300) & 0xffff) as u16);
        simple(calculate_simple(b"abc").to_be_bytes(), b"abc").unwrap();
        assert!(simple([0, 0], b"abc").is_err());
    }
}
