//! Electronic key value conversion.
//!
//! The device reports a 48-bit key as 12 upper-case hex characters. All
//! zero bits mean no key is present. Applications may ask for the key as 6
//! raw bytes instead.

use combi_core::{Error, Result, constants::EKEY_HEX_LEN};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Convert the hex-ASCII key value into raw bytes.
///
/// # Errors
///
/// Fails on odd lengths and on characters that are not upper-case hex
/// digits.
///
/// # Example
///
/// ```
/// use combi_protocol::ekey::to_binary;
///
/// assert_eq!(to_binary(b"00FF10").unwrap(), vec![0x00, 0xFF, 0x10]);
/// ```
pub fn to_binary(hex: &[u8]) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(invalid(hex));
    }
    hex.chunks_exact(2)
        .map(|pair| {
            let high = nibble(pair[0]).ok_or_else(|| invalid(hex))?;
            let low = nibble(pair[1]).ok_or_else(|| invalid(hex))?;
            Ok((high << 4) | low)
        })
        .collect()
}

/// Convert raw key bytes into the device's hex-ASCII form.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX_DIGITS[(b >> 4) as usize] as char);
        out.push(HEX_DIGITS[(b & 0x0F) as usize] as char);
    }
    out
}

/// Whether a hex key value means "no key present".
pub fn is_absent(hex: &[u8]) -> bool {
    hex.len() == EKEY_HEX_LEN && hex.iter().all(|&c| c == b'0')
}

fn nibble(c: u8) -> Option<u8> {
    HEX_DIGITS.iter().position(|&d| d == c).map(|i| i as u8)
}

fn invalid(hex: &[u8]) -> Error {
    Error::invalid_field("electronic key", String::from_utf8_lossy(hex).into_owned())
}
