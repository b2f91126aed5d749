//! SS58 text encoding for 32-byte account ids.
//!
//! Layout: `base58(prefix || account_id || checksum)` where the checksum is the
//! first two bytes of `blake2b-512("SS58PRE" || prefix || account_id)`.

use blake2::{Blake2b512, Digest};

use crate::error::{IdentityError, Result};

pub const ACCOUNT_ID_LEN: usize = 32;
/// Largest format that fits the two-byte prefix form.
pub const MAX_FORMAT: u16 = 0b0011_1111_1111_1111;

const CHECKSUM_PREIMAGE: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;

fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREIMAGE);
    hasher.update(data);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}

fn prefix_bytes(format: u16) -> Vec<u8> {
    match format {
        0..=63 => vec![format as u8],
        _ => {
            let first = ((format & 0b0000_0000_1111_1100) as u8) >> 2;
            let second = ((format >> 8) as u8) | (((format & 0b0000_0000_0000_0011) as u8) << 6);
            vec![first | 0b0100_0000, second]
        }
    }
}

pub fn encode(format: u16, account: &[u8; ACCOUNT_ID_LEN]) -> Result<String> {
    if format > MAX_FORMAT {
        return Err(IdentityError::InvalidAddressFormat(format!(
            "SS58 format {} exceeds {}",
            format, MAX_FORMAT
        )));
    }

    let mut data = prefix_bytes(format);
    data.extend_from_slice(account);
    let sum = checksum(&data);
    data.extend_from_slice(&sum);

    Ok(bs58::encode(data).into_string())
}

/// Decodes an SS58 string into `(format, account_id)`.
pub fn decode(address: &str) -> Result<(u16, [u8; ACCOUNT_ID_LEN])> {
    let invalid = |reason: &str| IdentityError::InvalidAddressFormat(format!("{}: {}", address, reason));

    let data = bs58::decode(address)
        .into_vec()
        .map_err(|_| invalid("not base58"))?;
    if data.len() < 2 {
        return Err(invalid("too short"));
    }

    let (prefix_len, format) = match data[0] {
        0..=63 => (1, data[0] as u16),
        64..=127 => {
            let lower = (data[0] << 2) | (data[1] >> 6);
            let upper = data[1] & 0b0011_1111;
            (2, (lower as u16) | ((upper as u16) << 8))
        }
        _ => return Err(invalid("reserved prefix")),
    };

    if data.len() != prefix_len + ACCOUNT_ID_LEN + CHECKSUM_LEN {
        return Err(invalid("unexpected payload length"));
    }

    let body_len = data.len() - CHECKSUM_LEN;
    if checksum(&data[..body_len]) != data[body_len..] {
        return Err(invalid("bad checksum"));
    }

    let mut account = [0u8; ACCOUNT_ID_LEN];
    account.copy_from_slice(&data[prefix_len..body_len]);
    Ok((format, account))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Alice's well-known dev key.
    const ALICE_HEX: &str = "d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const ALICE_GENERIC: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    fn alice() -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&hex::decode(ALICE_HEX).unwrap());
        out
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(encode(42, &alice()).unwrap(), ALICE_GENERIC);
        assert_eq!(decode(ALICE_GENERIC).unwrap(), (42, alice()));
    }

    #[test]
    fn test_two_byte_prefix_roundtrip() {
        for format in [64u16, 255, 1284, MAX_FORMAT] {
            let encoded = encode(format, &alice()).unwrap();
            assert_eq!(decode(&encoded).unwrap(), (format, alice()));
        }
    }

    #[test]
    fn test_rejects_bad_checksum() {
        let mut chars: Vec<char> = ALICE_GENERIC.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'Y' { 'Z' } else { 'Y' };
        let tampered: String = chars.into_iter().collect();
        assert!(decode(&tampered).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_format() {
        assert!(encode(MAX_FORMAT + 1, &alice()).is_err());
    }
}
