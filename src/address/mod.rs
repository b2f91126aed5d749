//! Address codec for the two address spaces.
//!
//! - `SpaceA`: SS58 account addresses (32-byte ids, prefix is cosmetic)
//! - `SpaceB`: EVM hex addresses (20-byte ids)
//!
//! Every conversion is pure and local; nothing here touches the network.

pub mod evm;
pub mod ss58;

use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, Result};

/// Generic substrate format, used when the live chain prefix is unknown.
pub const DEFAULT_FORMAT: u16 = 42;

/// Marker of a SpaceA account id that embeds an EVM address:
/// `b"evm:" || h160 || [0u8; 8]`.
const MIRROR_TAG: &[u8; 4] = b"evm:";
const MIRROR_PADDING: usize = ss58::ACCOUNT_ID_LEN - MIRROR_TAG.len() - evm::H160_LEN;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    SpaceA,
    SpaceB,
    Unrecognized,
}

impl AddressKind {
    pub fn opposite(self) -> AddressKind {
        match self {
            AddressKind::SpaceA => AddressKind::SpaceB,
            AddressKind::SpaceB => AddressKind::SpaceA,
            AddressKind::Unrecognized => AddressKind::Unrecognized,
        }
    }
}

/// An address reduced to its identity bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedAddress {
    SpaceA { format: u16, account: [u8; ss58::ACCOUNT_ID_LEN] },
    SpaceB([u8; evm::H160_LEN]),
}

impl DecodedAddress {
    pub fn kind(&self) -> AddressKind {
        match self {
            DecodedAddress::SpaceA { .. } => AddressKind::SpaceA,
            DecodedAddress::SpaceB(_) => AddressKind::SpaceB,
        }
    }

    /// Identity bytes; the SS58 format is deliberately excluded.
    pub fn identity(&self) -> &[u8] {
        match self {
            DecodedAddress::SpaceA { account, .. } => account,
            DecodedAddress::SpaceB(h160) => h160,
        }
    }

    pub fn same_identity(&self, other: &DecodedAddress) -> bool {
        self.kind() == other.kind() && self.identity() == other.identity()
    }
}

/// Decodes either address space, `InvalidAddressFormat` otherwise.
pub fn decode(address: &str) -> Result<DecodedAddress> {
    if address.starts_with("0x") {
        return evm::decode(address).map(DecodedAddress::SpaceB);
    }
    let (format, account) = ss58::decode(address)?;
    Ok(DecodedAddress::SpaceA { format, account })
}

/// Shape/checksum classification. Never fails.
pub fn classify(address: &str) -> AddressKind {
    match decode(address) {
        Ok(decoded) => decoded.kind(),
        Err(_) => AddressKind::Unrecognized,
    }
}

/// True iff both addresses decode to the same identity bytes in the same
/// space, regardless of SS58 prefix or hex letter case.
pub fn equals(a: &str, b: &str) -> bool {
    match (decode(a), decode(b)) {
        (Ok(left), Ok(right)) => left.same_identity(&right),
        _ => false,
    }
}

/// Cross-space counterpart of a decoded address.
///
/// SpaceB embeds into SpaceA with the `evm:` tag; the tagged form strips back
/// exactly. Native SpaceA keys project onto their first 20 bytes, which loses
/// the other 12, so for them mirroring twice does not return the original
/// identity. Only the projection is stable: mirroring the result twice more
/// yields the same EVM address again.
pub fn mirror(decoded: &DecodedAddress) -> DecodedAddress {
    match decoded {
        DecodedAddress::SpaceB(h160) => {
            let mut account = [0u8; ss58::ACCOUNT_ID_LEN];
            account[..MIRROR_TAG.len()].copy_from_slice(MIRROR_TAG);
            account[MIRROR_TAG.len()..MIRROR_TAG.len() + evm::H160_LEN].copy_from_slice(h160);
            DecodedAddress::SpaceA { format: DEFAULT_FORMAT, account }
        }
        DecodedAddress::SpaceA { account, .. } => {
            let mut h160 = [0u8; evm::H160_LEN];
            match embedded_h160(account) {
                Some(inner) => h160.copy_from_slice(inner),
                None => h160.copy_from_slice(&account[..evm::H160_LEN]),
            }
            DecodedAddress::SpaceB(h160)
        }
    }
}

fn embedded_h160(account: &[u8; ss58::ACCOUNT_ID_LEN]) -> Option<&[u8]> {
    let tail = &account[MIRROR_TAG.len() + evm::H160_LEN..];
    if &account[..MIRROR_TAG.len()] == MIRROR_TAG && tail == [0u8; MIRROR_PADDING] {
        Some(&account[MIRROR_TAG.len()..MIRROR_TAG.len() + evm::H160_LEN])
    } else {
        None
    }
}

/// True when a SpaceA address is the embedding of some EVM address.
pub fn is_mirror_form(address: &str) -> bool {
    matches!(decode(address), Ok(DecodedAddress::SpaceA { account, .. }) if embedded_h160(&account).is_some())
}

/// Format-aware encoder for the current chain.
///
/// `format` is the live chain prefix when known; when it is `None` every
/// SpaceA rendering falls back to `default_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressCodec {
    format: Option<u16>,
    default_format: u16,
}

impl Default for AddressCodec {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AddressCodec {
    pub fn new(format: Option<u16>) -> Self {
        Self {
            format,
            default_format: DEFAULT_FORMAT,
        }
    }

    pub fn with_default_format(mut self, default_format: u16) -> Self {
        self.default_format = default_format;
        self
    }

    /// Live chain prefix, if the chain reported one.
    pub fn live_format(&self) -> Option<u16> {
        self.format
    }

    /// Prefix actually used for SpaceA output.
    pub fn format(&self) -> u16 {
        self.format.unwrap_or(self.default_format)
    }

    pub fn classify(&self, address: &str) -> AddressKind {
        classify(address)
    }

    pub fn equals(&self, a: &str, b: &str) -> bool {
        equals(a, b)
    }

    pub fn encode(&self, decoded: &DecodedAddress, format: Option<u16>) -> Result<String> {
        match decoded {
            DecodedAddress::SpaceA { account, .. } => {
                ss58::encode(format.unwrap_or_else(|| self.format()), account)
            }
            DecodedAddress::SpaceB(h160) => Ok(evm::to_checksum(h160)),
        }
    }

    /// Re-encodes an address canonically: SpaceA under `format` (or the
    /// codec's format), SpaceB in EIP-55 form.
    pub fn normalize(&self, address: &str, format: Option<u16>) -> Result<String> {
        let decoded = decode(address)?;
        self.encode(&decoded, format)
    }

    /// Cross-space counterpart, rendered with the codec's format.
    pub fn to_mirror(&self, address: &str) -> Result<String> {
        let decoded = decode(address).map_err(|_| {
            IdentityError::InvalidAddressFormat(format!("cannot mirror unrecognized address {}", address))
        })?;
        self.encode(&mirror(&decoded), None)
    }
}
