use crate::account::AccountMap;
use crate::address::{AddressCodec, AddressKind};

/// How a balance event's address was matched to a map key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Exact(String),
    Mirror(String),
    /// Several keys mirror to the event address; nothing is applied.
    Ambiguous(Vec<String>),
    Unresolved,
}

impl Resolution {
    /// Key to update, if the event resolved to exactly one account.
    pub fn key(&self) -> Option<&str> {
        match self {
            Resolution::Exact(key) | Resolution::Mirror(key) => Some(key),
            Resolution::Ambiguous(_) | Resolution::Unresolved => None,
        }
    }
}

/// Finds the account a balance event belongs to.
///
/// An exact (ASCII case-insensitive) key match wins. Next comes a key in the
/// same space with the same identity, which covers SpaceA addresses encoded
/// under another prefix. Otherwise every key in the opposite address space is
/// mirrored and compared by identity with the event address. Unknown
/// addresses resolve to `Unresolved`; that is the normal case for addresses
/// outside the directory.
pub fn resolve_event(map: &AccountMap, codec: &AddressCodec, address: &str) -> Resolution {
    if let Some(key) = map.find_key_ignore_case(address) {
        return Resolution::Exact(key.clone());
    }

    let event_kind = codec.classify(address);
    if event_kind == AddressKind::Unrecognized {
        return Resolution::Unresolved;
    }

    let mut same_space: Vec<String> = map
        .keys()
        .filter(|key| codec.classify(key) == event_kind && codec.equals(key, address))
        .cloned()
        .collect();
    match same_space.len() {
        0 => {}
        1 => return Resolution::Exact(same_space.remove(0)),
        _ => return Resolution::Ambiguous(same_space),
    }

    let candidate_kind = event_kind.opposite();

    let mut matches: Vec<String> = map
        .keys()
        .filter(|key| codec.classify(key) == candidate_kind)
        .filter(|key| match codec.to_mirror(key) {
            Ok(mirror) => codec.equals(&mirror, address),
            Err(_) => false,
        })
        .cloned()
        .collect();

    match matches.len() {
        0 => Resolution::Unresolved,
        1 => Resolution::Mirror(matches.remove(0)),
        _ => Resolution::Ambiguous(matches),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::types::tests::test_account;
    use crate::address::{evm, ss58};

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const EVM: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn map_of(addresses: &[&str]) -> AccountMap {
        addresses.iter().map(|a| test_account("acct", a)).collect()
    }

    #[test]
    fn test_exact_ignores_case() {
        let map = map_of(&[EVM]);
        let codec = AddressCodec::default();
        assert_eq!(
            resolve_event(&map, &codec, &EVM.to_lowercase()),
            Resolution::Exact(EVM.to_string())
        );
    }

    #[test]
    fn test_mirror_both_directions() {
        let codec = AddressCodec::default();

        let map = map_of(&[ALICE]);
        let mirror = codec.to_mirror(ALICE).unwrap();
        assert_eq!(resolve_event(&map, &codec, &mirror), Resolution::Mirror(ALICE.to_string()));

        let map = map_of(&[EVM]);
        let mirror = AddressCodec::new(Some(0)).to_mirror(EVM).unwrap();
        assert_eq!(resolve_event(&map, &codec, &mirror), Resolution::Mirror(EVM.to_string()));
    }

    #[test]
    fn test_other_prefix_matches_same_identity() {
        let codec = AddressCodec::default();
        let map = map_of(&[ALICE]);
        let polkadot = codec.normalize(ALICE, Some(0)).unwrap();
        assert_ne!(polkadot, ALICE);
        assert_eq!(resolve_event(&map, &codec, &polkadot), Resolution::Exact(ALICE.to_string()));
    }

    #[test]
    fn test_unknown_and_garbage() {
        let codec = AddressCodec::default();
        let map = map_of(&[ALICE]);
        assert_eq!(
            resolve_event(&map, &codec, "0x0000000000000000000000000000000000000001"),
            Resolution::Unresolved
        );
        assert_eq!(resolve_event(&map, &codec, "garbage"), Resolution::Unresolved);
        assert_eq!(Resolution::Unresolved.key(), None);
    }

    #[test]
    fn test_colliding_mirrors_are_ambiguous() {
        let mut second = [1u8; 32];
        second[20..].copy_from_slice(&[2u8; 12]);
        let a = ss58::encode(42, &[1u8; 32]).unwrap();
        let b = ss58::encode(42, &second).unwrap();
        let map = map_of(&[a.as_str(), b.as_str()]);

        let event = evm::to_checksum(&[1u8; 20]);
        let resolution = resolve_event(&map, &AddressCodec::default(), &event);

        assert_eq!(resolution, Resolution::Ambiguous(vec![a, b]));
        assert_eq!(resolution.key(), None);
    }
}
