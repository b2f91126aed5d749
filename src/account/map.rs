use indexmap::IndexMap;
use tracing::debug;

use super::types::{Account, AccountAddress, Balance};
use crate::address;

/// Accounts keyed by native address, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct AccountMap {
    entries: IndexMap<AccountAddress, Account>,
}

impl AccountMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<&Account> {
        self.entries.get(address)
    }

    pub fn contains_key(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    pub fn keys(&self) -> impl Iterator<Item = &AccountAddress> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Account> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AccountAddress, &Account)> {
        self.entries.iter()
    }

    /// Exact key, or the first key equal ignoring ASCII case.
    pub fn find_key_ignore_case(&self, address: &str) -> Option<&AccountAddress> {
        if let Some((key, _)) = self.entries.get_key_value(address) {
            return Some(key);
        }
        self.entries.keys().find(|key| key.eq_ignore_ascii_case(address))
    }

    /// Looks an account up by any encoding of its address.
    pub fn find(&self, address: &str) -> Option<&Account> {
        if let Some(key) = self.find_key_ignore_case(address) {
            return self.entries.get(key);
        }
        self.entries.values().find(|account| address::equals(&account.address, address))
    }

    /// Inserts `incoming`, or merges it into the entry with the same key.
    /// An existing entry keeps its name and signer; the balance follows
    /// [`Balance::newest`]. Returns whether the map changed.
    pub fn merge_account(&mut self, incoming: Account) -> bool {
        match self.entries.get_mut(&incoming.address) {
            Some(existing) => {
                let balance = Balance::newest(existing.balance, incoming.balance);
                if balance == existing.balance {
                    return false;
                }
                existing.balance = balance;
                true
            }
            None => {
                debug!("Adding account {} ({})", incoming.address, incoming.signer_kind);
                self.entries.insert(incoming.address.clone(), incoming);
                true
            }
        }
    }

    pub fn merge(&mut self, other: AccountMap) -> bool {
        let mut changed = false;
        for account in other.entries.into_values() {
            changed |= self.merge_account(account);
        }
        changed
    }

    /// Replaces only the balance of `address`. Returns false when the key is
    /// absent.
    pub fn set_balance(&mut self, address: &str, balance: Balance) -> bool {
        match self.entries.get_mut(address) {
            Some(account) => {
                account.balance = Some(balance);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, address: &str) -> Option<Account> {
        self.entries.shift_remove(address)
    }

    /// Keeps accounts matching `keep`. Returns whether anything was removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&Account) -> bool) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, account| keep(account));
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl FromIterator<Account> for AccountMap {
    fn from_iter<I: IntoIterator<Item = Account>>(iter: I) -> Self {
        let mut map = AccountMap::new();
        for account in iter {
            map.merge_account(account);
        }
        map
    }
}

impl<'a> IntoIterator for &'a AccountMap {
    type Item = (&'a AccountAddress, &'a Account);
    type IntoIter = indexmap::map::Iter<'a, AccountAddress, Account>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
