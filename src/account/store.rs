//! Shared account map with copy-and-replace updates.

use std::sync::Arc;

use tokio::sync::watch;

use super::map::AccountMap;

/// Owner of the live [`AccountMap`].
///
/// Readers get immutable snapshots. Writers clone the current snapshot,
/// mutate the clone and publish it in one step, so a reader never sees a
/// partial update. An update that changes nothing keeps the previous `Arc`.
pub struct AccountStore {
    tx: watch::Sender<Arc<AccountMap>>,
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(AccountMap::new()));
        Self { tx }
    }

    pub fn snapshot(&self) -> Arc<AccountMap> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AccountMap>> {
        self.tx.subscribe()
    }

    /// Applies `mutate` to a copy of the map. `mutate` reports whether it
    /// changed anything; only then is the copy published.
    pub fn update<F>(&self, mutate: F) -> bool
    where
        F: FnOnce(&mut AccountMap) -> bool,
    {
        self.tx.send_if_modified(|current| {
            let mut next = AccountMap::clone(current);
            if mutate(&mut next) {
                *current = Arc::new(next);
                true
            } else {
                false
            }
        })
    }

    pub fn merge(&self, discovered: AccountMap) -> bool {
        if discovered.is_empty() {
            return false;
        }
        self.update(|map| map.merge(discovered))
    }

    pub fn clear(&self) -> bool {
        self.update(|map| {
            let had_entries = !map.is_empty();
            map.clear();
            had_entries
        })
    }
}
