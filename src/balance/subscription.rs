//! Keeps `Account::balance` fresh from one live balance stream.
//!
//! Every account is subscribed under its native address and its mirror, since
//! the source may report either encoding. Events are applied by a single pump
//! task, in delivery order, each as one copy-and-replace update that touches
//! only the balance field.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::resolve::{resolve_event, Resolution};
use super::source::{BalanceEvent, BalanceSource, BalanceStream, SubscriptionTarget};
use crate::account::{AccountStore, Balance};
use crate::address::AddressCodec;
use crate::error::Result;

#[derive(Default)]
struct Connection {
    stream: Option<Box<dyn BalanceStream>>,
    pump: Option<JoinHandle<()>>,
    subscribed: BTreeSet<String>,
}

pub struct BalanceSubscriptionManager {
    source: Arc<dyn BalanceSource>,
    codec: AddressCodec,
    connection: Mutex<Connection>,
}

impl BalanceSubscriptionManager {
    pub fn new(source: Arc<dyn BalanceSource>, codec: AddressCodec) -> Self {
        Self {
            source,
            codec,
            connection: Mutex::new(Connection::default()),
        }
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.stream.is_some()
    }

    /// Addresses subscribed on the current connection.
    pub async fn subscribed(&self) -> BTreeSet<String> {
        self.connection.lock().await.subscribed.clone()
    }

    /// Opens the connection if needed and subscribes every account not yet
    /// subscribed, under both encodings. Returns the number of new
    /// subscriptions.
    pub async fn sync(&self, store: &Arc<AccountStore>) -> Result<usize> {
        let mut connection = self.connection.lock().await;

        if connection.stream.is_none() {
            let mut stream = self.source.connect().await?;
            if let Some(events) = stream.take_events() {
                connection.pump = Some(tokio::spawn(pump(store.clone(), self.codec, events)));
            } else {
                warn!("Balance stream has no event channel; balances will not update");
            }
            connection.stream = Some(stream);
            connection.subscribed.clear();
            info!("Balance stream connected");
        }

        let mut wanted = Vec::new();
        for account in store.snapshot().values() {
            wanted.push(account.address.clone());
            match self.codec.to_mirror(&account.address) {
                Ok(mirror) => wanted.push(mirror),
                Err(e) => warn!("No mirror for {}, subscribing native only: {}", account.address, e),
            }
        }

        let Connection { stream, subscribed, .. } = &mut *connection;
        let Some(stream) = stream.as_mut() else {
            return Ok(0);
        };

        let mut added = 0;
        for address in wanted {
            if subscribed.contains(&address) {
                continue;
            }
            match stream.subscribe(&address).await {
                Ok(()) => {
                    debug!("Subscribed balance for {}", address);
                    subscribed.insert(address);
                    added += 1;
                }
                Err(e) => warn!("Balance subscribe for {} failed: {}", address, e),
            }
        }
        Ok(added)
    }

    /// Drops the subscriptions of `addresses`, native and mirror. Returns how
    /// many were removed.
    pub async fn unsubscribe(&self, addresses: &[String]) -> usize {
        let mut connection = self.connection.lock().await;
        let Connection { stream, subscribed, .. } = &mut *connection;
        let Some(stream) = stream.as_mut() else {
            return 0;
        };

        let mut targets = Vec::new();
        for address in addresses {
            targets.push(address.clone());
            if let Ok(mirror) = self.codec.to_mirror(address) {
                targets.push(mirror);
            }
        }

        let mut removed = 0;
        for address in targets {
            if !subscribed.contains(&address) {
                continue;
            }
            match stream.unsubscribe(SubscriptionTarget::Address(address.clone())).await {
                Ok(()) => {
                    debug!("Unsubscribed balance for {}", address);
                    subscribed.remove(&address);
                    removed += 1;
                }
                Err(e) => warn!("Balance unsubscribe for {} failed: {}", address, e),
            }
        }
        removed
    }

    /// One-shot `get` for every account. Returns how many balances were set.
    pub async fn refresh(&self, store: &AccountStore) -> usize {
        let snapshot = store.snapshot();
        let mut updated = 0;
        for address in snapshot.keys() {
            match self.source.get(address).await {
                Ok(info) => {
                    let balance = Balance::new(info.available);
                    if store.update(|map| map.set_balance(address, balance)) {
                        updated += 1;
                    }
                }
                Err(e) => warn!("Balance refresh for {} failed: {}", address, e),
            }
        }
        updated
    }

    /// Unsubscribes everything and closes the connection. Safe to call when
    /// nothing is open.
    pub async fn teardown(&self) {
        let mut connection = self.connection.lock().await;
        if let Some(mut stream) = connection.stream.take() {
            if let Err(e) = stream.unsubscribe(SubscriptionTarget::All).await {
                warn!("Balance unsubscribe failed: {}", e);
            }
            if let Err(e) = stream.close().await {
                warn!("Balance stream close failed: {}", e);
            }
            info!("Balance stream closed");
        }
        if let Some(pump) = connection.pump.take() {
            pump.abort();
        }
        connection.subscribed.clear();
    }
}

impl Drop for BalanceSubscriptionManager {
    fn drop(&mut self) {
        if let Some(pump) = self.connection.get_mut().pump.take() {
            pump.abort();
        }
    }
}

async fn pump(store: Arc<AccountStore>, codec: AddressCodec, mut events: mpsc::Receiver<BalanceEvent>) {
    while let Some(event) = events.recv().await {
        apply_event(&store, &codec, &event);
    }
    debug!("Balance event stream ended");
}

/// Resolves `event` against the live map and sets that account's balance.
/// Resolution and update happen in one store update.
pub fn apply_event(store: &AccountStore, codec: &AddressCodec, event: &BalanceEvent) -> Resolution {
    let mut resolution = Resolution::Unresolved;
    store.update(|map| {
        resolution = resolve_event(map, codec, &event.address);
        match resolution.key() {
            Some(key) => map.set_balance(key, Balance::new(event.available)),
            None => false,
        }
    });

    match &resolution {
        Resolution::Exact(key) | Resolution::Mirror(key) => {
            debug!("Balance of {} is now {}", key, event.available)
        }
        Resolution::Ambiguous(keys) => error!(
            "Balance event for {} mirrors to several accounts {:?}; not applied",
            event.address, keys
        ),
        Resolution::Unresolved => trace!("Ignoring balance event for unknown {}", event.address),
    }
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tokio::time;

    use crate::account::types::tests::test_account;
    use crate::balance::MemoryBalanceSource;
    use crate::balance::BalanceInfo;

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const BOB: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";

    fn store_with(addresses: &[&str]) -> Arc<AccountStore> {
        let store = Arc::new(AccountStore::new());
        store.merge(addresses.iter().map(|a| test_account("acct", a)).collect());
        store
    }

    #[tokio::test]
    async fn test_mirror_event_updates_native_account() {
        let store = store_with(&[ALICE]);
        let source = Arc::new(MemoryBalanceSource::new());
        let manager = BalanceSubscriptionManager::new(source.clone(), AddressCodec::new(None));

        assert_eq!(manager.sync(&store).await.unwrap(), 2);
        let addr_b = AddressCodec::new(None).to_mirror(ALICE).unwrap();
        let subscribed = source.subscribed().unwrap();
        assert!(subscribed.contains(ALICE));
        assert!(subscribed.contains(&addr_b));

        let mut rx = store.subscribe();
        rx.borrow_and_update();
        source.emit(&addr_b, Decimal::from(1000)).await.unwrap();
        time::timeout(Duration::from_secs(2), rx.changed()).await.unwrap().unwrap();

        let balance = store.snapshot().get(ALICE).unwrap().balance.unwrap();
        assert_eq!(balance.available, Decimal::from(1000));
        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_event_updates_only_its_account() {
        let store = store_with(&[ALICE, BOB]);
        let codec = AddressCodec::default();
        let mirror = codec.to_mirror(BOB).unwrap();

        let event = BalanceEvent {
            address: mirror,
            available: Decimal::from(3),
        };
        assert_eq!(apply_event(&store, &codec, &event), Resolution::Mirror(BOB.to_string()));

        let snapshot = store.snapshot();
        assert!(snapshot.get(ALICE).unwrap().balance.is_none());
        assert_eq!(snapshot.get(BOB).unwrap().balance.unwrap().available, Decimal::from(3));
    }

    #[tokio::test]
    async fn test_unknown_event_leaves_map_untouched() {
        let store = store_with(&[ALICE]);
        let before = store.snapshot();
        let event = BalanceEvent {
            address: "0x0000000000000000000000000000000000000001".into(),
            available: Decimal::ONE,
        };

        assert_eq!(apply_event(&store, &AddressCodec::default(), &event), Resolution::Unresolved);
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[tokio::test]
    async fn test_sync_only_adds_new_addresses() {
        let store = store_with(&[ALICE]);
        let source = Arc::new(MemoryBalanceSource::new());
        let manager = BalanceSubscriptionManager::new(source.clone(), AddressCodec::default());

        assert_eq!(manager.sync(&store).await.unwrap(), 2);
        assert_eq!(manager.sync(&store).await.unwrap(), 0);

        store.merge([test_account("bob", BOB)].into_iter().collect());
        assert_eq!(manager.sync(&store).await.unwrap(), 2);
        assert_eq!(source.connections().unwrap(), 1);
        assert_eq!(manager.subscribed().await.len(), 4);
    }

    #[tokio::test]
    async fn test_unsubscribe_drops_both_encodings() {
        let store = store_with(&[ALICE, BOB]);
        let source = Arc::new(MemoryBalanceSource::new());
        let manager = BalanceSubscriptionManager::new(source.clone(), AddressCodec::default());

        assert_eq!(manager.unsubscribe(&[BOB.to_string()]).await, 0);
        manager.sync(&store).await.unwrap();
        assert_eq!(manager.unsubscribe(&[BOB.to_string()]).await, 2);

        let subscribed = source.subscribed().unwrap();
        assert_eq!(subscribed.len(), 2);
        assert!(!subscribed.contains(BOB));
        assert_eq!(manager.subscribed().await, subscribed);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let store = store_with(&[ALICE]);
        let source = Arc::new(MemoryBalanceSource::new());
        let manager = BalanceSubscriptionManager::new(source.clone(), AddressCodec::default());

        manager.teardown().await;
        manager.sync(&store).await.unwrap();
        assert!(manager.is_connected().await);

        manager.teardown().await;
        manager.teardown().await;
        assert!(!manager.is_connected().await);
        assert_eq!(source.open_streams().unwrap(), 0);
        assert!(manager.subscribed().await.is_empty());

        // A new sync opens a fresh connection.
        manager.sync(&store).await.unwrap();
        assert_eq!(source.connections().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_event_under_other_prefix_updates_account() {
        let store = store_with(&[ALICE]);
        let codec = AddressCodec::new(None);
        let polkadot = AddressCodec::new(Some(0)).normalize(ALICE, None).unwrap();

        let event = BalanceEvent {
            address: polkadot,
            available: Decimal::from(5),
        };
        assert_eq!(apply_event(&store, &codec, &event), Resolution::Exact(ALICE.to_string()));
        assert_eq!(store.snapshot().get(ALICE).unwrap().balance.unwrap().available, Decimal::from(5));
    }

    #[tokio::test]
    async fn test_events_apply_in_delivery_order() {
        let store = store_with(&[ALICE]);
        let codec = AddressCodec::default();
        let event = |n: i64| BalanceEvent {
            address: ALICE.to_string(),
            available: Decimal::from(n),
        };

        let initial = store.snapshot();
        apply_event(&store, &codec, &event(1));
        let first = store.snapshot();
        apply_event(&store, &codec, &event(2));
        let second = store.snapshot();

        // Each event is its own replacement; older snapshots keep their value.
        assert!(!Arc::ptr_eq(&initial, &first));
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(initial.get(ALICE).unwrap().balance.is_none());
        assert_eq!(first.get(ALICE).unwrap().balance.unwrap().available, Decimal::from(1));
        assert_eq!(second.get(ALICE).unwrap().balance.unwrap().available, Decimal::from(2));
    }

    #[tokio::test]
    async fn test_streamed_events_last_one_wins() {
        let store = store_with(&[ALICE]);
        let source = Arc::new(MemoryBalanceSource::new());
        let manager = BalanceSubscriptionManager::new(source.clone(), AddressCodec::default());
        manager.sync(&store).await.unwrap();

        let mut rx = store.subscribe();
        rx.borrow_and_update();
        source.emit(ALICE, Decimal::from(1)).await.unwrap();
        source.emit(ALICE, Decimal::from(2)).await.unwrap();

        let mut seen = Vec::new();
        while seen.last() != Some(&Decimal::from(2)) {
            time::timeout(Duration::from_secs(2), rx.changed()).await.unwrap().unwrap();
            let snapshot = rx.borrow_and_update().clone();
            seen.push(snapshot.get(ALICE).unwrap().balance.unwrap().available);
        }

        // The watch may skip the first value but never reorders.
        assert!(seen == vec![Decimal::from(2)] || seen == vec![Decimal::from(1), Decimal::from(2)]);
        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_sync_skips_mirror_of_unrecognized_key() {
        let store = store_with(&[ALICE, BOB]);
        store.update(|map| map.merge_account(test_account("broken", "not-an-address")));
        let source = Arc::new(MemoryBalanceSource::new());
        let codec = AddressCodec::new(None);
        let manager = BalanceSubscriptionManager::new(source.clone(), codec);

        assert_eq!(manager.sync(&store).await.unwrap(), 5);
        let subscribed = source.subscribed().unwrap();
        for native in [ALICE, BOB] {
            assert!(subscribed.contains(native));
            assert!(subscribed.contains(&codec.to_mirror(native).unwrap()));
        }
        assert!(subscribed.contains("not-an-address"));
    }

    #[tokio::test]
    async fn test_evm_mirror_uses_default_format_when_chain_unknown() {
        let evm = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
        let store = store_with(&[evm]);
        let source = Arc::new(MemoryBalanceSource::new());
        let manager = BalanceSubscriptionManager::new(source.clone(), AddressCodec::new(None));

        assert_eq!(manager.sync(&store).await.unwrap(), 2);
        let mirror = AddressCodec::new(Some(42)).to_mirror(evm).unwrap();
        assert!(source.subscribed().unwrap().contains(&mirror));
    }

    #[tokio::test]
    async fn test_refresh_sets_known_balances() {
        let store = store_with(&[ALICE, BOB]);
        let source = Arc::new(MemoryBalanceSource::new());
        source
            .set_balance(
                ALICE,
                BalanceInfo {
                    available: Decimal::from(42),
                    total: Decimal::from(42),
                    decimals: 12,
                },
            )
            .unwrap();
        let manager = BalanceSubscriptionManager::new(source, AddressCodec::default());

        assert_eq!(manager.refresh(&store).await, 1);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.get(ALICE).unwrap().balance.unwrap().available, Decimal::from(42));
        assert!(snapshot.get(BOB).unwrap().balance.is_none());
    }
}
