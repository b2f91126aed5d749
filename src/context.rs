//! Process-wide identity state: the live account map, the current selection,
//! the balance subscription and the remembered wallet sources.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::account::{Account, AccountDirectory, AccountMap, AccountStore};
use crate::balance::{BalanceSource, BalanceSubscriptionManager, RpcBalanceSource};
use crate::config::IdentityConfig;
use crate::error::{IdentityError, Result};
use crate::signer::{BridgeTransport, PassphrasePrompt, SignatureResult, SignerAdapter};
use crate::storage::{ConnectedWalletTypes, FileStore, KeyValueStore, Keystore, WalletType};

pub struct AccountIdentityContext {
    store: Arc<AccountStore>,
    directory: AccountDirectory,
    balances: BalanceSubscriptionManager,
    wallet_types: ConnectedWalletTypes,
    selected: Mutex<Option<String>>,
}

/// True when `account` was discovered through `wallet_type`.
fn from_source(account: &Account, wallet_type: &WalletType) -> bool {
    match (&*account.signer, wallet_type) {
        (SignerAdapter::LocalEncrypted(_), WalletType::Local) => true,
        (SignerAdapter::NativeExtension(s), WalletType::Extension(label)) => s.wallet_label() == label,
        (SignerAdapter::EvmInjected(_), WalletType::Evm) => true,
        (SignerAdapter::Bridge(s), WalletType::Bridge(label)) => {
            BridgeTransport::from_label(label).map_or(false, |t| t == s.transport())
        }
        (SignerAdapter::Custodial(_), WalletType::Custodial) => true,
        _ => false,
    }
}

impl AccountIdentityContext {
    /// `kv` holds the connected-wallet list; it is normally the same store
    /// the directory's keystore writes to.
    pub fn new(directory: AccountDirectory, balance_source: Arc<dyn BalanceSource>, kv: Arc<dyn KeyValueStore>) -> Self {
        let codec = *directory.codec();
        Self {
            store: Arc::new(AccountStore::new()),
            directory,
            balances: BalanceSubscriptionManager::new(balance_source, codec),
            wallet_types: ConnectedWalletTypes::new(kv),
            selected: Mutex::new(None),
        }
    }

    /// File-backed keystore and RPC balances, as configured. Only local
    /// accounts are discoverable; wallet collaborators are attached through
    /// [`AccountDirectory`] by embedders.
    pub fn from_config(config: &IdentityConfig, prompt: Arc<dyn PassphrasePrompt>) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.storage.path)?);
        let directory = AccountDirectory::new(config.chain.codec(), Keystore::new(kv.clone()), prompt)
            .with_max_passphrase_attempts(config.signer.max_passphrase_attempts);
        let source = Arc::new(RpcBalanceSource::from_config(&config.balance, config.chain.decimals)?);
        Ok(Self::new(directory, source, kv))
    }

    pub fn accounts(&self) -> Arc<AccountMap> {
        self.store.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<AccountMap>> {
        self.store.subscribe()
    }

    pub fn directory(&self) -> &AccountDirectory {
        &self.directory
    }

    pub fn balances(&self) -> &BalanceSubscriptionManager {
        &self.balances
    }

    pub fn connected_wallet_types(&self) -> Result<Vec<WalletType>> {
        self.wallet_types.list()
    }

    fn lookup(&self, address: &str) -> Result<Account> {
        self.store
            .snapshot()
            .find(address)
            .cloned()
            .ok_or_else(|| IdentityError::AccountNotFound(address.to_string()))
    }

    pub fn select(&self, address: &str) -> Result<()> {
        let account = self.lookup(address)?;
        *self.selected.lock().unwrap_or_else(|e| e.into_inner()) = Some(account.address);
        Ok(())
    }

    /// The selected account, as of the current snapshot.
    pub fn selected(&self) -> Option<Account> {
        let address = self.selected.lock().unwrap_or_else(|e| e.into_inner()).clone()?;
        self.store.snapshot().get(&address).cloned()
    }

    async fn discover(&self, wallet_type: &WalletType) -> Result<AccountMap> {
        match wallet_type {
            WalletType::Local => self.directory.discover_local(),
            WalletType::Extension(label) => self.directory.discover_extension(label).await,
            WalletType::Evm => self.directory.discover_evm_injected().await,
            WalletType::Bridge(label) => self.directory.discover_bridge(label).await,
            WalletType::Custodial => self.directory.discover_custodial().await,
        }
    }

    async fn sync_balances(&self) {
        if let Err(e) = self.balances.sync(&self.store).await {
            warn!("Balance subscription sync failed: {}", e);
        }
    }

    /// Discovers `wallet_type`, merges the result, remembers the source and
    /// subscribes the new accounts. Returns the number of accounts found.
    pub async fn connect(&self, wallet_type: WalletType) -> Result<usize> {
        let discovered = self.discover(&wallet_type).await?;
        let found = discovered.len();
        self.store.merge(discovered);
        self.wallet_types.add(&wallet_type)?;
        self.sync_balances().await;
        info!("Connected {} ({} accounts)", wallet_type, found);
        Ok(found)
    }

    pub async fn connect_local(&self) -> Result<usize> {
        self.connect(WalletType::Local).await
    }

    pub async fn connect_extension(&self, wallet_label: &str) -> Result<usize> {
        self.connect(WalletType::Extension(wallet_label.to_string())).await
    }

    pub async fn connect_evm(&self) -> Result<usize> {
        self.connect(WalletType::Evm).await
    }

    pub async fn connect_bridge(&self, wallet_label: &str) -> Result<usize> {
        self.connect(WalletType::Bridge(wallet_label.to_string())).await
    }

    pub async fn connect_custodial(&self) -> Result<usize> {
        self.connect(WalletType::Custodial).await
    }

    /// Silently re-discovers every remembered source. Sources that fail are
    /// logged and forgotten. Returns the number of accounts in the map.
    pub async fn restore(&self) -> Result<usize> {
        for wallet_type in self.wallet_types.list()? {
            match self.discover(&wallet_type).await {
                Ok(discovered) => {
                    self.store.merge(discovered);
                }
                Err(e) => {
                    warn!("Could not restore {}: {}", wallet_type, e);
                    self.wallet_types.remove(&wallet_type)?;
                }
            }
        }
        self.sync_balances().await;
        Ok(self.store.snapshot().len())
    }

    /// Drops the accounts of one source, their balance subscriptions and the
    /// remembered source. Returns how many accounts were removed.
    ///
    /// An address offered by two sources is held once, with the signer of the
    /// source that connected first. Disconnecting that source removes the
    /// address even if the other is still connected; `restore` brings it back.
    pub async fn disconnect(&self, wallet_type: &WalletType) -> Result<usize> {
        let mut removed: Vec<String> = Vec::new();
        self.store.update(|map| {
            removed = map
                .values()
                .filter(|account| from_source(account, wallet_type))
                .map(|account| account.address.clone())
                .collect();
            map.retain(|account| !from_source(account, wallet_type))
        });
        self.wallet_types.remove(wallet_type)?;
        self.balances.unsubscribe(&removed).await;

        {
            let mut selected = self.selected.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(address) = selected.as_deref() {
                if !self.store.snapshot().contains_key(address) {
                    *selected = None;
                }
            }
        }
        info!("Disconnected {} ({} accounts removed)", wallet_type, removed.len());
        Ok(removed.len())
    }

    /// One-shot balance fetch for every account.
    pub async fn refresh_balances(&self) -> usize {
        self.balances.refresh(&self.store).await
    }

    pub async fn sign(&self, address: &str, payload: &[u8]) -> Result<SignatureResult> {
        let account = self.lookup(address)?;
        account.signer.sign(payload).await
    }

    pub async fn sign_message(&self, address: &str, text: &str) -> Result<String> {
        let account = self.lookup(address)?;
        account.signer.sign_message(text).await
    }

    /// Stores a new local account and adds it to the live map.
    pub async fn import_local(&self, name: &str, mnemonic: &str, passphrase: &str) -> Result<String> {
        let address = self.directory.import_local(name, mnemonic, passphrase)?;
        self.connect_local().await?;
        Ok(address)
    }

    pub fn forget_local(&self, address: &str) -> Result<bool> {
        let removed = self.directory.forget_local(address)?;
        self.store.update(|map| {
            map.retain(|account| {
                !(matches!(&*account.signer, SignerAdapter::LocalEncrypted(_))
                    && crate::address::equals(&account.address, address))
            })
        });
        Ok(removed)
    }

    /// Closes the balance subscription and keeps everything else. For process
    /// exit; use [`logout`](Self::logout) to forget the session.
    pub async fn shutdown(&self) {
        self.balances.teardown().await;
    }

    /// Tears down the subscription, then clears the map, the selection and
    /// the remembered sources.
    pub async fn logout(&self) -> Result<()> {
        self.balances.teardown().await;
        self.store.clear();
        *self.selected.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.wallet_types.clear()?;
        info!("Logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tokio::time;

    use crate::account::directory::tests::{directory_with, FakeEvm, FakeExtension, ALICE, BOB, EVM};
    use crate::address::AddressCodec;
    use crate::balance::MemoryBalanceSource;
    use crate::crypto::{verify_with_pubkey, KeyPair};
    use crate::error::ProviderError;
    use crate::signer::local::tests::PHRASE;
    use crate::storage::MemoryStore;

    struct Harness {
        context: AccountIdentityContext,
        kv: Arc<MemoryStore>,
        source: Arc<MemoryBalanceSource>,
    }

    fn harness(configure: impl FnOnce(AccountDirectory) -> AccountDirectory) -> Harness {
        let kv = Arc::new(MemoryStore::new());
        harness_on(kv, configure)
    }

    fn harness_on(kv: Arc<MemoryStore>, configure: impl FnOnce(AccountDirectory) -> AccountDirectory) -> Harness {
        let source = Arc::new(MemoryBalanceSource::new());
        let context = AccountIdentityContext::new(configure(directory_with(kv.clone())), source.clone(), kv.clone());
        Harness { context, kv, source }
    }

    fn extension(accounts: &[(&str, &str)]) -> Arc<FakeExtension> {
        Arc::new(FakeExtension::with_accounts(accounts))
    }

    #[tokio::test]
    async fn test_local_import_and_sign() {
        let h = harness(|d| d);
        let address = h.context.import_local("main", PHRASE, "pass").await.unwrap();
        assert_eq!(h.context.accounts().len(), 1);

        let signature = h.context.sign_message(&address, "login").await.unwrap();
        let pubkey = KeyPair::from_mnemonic(PHRASE).unwrap().public_key();
        assert!(verify_with_pubkey(b"<Bytes>login</Bytes>", &signature, &pubkey));

        assert!(h.context.forget_local(&address).unwrap());
        assert!(h.context.accounts().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let h = harness(|d| d);
        assert!(matches!(h.context.select(ALICE), Err(IdentityError::AccountNotFound(_))));
        assert!(matches!(
            h.context.sign(ALICE, b"x").await,
            Err(IdentityError::AccountNotFound(_))
        ));
        assert!(h.context.selected().is_none());
    }

    #[tokio::test]
    async fn test_connect_subscribes_and_tracks_mirror_balance() {
        let h = harness(|d| d.with_extension_provider(extension(&[("alice", ALICE)])));
        assert_eq!(h.context.connect_extension("polkadot-js").await.unwrap(), 1);
        assert_eq!(
            h.context.connected_wallet_types().unwrap(),
            vec![WalletType::Extension("polkadot-js".into())]
        );

        let addr_b = AddressCodec::default().to_mirror(ALICE).unwrap();
        assert!(h.source.subscribed().unwrap().contains(&addr_b));

        let mut rx = h.context.watch();
        rx.borrow_and_update();
        h.source.emit(&addr_b, Decimal::from(1000)).await.unwrap();
        time::timeout(Duration::from_secs(2), rx.changed()).await.unwrap().unwrap();

        let balance = h.context.accounts().get(ALICE).unwrap().balance.unwrap();
        assert_eq!(balance.available, Decimal::from(1000));
    }

    #[tokio::test]
    async fn test_select_by_other_encoding() {
        let h = harness(|d| d.with_extension_provider(extension(&[("alice", ALICE)])));
        h.context.connect_extension("talisman").await.unwrap();

        let other = AddressCodec::new(Some(0)).normalize(ALICE, None).unwrap();
        h.context.select(&other).unwrap();
        assert_eq!(h.context.selected().unwrap().address, ALICE);
    }

    #[tokio::test]
    async fn test_disconnect_removes_only_that_source() {
        let h = harness(|d| {
            d.with_extension_provider(extension(&[("alice", ALICE), ("bob", BOB)]))
                .with_evm_provider(Arc::new(FakeEvm {
                    accounts: Ok(vec![EVM.to_string()]),
                }))
        });
        h.context.connect_extension("talisman").await.unwrap();
        h.context.connect_evm().await.unwrap();
        h.context.select(ALICE).unwrap();
        assert_eq!(h.context.accounts().len(), 3);

        let removed = h
            .context
            .disconnect(&WalletType::Extension("talisman".into()))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(h.context.accounts().keys().collect::<Vec<_>>(), vec![EVM]);

        let codec = AddressCodec::default();
        let subscribed = h.source.subscribed().unwrap();
        assert_eq!(subscribed.len(), 2);
        assert!(subscribed.contains(EVM));
        assert!(subscribed.contains(&codec.to_mirror(EVM).unwrap()));
        assert!(!subscribed.contains(ALICE));
        assert!(!subscribed.contains(&codec.to_mirror(BOB).unwrap()));
        assert!(h.context.selected().is_none());
        assert_eq!(h.context.connected_wallet_types().unwrap(), vec![WalletType::Evm]);
    }

    #[tokio::test]
    async fn test_restore_drops_failing_sources() {
        let kv = Arc::new(MemoryStore::new());
        {
            let first = harness_on(kv.clone(), |d| {
                d.with_extension_provider(extension(&[("alice", ALICE)]))
                    .with_evm_provider(Arc::new(FakeEvm {
                        accounts: Ok(vec![EVM.to_string()]),
                    }))
            });
            first.context.connect_extension("talisman").await.unwrap();
            first.context.connect_evm().await.unwrap();
        }

        // On the next start the EVM wallet is gone.
        let second = harness_on(kv, |d| {
            d.with_extension_provider(extension(&[("alice", ALICE)]))
                .with_evm_provider(Arc::new(FakeEvm {
                    accounts: Err(ProviderError::ExtensionNotFound),
                }))
        });
        assert_eq!(second.context.restore().await.unwrap(), 1);
        assert!(second.context.accounts().contains_key(ALICE));
        assert_eq!(
            second.context.connected_wallet_types().unwrap(),
            vec![WalletType::Extension("talisman".into())]
        );
    }

    #[tokio::test]
    async fn test_logout_tears_everything_down() {
        let h = harness(|d| d.with_extension_provider(extension(&[("alice", ALICE)])));
        h.context.connect_extension("talisman").await.unwrap();
        h.context.select(ALICE).unwrap();
        assert_eq!(h.source.open_streams().unwrap(), 1);

        h.context.logout().await.unwrap();

        assert!(h.context.accounts().is_empty());
        assert!(h.context.selected().is_none());
        assert!(h.context.connected_wallet_types().unwrap().is_empty());
        assert_eq!(h.source.open_streams().unwrap(), 0);
        assert!(h.kv.get(crate::storage::wallet_types::WALLET_TYPES_KEY).unwrap().is_none());

        // Logging out twice is harmless.
        h.context.logout().await.unwrap();
    }

    #[tokio::test]
    async fn test_from_config_uses_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IdentityConfig::default();
        config.chain.format_prefix = Some(0);
        config.storage.path = dir.path().join("store.json").to_string_lossy().into_owned();

        let prompt = Arc::new(crate::signer::local::tests::ScriptedPrompt::new(&["pass"]));
        let context = AccountIdentityContext::from_config(&config, prompt).unwrap();
        let address = context.directory().import_local("main", PHRASE, "pass").unwrap();

        assert!(address.starts_with('1'));
        assert!(dir.path().join("store.json").exists());
        assert!(context.directory().discover_local().unwrap().contains_key(&address));
    }

    #[tokio::test]
    async fn test_failed_connect_is_not_remembered() {
        let h = harness(|d| d.with_extension_provider(Arc::new(FakeExtension::failing(ProviderError::AccessBlocked))));
        assert!(matches!(
            h.context.connect_extension("talisman").await,
            Err(IdentityError::AccessBlocked(_))
        ));
        assert!(h.context.connected_wallet_types().unwrap().is_empty());
    }
}
