//! Discovery of accounts from every wallet source.
//!
//! Each operation is independent and returns a fresh [`AccountMap`]; merging
//! into the live map is the caller's job. Calls to the same source must be
//! serialized by the caller.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::map::AccountMap;
use super::providers::{CustodialProvider, EvmProvider, ExtensionProvider};
use super::types::Account;
use crate::address::{AddressCodec, AddressKind};
use crate::error::{IdentityError, Result};
use crate::signer::local::DEFAULT_MAX_ATTEMPTS;
use crate::signer::{
    BridgeSession, BridgeSigner, BridgeTransport, ExtensionSigner, KeyLifecycleObserver, LocalSigner, NativeSigner,
    PassphrasePrompt, SignerAdapter,
};
use crate::storage::{Keystore, LocalEntry};

const EVM_LABEL: &str = "evm";

pub struct AccountDirectory {
    codec: AddressCodec,
    keystore: Keystore,
    prompt: Arc<dyn PassphrasePrompt>,
    key_observer: Option<Arc<dyn KeyLifecycleObserver>>,
    max_passphrase_attempts: u32,
    extension: Option<Arc<dyn ExtensionProvider>>,
    evm: Option<Arc<dyn EvmProvider>>,
    bridge: Option<Arc<dyn BridgeSession>>,
    custodial: Option<Arc<dyn CustodialProvider>>,
}

impl AccountDirectory {
    pub fn new(codec: AddressCodec, keystore: Keystore, prompt: Arc<dyn PassphrasePrompt>) -> Self {
        Self {
            codec,
            keystore,
            prompt,
            key_observer: None,
            max_passphrase_attempts: DEFAULT_MAX_ATTEMPTS,
            extension: None,
            evm: None,
            bridge: None,
            custodial: None,
        }
    }

    pub fn with_extension_provider(mut self, provider: Arc<dyn ExtensionProvider>) -> Self {
        self.extension = Some(provider);
        self
    }

    pub fn with_evm_provider(mut self, provider: Arc<dyn EvmProvider>) -> Self {
        self.evm = Some(provider);
        self
    }

    pub fn with_bridge_session(mut self, session: Arc<dyn BridgeSession>) -> Self {
        self.bridge = Some(session);
        self
    }

    pub fn with_custodial_provider(mut self, provider: Arc<dyn CustodialProvider>) -> Self {
        self.custodial = Some(provider);
        self
    }

    pub fn with_key_observer(mut self, observer: Arc<dyn KeyLifecycleObserver>) -> Self {
        self.key_observer = Some(observer);
        self
    }

    pub fn with_max_passphrase_attempts(mut self, attempts: u32) -> Self {
        self.max_passphrase_attempts = attempts;
        self
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    /// Normalizes `address` if it belongs to `expected`.
    fn canonical(&self, address: &str, expected: Option<AddressKind>) -> Result<String> {
        let kind = self.codec.classify(address);
        match expected {
            Some(expected) if kind != expected => Err(IdentityError::InvalidAddressFormat(format!(
                "{} is not a {:?} address",
                address, expected
            ))),
            _ => self.codec.normalize(address, None),
        }
    }

    fn local_account(&self, entry: LocalEntry) -> Result<Account> {
        let address = self.canonical(&entry.address, Some(AddressKind::SpaceA))?;
        let mut signer = LocalSigner::new(&address, entry.sealed, self.prompt.clone())
            .with_max_attempts(self.max_passphrase_attempts);
        if let Some(observer) = &self.key_observer {
            signer = signer.with_observer(observer.clone());
        }
        Ok(Account::new(&entry.name, &address, SignerAdapter::LocalEncrypted(signer)))
    }

    /// Wraps every persisted keystore entry in a local signer. Nothing is
    /// decrypted; corrupt entries are skipped.
    pub fn discover_local(&self) -> Result<AccountMap> {
        let mut map = AccountMap::new();
        for (key, entry) in self.keystore.entries()? {
            match entry.and_then(|entry| self.local_account(entry)) {
                Ok(account) => {
                    map.merge_account(account);
                }
                Err(e) => warn!("Skipping local account {}: {}", key, e),
            }
        }
        debug!("Discovered {} local accounts", map.len());
        Ok(map)
    }

    /// Loads SpaceA accounts from the named extension. Accounts that fail
    /// validation are skipped individually.
    pub async fn discover_extension(&self, wallet_label: &str) -> Result<AccountMap> {
        let provider = self
            .extension
            .as_ref()
            .ok_or_else(|| IdentityError::ProviderUnavailable(wallet_label.to_string()))?;
        let injected = provider
            .enable_and_load_all_wallets(wallet_label)
            .await
            .map_err(|e| e.into_discovery_error(wallet_label))?;
        if injected.is_empty() {
            return Err(IdentityError::NoAccountsFound(wallet_label.to_string()));
        }

        let mut map = AccountMap::new();
        for account in injected {
            match self.canonical(&account.address, Some(AddressKind::SpaceA)) {
                Ok(address) => {
                    let signer = ExtensionSigner::new(&address, wallet_label, account.signer);
                    map.merge_account(Account::new(&account.name, &address, SignerAdapter::NativeExtension(signer)));
                }
                Err(e) => warn!("Skipping {} account '{}': {}", wallet_label, account.name, e),
            }
        }

        if map.is_empty() {
            return Err(IdentityError::NoAccountsFound(wallet_label.to_string()));
        }
        info!("Discovered {} accounts from {}", map.len(), wallet_label);
        Ok(map)
    }

    pub async fn discover_evm_injected(&self) -> Result<AccountMap> {
        let provider = self
            .evm
            .as_ref()
            .ok_or_else(|| IdentityError::ProviderUnavailable(EVM_LABEL.to_string()))?;
        let addresses = provider
            .request_accounts()
            .await
            .map_err(|e| e.into_discovery_error(EVM_LABEL))?;

        let mut map = AccountMap::new();
        for (index, raw) in addresses.iter().enumerate() {
            match self.canonical(raw, Some(AddressKind::SpaceB)) {
                Ok(address) => {
                    let signer = NativeSigner::new(&address, EVM_LABEL, provider.signer(&address));
                    let name = format!("EVM account {}", index + 1);
                    map.merge_account(Account::new(&name, &address, SignerAdapter::EvmInjected(signer)));
                }
                Err(e) => warn!("Skipping EVM account: {}", e),
            }
        }

        if map.is_empty() {
            return Err(IdentityError::NoAccountsFound(EVM_LABEL.to_string()));
        }
        info!("Discovered {} EVM accounts", map.len());
        Ok(map)
    }

    pub async fn discover_bridge(&self, wallet_label: &str) -> Result<AccountMap> {
        let transport = BridgeTransport::from_label(wallet_label)?;
        let session = self
            .bridge
            .clone()
            .ok_or_else(|| IdentityError::SignerUnavailable(format!("no active {} session", transport)))?;
        let accounts = session
            .accounts()
            .await
            .map_err(|e| e.into_discovery_error(transport.label()))?;

        let mut map = AccountMap::new();
        for account in accounts {
            let bound = self
                .canonical(&account.address, None)
                .and_then(|address| BridgeSigner::connect(wallet_label, &address, Some(session.clone())));
            match bound {
                Ok(signer) => {
                    let address = signer.address().to_string();
                    map.merge_account(Account::new(&account.name, &address, SignerAdapter::Bridge(signer)));
                }
                Err(e) => warn!("Skipping {} account '{}': {}", transport, account.name, e),
            }
        }

        if map.is_empty() {
            return Err(IdentityError::NoAccountsFound(transport.label().to_string()));
        }
        info!("Discovered {} accounts over {}", map.len(), transport);
        Ok(map)
    }

    pub async fn discover_custodial(&self) -> Result<AccountMap> {
        let provider = self
            .custodial
            .as_ref()
            .ok_or_else(|| IdentityError::ProviderUnavailable("custodial".to_string()))?;
        let label = provider.label().to_string();
        let accounts = provider
            .accounts()
            .await
            .map_err(|e| e.into_discovery_error(&label))?;

        let mut map = AccountMap::new();
        for account in accounts {
            match self.canonical(&account.address, None) {
                Ok(address) => {
                    let signer = NativeSigner::new(&address, &label, provider.signer(&address));
                    let name = account.name.unwrap_or_else(|| label.clone());
                    map.merge_account(Account::new(&name, &address, SignerAdapter::Custodial(signer)));
                }
                Err(e) => warn!("Skipping {} account: {}", label, e),
            }
        }

        if map.is_empty() {
            return Err(IdentityError::NoAccountsFound(label));
        }
        info!("Discovered {} {} accounts", map.len(), label);
        Ok(map)
    }

    /// Encrypts and stores a mnemonic. Returns the account address.
    pub fn import_local(&self, name: &str, mnemonic: &str, passphrase: &str) -> Result<String> {
        self.keystore.import(name, mnemonic, passphrase, self.codec.format())
    }

    pub fn forget_local(&self, address: &str) -> Result<bool> {
        self.keystore.remove(address)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::account::providers::{CustodialAccount, InjectedAccount};
    use crate::error::ProviderError;
    use crate::signer::local::tests::{ScriptedPrompt, PHRASE};
    use crate::signer::provider::tests::StubSigner;
    use crate::signer::{BridgeAccount, ProviderSigner, SignerKind};
    use crate::storage::{KeyValueStore, MemoryStore};

    pub const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    pub const BOB: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
    pub const EVM: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    pub struct FakeExtension {
        pub result: std::result::Result<Vec<(String, String)>, ProviderError>,
        pub calls: AtomicUsize,
    }

    impl FakeExtension {
        pub fn with_accounts(accounts: &[(&str, &str)]) -> Self {
            Self {
                result: Ok(accounts.iter().map(|(n, a)| (n.to_string(), a.to_string())).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(err: ProviderError) -> Self {
            Self {
                result: Err(err),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExtensionProvider for FakeExtension {
        async fn enable_and_load_all_wallets(&self, _wallet_label: &str) -> Result<Vec<InjectedAccount>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let accounts = self.result.clone()?;
            Ok(accounts
                .into_iter()
                .map(|(name, address)| InjectedAccount {
                    name,
                    address,
                    signer: Arc::new(StubSigner::ok("0x01")),
                })
                .collect())
        }
    }

    pub struct FakeEvm {
        pub accounts: std::result::Result<Vec<String>, ProviderError>,
    }

    #[async_trait]
    impl EvmProvider for FakeEvm {
        async fn request_accounts(&self) -> Result<Vec<String>, ProviderError> {
            self.accounts.clone()
        }

        fn signer(&self, _address: &str) -> Arc<dyn ProviderSigner> {
            Arc::new(StubSigner::ok("0x02"))
        }
    }

    pub struct FakeCustodial;

    #[async_trait]
    impl CustodialProvider for FakeCustodial {
        fn label(&self) -> &str {
            "web3auth"
        }

        async fn accounts(&self) -> Result<Vec<CustodialAccount>, ProviderError> {
            Ok(vec![CustodialAccount {
                name: None,
                address: EVM.to_lowercase(),
            }])
        }

        fn signer(&self, _address: &str) -> Arc<dyn ProviderSigner> {
            Arc::new(StubSigner {
                reply: Ok("0x03".into()),
                message_signing: false,
            })
        }
    }

    pub fn directory_with(store: Arc<MemoryStore>) -> AccountDirectory {
        AccountDirectory::new(
            AddressCodec::default(),
            Keystore::new(store),
            Arc::new(ScriptedPrompt::new(&["pass"])),
        )
    }

    #[test]
    fn test_discover_local_skips_corrupt_entry() {
        let store = Arc::new(MemoryStore::new());
        let directory = directory_with(store.clone());
        let good = directory.import_local("main", PHRASE, "pass").unwrap();
        store
            .set(&format!("account:{}", ALICE), r#"{"name":"broken","secret":"zz"}"#)
            .unwrap();

        let map = directory.discover_local().unwrap();

        assert_eq!(map.len(), 1);
        let account = map.get(&good).unwrap();
        assert_eq!(account.signer_kind, SignerKind::LocalEncrypted);
        assert_eq!(account.name, "main");
    }

    #[tokio::test]
    async fn test_discover_extension_is_idempotent() {
        let extension = Arc::new(FakeExtension::with_accounts(&[("alice", ALICE), ("bob", BOB)]));
        let directory = directory_with(Arc::new(MemoryStore::new())).with_extension_provider(extension.clone());

        let mut live = AccountMap::new();
        live.merge(directory.discover_extension("talisman").await.unwrap());
        live.merge(directory.discover_extension("talisman").await.unwrap());

        assert_eq!(extension.calls.load(Ordering::SeqCst), 2);
        assert_eq!(live.len(), 2);
    }

    #[tokio::test]
    async fn test_discover_extension_skips_bad_accounts() {
        let extension = Arc::new(FakeExtension::with_accounts(&[
            ("alice", ALICE),
            ("garbage", "not-an-address"),
            ("evm", EVM),
        ]));
        let directory = directory_with(Arc::new(MemoryStore::new())).with_extension_provider(extension);

        let map = directory.discover_extension("polkadot-js").await.unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![ALICE]);
    }

    #[tokio::test]
    async fn test_discover_extension_failures_are_distinct() {
        let mut errors = Vec::new();
        for err in [
            ProviderError::ExtensionNotFound,
            ProviderError::NoAccounts,
            ProviderError::AccessBlocked,
        ] {
            let directory = directory_with(Arc::new(MemoryStore::new()))
                .with_extension_provider(Arc::new(FakeExtension::failing(err)));
            errors.push(directory.discover_extension("subwallet").await.unwrap_err());
        }
        assert!(matches!(errors[0], IdentityError::ProviderUnavailable(_)));
        assert!(matches!(errors[1], IdentityError::NoAccountsFound(_)));
        assert!(matches!(errors[2], IdentityError::AccessBlocked(_)));

        let bare = directory_with(Arc::new(MemoryStore::new()));
        assert!(matches!(
            bare.discover_extension("subwallet").await,
            Err(IdentityError::ProviderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_discover_evm() {
        let bare = directory_with(Arc::new(MemoryStore::new()));
        assert!(matches!(
            bare.discover_evm_injected().await,
            Err(IdentityError::ProviderUnavailable(_))
        ));

        let empty = directory_with(Arc::new(MemoryStore::new())).with_evm_provider(Arc::new(FakeEvm {
            accounts: Ok(vec![]),
        }));
        assert!(matches!(
            empty.discover_evm_injected().await,
            Err(IdentityError::NoAccountsFound(_))
        ));

        let directory = directory_with(Arc::new(MemoryStore::new())).with_evm_provider(Arc::new(FakeEvm {
            accounts: Ok(vec![EVM.to_lowercase()]),
        }));
        let map = directory.discover_evm_injected().await.unwrap();
        let account = map.get(EVM).unwrap();
        assert_eq!(account.signer_kind, SignerKind::EvmInjected);
    }

    #[tokio::test]
    async fn test_discover_bridge() {
        let directory = directory_with(Arc::new(MemoryStore::new()));
        assert!(matches!(
            directory.discover_bridge("ledger").await,
            Err(IdentityError::SignerUnavailable(_))
        ));

        let session = Arc::new(crate::signer::bridge::tests::StubSession::new(
            BridgeTransport::Ledger,
            vec![BridgeAccount {
                name: "ledger 0".into(),
                address: ALICE.into(),
            }],
        ));
        let directory = directory.with_bridge_session(session);
        assert!(matches!(
            directory.discover_bridge("trezor").await,
            Err(IdentityError::SignerUnavailable(_))
        ));
        let map = directory.discover_bridge("ledger").await.unwrap();
        assert_eq!(map.get(ALICE).unwrap().signer_kind, SignerKind::BridgeSigner);
    }

    #[tokio::test]
    async fn test_discover_custodial() {
        let directory = directory_with(Arc::new(MemoryStore::new())).with_custodial_provider(Arc::new(FakeCustodial));
        let map = directory.discover_custodial().await.unwrap();
        let account = map.get(EVM).unwrap();
        assert_eq!(account.name, "web3auth");
        assert!(matches!(
            account.signer.sign_message("hi").await,
            Err(IdentityError::CapabilityNotSupported(_))
        ));
    }

    #[test]
    fn test_forget_local() {
        let directory = directory_with(Arc::new(MemoryStore::new()));
        let address = directory.import_local("main", PHRASE, "pass").unwrap();
        assert!(directory.forget_local(&address).unwrap());
        assert!(!directory.forget_local(&address).unwrap());
        assert!(directory.discover_local().unwrap().is_empty());
    }
}
