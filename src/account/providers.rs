//! Ports to the wallet collaborators accounts are discovered from.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::signer::{InjectedSigner, ProviderSigner};

/// An account exposed by a native extension, with its signing entry points.
#[derive(Clone)]
pub struct InjectedAccount {
    pub name: String,
    pub address: String,
    pub signer: Arc<dyn InjectedSigner>,
}

impl std::fmt::Debug for InjectedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectedAccount")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish()
    }
}

/// Extension family (polkadot-js, talisman, subwallet, ...).
#[async_trait]
pub trait ExtensionProvider: Send + Sync {
    /// Enables the named wallet and loads its accounts. Fails with
    /// `ExtensionNotFound`, `NoAccounts` or `AccessBlocked`.
    async fn enable_and_load_all_wallets(&self, wallet_label: &str) -> Result<Vec<InjectedAccount>, ProviderError>;
}

/// EVM-style injected provider.
#[async_trait]
pub trait EvmProvider: Send + Sync {
    /// `eth_requestAccounts`
    async fn request_accounts(&self) -> Result<Vec<String>, ProviderError>;
    fn signer(&self, address: &str) -> Arc<dyn ProviderSigner>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustodialAccount {
    pub name: Option<String>,
    pub address: String,
}

/// Social-login / custodial key provider.
#[async_trait]
pub trait CustodialProvider: Send + Sync {
    fn label(&self) -> &str {
        "custodial"
    }

    async fn accounts(&self) -> Result<Vec<CustodialAccount>, ProviderError>;
    fn signer(&self, address: &str) -> Arc<dyn ProviderSigner>;
}
