//! Signers that delegate to a wallet collaborator: browser extensions,
//! EVM-injected providers and custodial (social login) SDKs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::SignatureResult;
use crate::error::{IdentityError, ProviderError, Result};

/// Signing entry points of a native-extension account.
#[async_trait]
pub trait InjectedSigner: Send + Sync {
    async fn sign_payload(&self, address: &str, payload: &[u8]) -> Result<SignatureResult, ProviderError>;
    async fn sign_raw(&self, address: &str, data: &str) -> Result<String, ProviderError>;
}

/// Provider-native signer object (EVM injected or custodial).
#[async_trait]
pub trait ProviderSigner: Send + Sync {
    /// Custodial SDKs commonly lack raw message signing.
    fn supports_message_signing(&self) -> bool {
        true
    }

    async fn sign_transaction(&self, address: &str, payload: &[u8]) -> Result<SignatureResult, ProviderError>;
    async fn sign_message(&self, address: &str, text: &str) -> Result<String, ProviderError>;
}

pub struct ExtensionSigner {
    address: String,
    wallet_label: String,
    inner: Arc<dyn InjectedSigner>,
}

impl ExtensionSigner {
    pub fn new(address: &str, wallet_label: &str, inner: Arc<dyn InjectedSigner>) -> Self {
        Self {
            address: address.to_string(),
            wallet_label: wallet_label.to_string(),
            inner,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn wallet_label(&self) -> &str {
        &self.wallet_label
    }

    pub async fn sign(&self, payload: &[u8]) -> Result<SignatureResult> {
        debug!("Requesting {} signature for {}", self.wallet_label, self.address);
        self.inner
            .sign_payload(&self.address, payload)
            .await
            .map_err(|e| e.into_signing_error(&self.wallet_label))
    }

    pub async fn sign_message(&self, text: &str) -> Result<String> {
        self.inner
            .sign_raw(&self.address, text)
            .await
            .map_err(|e| e.into_signing_error(&self.wallet_label))
    }
}

/// Wraps a [`ProviderSigner`] bound to one address.
pub struct NativeSigner {
    address: String,
    provider_label: String,
    inner: Arc<dyn ProviderSigner>,
}

impl NativeSigner {
    pub fn new(address: &str, provider_label: &str, inner: Arc<dyn ProviderSigner>) -> Self {
        Self {
            address: address.to_string(),
            provider_label: provider_label.to_string(),
            inner,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn provider_label(&self) -> &str {
        &self.provider_label
    }

    pub async fn sign(&self, payload: &[u8]) -> Result<SignatureResult> {
        debug!("Requesting {} signature for {}", self.provider_label, self.address);
        self.inner
            .sign_transaction(&self.address, payload)
            .await
            .map_err(|e| e.into_signing_error(&self.provider_label))
    }

    pub async fn sign_message(&self, text: &str) -> Result<String> {
        if !self.inner.supports_message_signing() {
            return Err(IdentityError::CapabilityNotSupported(format!(
                "message signing ({})",
                self.provider_label
            )));
        }
        self.inner
            .sign_message(&self.address, text)
            .await
            .map_err(|e| e.into_signing_error(&self.provider_label))
    }
}
