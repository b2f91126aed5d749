//! Uniform signing capability over every key custody model.
//!
//! The variant is fixed when an account is discovered; callers only ever see
//! [`SignerAdapter::sign`] and [`SignerAdapter::sign_message`].

pub mod bridge;
pub mod local;
pub mod provider;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use bridge::{BridgeAccount, BridgeSession, BridgeSigner, BridgeTransport};
pub use local::{DecryptedKey, KeyLifecycleObserver, LocalSigner, PassphrasePrompt, UnlockAttempt};
pub use provider::{ExtensionSigner, InjectedSigner, NativeSigner, ProviderSigner};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignerKind {
    LocalEncrypted,
    NativeExtension,
    BridgeSigner,
    EvmInjected,
    Custodial,
}

impl fmt::Display for SignerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignerKind::LocalEncrypted => "local",
            SignerKind::NativeExtension => "extension",
            SignerKind::BridgeSigner => "bridge",
            SignerKind::EvmInjected => "evm",
            SignerKind::Custodial => "custodial",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    Ed25519,
    Sr25519,
    Ecdsa,
    Ethereum,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignatureResult {
    /// `0x`-prefixed hex.
    pub signature: String,
    pub signature_type: SignatureType,
}

pub enum SignerAdapter {
    LocalEncrypted(LocalSigner),
    NativeExtension(ExtensionSigner),
    Bridge(BridgeSigner),
    EvmInjected(NativeSigner),
    Custodial(NativeSigner),
}

/// Shared handle; copies of the account map point at the same signer.
pub type SignerHandle = Arc<SignerAdapter>;

impl SignerAdapter {
    pub fn kind(&self) -> SignerKind {
        match self {
            SignerAdapter::LocalEncrypted(_) => SignerKind::LocalEncrypted,
            SignerAdapter::NativeExtension(_) => SignerKind::NativeExtension,
            SignerAdapter::Bridge(_) => SignerKind::BridgeSigner,
            SignerAdapter::EvmInjected(_) => SignerKind::EvmInjected,
            SignerAdapter::Custodial(_) => SignerKind::Custodial,
        }
    }

    /// Address the signer is bound to.
    pub fn address(&self) -> &str {
        match self {
            SignerAdapter::LocalEncrypted(s) => s.address(),
            SignerAdapter::NativeExtension(s) => s.address(),
            SignerAdapter::Bridge(s) => s.address(),
            SignerAdapter::EvmInjected(s) | SignerAdapter::Custodial(s) => s.address(),
        }
    }

    pub async fn sign(&self, payload: &[u8]) -> Result<SignatureResult> {
        match self {
            SignerAdapter::LocalEncrypted(s) => s.sign(payload).await,
            SignerAdapter::NativeExtension(s) => s.sign(payload).await,
            SignerAdapter::Bridge(s) => s.sign(payload).await,
            SignerAdapter::EvmInjected(s) | SignerAdapter::Custodial(s) => s.sign(payload).await,
        }
    }

    pub async fn sign_message(&self, text: &str) -> Result<String> {
        match self {
            SignerAdapter::LocalEncrypted(s) => s.sign_message(text).await,
            SignerAdapter::NativeExtension(s) => s.sign_message(text).await,
            SignerAdapter::Bridge(s) => s.sign_message(text).await,
            SignerAdapter::EvmInjected(s) | SignerAdapter::Custodial(s) => s.sign_message(text).await,
        }
    }
}

impl fmt::Debug for SignerAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerAdapter")
            .field("kind", &self.kind())
            .field("address", &self.address())
            .finish()
    }
}
