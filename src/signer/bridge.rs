//! Remote signing through a bridge: hardware device, QR round-trip or a
//! wallet-connect session. One transport is bound per session.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SignatureResult;
use crate::error::{IdentityError, ProviderError, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeTransport {
    Ledger,
    QrVault,
    WalletConnect,
}

impl BridgeTransport {
    /// Resolves a wallet label, case-insensitively.
    pub fn from_label(label: &str) -> Result<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "ledger" => Ok(BridgeTransport::Ledger),
            "polkadot-vault" | "qr" => Ok(BridgeTransport::QrVault),
            "walletconnect" | "wallet-connect" => Ok(BridgeTransport::WalletConnect),
            _ => Err(IdentityError::SignerUnavailable(format!(
                "unsupported bridge transport '{}'",
                label
            ))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BridgeTransport::Ledger => "ledger",
            BridgeTransport::QrVault => "polkadot-vault",
            BridgeTransport::WalletConnect => "walletconnect",
        }
    }
}

impl fmt::Display for BridgeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BridgeAccount {
    pub name: String,
    pub address: String,
}

/// An active bridge session.
#[async_trait]
pub trait BridgeSession: Send + Sync {
    fn transport(&self) -> BridgeTransport;

    /// False while the device is disconnected or the pairing has lapsed.
    fn is_ready(&self) -> bool {
        true
    }

    async fn accounts(&self) -> Result<Vec<BridgeAccount>, ProviderError>;
    async fn sign(&self, sender: &str, payload: &[u8]) -> Result<SignatureResult, ProviderError>;
    async fn sign_message(&self, sender: &str, text: &str) -> Result<String, ProviderError>;
}

pub struct BridgeSigner {
    address: String,
    transport: BridgeTransport,
    session: Arc<dyn BridgeSession>,
}

impl BridgeSigner {
    /// Binds `address` to the session for `label`. Fails with
    /// `SignerUnavailable` on an unknown label, a missing session, or a
    /// session speaking another transport.
    pub fn connect(label: &str, address: &str, session: Option<Arc<dyn BridgeSession>>) -> Result<Self> {
        let transport = BridgeTransport::from_label(label)?;
        let session = session
            .ok_or_else(|| IdentityError::SignerUnavailable(format!("no active {} session", transport)))?;
        if session.transport() != transport {
            return Err(IdentityError::SignerUnavailable(format!(
                "active session is {}, not {}",
                session.transport(),
                transport
            )));
        }

        Ok(Self {
            address: address.to_string(),
            transport,
            session,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn transport(&self) -> BridgeTransport {
        self.transport
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.session.is_ready() {
            Ok(())
        } else {
            Err(IdentityError::SignerUnavailable(format!("{} session is not ready", self.transport)))
        }
    }

    pub async fn sign(&self, payload: &[u8]) -> Result<SignatureResult> {
        self.ensure_ready()?;
        debug!("Routing signature for {} through {}", self.address, self.transport);
        self.session
            .sign(&self.address, payload)
            .await
            .map_err(|e| e.into_signing_error(self.transport.label()))
    }

    pub async fn sign_message(&self, text: &str) -> Result<String> {
        self.ensure_ready()?;
        self.session
            .sign_message(&self.address, text)
            .await
            .map_err(|e| e.into_signing_error(self.transport.label()))
    }
}
