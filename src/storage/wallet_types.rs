//! Remembers which wallet sources to re-discover silently on next start.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::KeyValueStore;
use crate::error::{IdentityError, Result};

pub const WALLET_TYPES_KEY: &str = "connected_wallet_types";
const DELIMITER: &str = ",";

/// A discovery source, persisted as `local`, `extension:<label>`, `evm`,
/// `bridge:<label>` or `custodial`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub enum WalletType {
    Local,
    Extension(String),
    Evm,
    Bridge(String),
    Custodial,
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletType::Local => write!(f, "local"),
            WalletType::Extension(label) => write!(f, "extension:{}", label),
            WalletType::Evm => write!(f, "evm"),
            WalletType::Bridge(label) => write!(f, "bridge:{}", label),
            WalletType::Custodial => write!(f, "custodial"),
        }
    }
}

impl FromStr for WalletType {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || IdentityError::Serialization(format!("Invalid wallet type: {}", s));
        match s.split_once(':') {
            Some(("extension", label)) if !label.is_empty() => Ok(WalletType::Extension(label.to_string())),
            Some(("bridge", label)) if !label.is_empty() => Ok(WalletType::Bridge(label.to_string())),
            Some(_) => Err(invalid()),
            None => match s {
                "local" => Ok(WalletType::Local),
                "evm" => Ok(WalletType::Evm),
                "custodial" => Ok(WalletType::Custodial),
                _ => Err(invalid()),
            },
        }
    }
}

pub struct ConnectedWalletTypes {
    store: Arc<dyn KeyValueStore>,
}

impl ConnectedWalletTypes {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn raw(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .get(WALLET_TYPES_KEY)?
            .unwrap_or_default()
            .split(DELIMITER)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn write(&self, items: &[String]) -> Result<()> {
        if items.is_empty() {
            self.store.remove(WALLET_TYPES_KEY)
        } else {
            self.store.set(WALLET_TYPES_KEY, &items.join(DELIMITER))
        }
    }

    /// Parsed list; items that no longer parse are skipped.
    pub fn list(&self) -> Result<Vec<WalletType>> {
        Ok(self
            .raw()?
            .into_iter()
            .filter_map(|item| match item.parse::<WalletType>() {
                Ok(wallet_type) => Some(wallet_type),
                Err(e) => {
                    warn!("Skipping stored wallet type: {}", e);
                    None
                }
            })
            .collect())
    }

    pub fn add(&self, wallet_type: &WalletType) -> Result<()> {
        let item = wallet_type.to_string();
        if item.contains(DELIMITER) {
            return Err(IdentityError::Storage(format!(
                "wallet type '{}' contains the list delimiter",
                item
            )));
        }
        let mut items = self.raw()?;
        if !items.contains(&item) {
            items.push(item);
            self.write(&items)?;
        }
        Ok(())
    }

    pub fn remove(&self, wallet_type: &WalletType) -> Result<()> {
        let item = wallet_type.to_string();
        let mut items = self.raw()?;
        let before = items.len();
        items.retain(|existing| existing != &item);
        if items.len() != before {
            self.write(&items)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(WALLET_TYPES_KEY)
    }
}
