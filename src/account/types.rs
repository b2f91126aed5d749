//! Account type definitions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::address::{self, AddressKind};
use crate::signer::{SignerAdapter, SignerHandle, SignerKind};

/// Address in its native space, used as the map key.
pub type AccountAddress = String;

/// Last observed spendable balance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub available: Decimal,
    pub fetched_at: DateTime<Utc>,
}

impl Balance {
    pub fn new(available: Decimal) -> Self {
        Self {
            available,
            fetched_at: Utc::now(),
        }
    }

    pub fn at(available: Decimal, fetched_at: DateTime<Utc>) -> Self {
        Self { available, fetched_at }
    }

    /// Picks the more recently fetched of two optional balances; a defined
    /// value always beats an absent one.
    pub fn newest(existing: Option<Balance>, incoming: Option<Balance>) -> Option<Balance> {
        match (existing, incoming) {
            (Some(a), Some(b)) => Some(if b.fetched_at > a.fetched_at { b } else { a }),
            (a, None) => a,
            (None, b) => b,
        }
    }
}

/// A discovered identity and the capability to sign for it.
#[derive(Debug, Clone)]
pub struct Account {
    pub name: String,
    pub address: AccountAddress,
    pub signer_kind: SignerKind,
    pub signer: SignerHandle,
    pub balance: Option<Balance>,
}

impl Account {
    pub fn new(name: &str, address: &str, signer: SignerAdapter) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            signer_kind: signer.kind(),
            signer: SignerHandle::new(signer),
            balance: None,
        }
    }

    pub fn with_balance(mut self, balance: Balance) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn address_kind(&self) -> AddressKind {
        address::classify(&self.address)
    }
}
