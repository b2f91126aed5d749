//! Ports to the remote balance service.

use std::fmt;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Buffer between a stream and its consumer.
pub const EVENT_BUFFER: usize = 1024;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BalanceInfo {
    pub available: Decimal,
    pub total: Decimal,
    pub decimals: u8,
}

/// A balance change pushed by the source, in whichever encoding it observed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BalanceEvent {
    pub address: String,
    pub available: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionTarget {
    /// The `*` wildcard.
    All,
    Address(String),
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionTarget::All => f.write_str("*"),
            SubscriptionTarget::Address(address) => f.write_str(address),
        }
    }
}

#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// One-shot lookup.
    async fn get(&self, address: &str) -> Result<BalanceInfo>;
    /// Opens a new event stream connection.
    async fn connect(&self) -> Result<Box<dyn BalanceStream>>;
}

/// A live connection. Events for subscribed addresses arrive on the channel
/// returned by [`BalanceStream::take_events`], in delivery order.
#[async_trait]
pub trait BalanceStream: Send {
    async fn subscribe(&mut self, address: &str) -> Result<()>;
    async fn unsubscribe(&mut self, target: SubscriptionTarget) -> Result<()>;
    /// The receiving end; `None` once taken.
    fn take_events(&mut self) -> Option<mpsc::Receiver<BalanceEvent>>;
    async fn close(&mut self) -> Result<()>;
}
