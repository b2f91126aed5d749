//! In-process balance source for tests and demos.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::debug;

use super::source::{BalanceEvent, BalanceInfo, BalanceSource, BalanceStream, SubscriptionTarget, EVENT_BUFFER};
use crate::address;
use crate::error::{IdentityError, Result};

struct StreamSlot {
    id: u64,
    subscribed: BTreeSet<String>,
    tx: mpsc::Sender<BalanceEvent>,
}

#[derive(Default)]
struct MemoryState {
    balances: HashMap<String, BalanceInfo>,
    streams: Vec<StreamSlot>,
    next_id: u64,
    connections: usize,
}

/// Balances set by hand; events are pushed with [`MemoryBalanceSource::emit`].
#[derive(Clone, Default)]
pub struct MemoryBalanceSource {
    state: Arc<Mutex<MemoryState>>,
}

fn lock(state: &Mutex<MemoryState>) -> Result<MutexGuard<'_, MemoryState>> {
    state
        .lock()
        .map_err(|_| IdentityError::BalanceSource("memory source lock poisoned".to_string()))
}

impl MemoryBalanceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: &str, info: BalanceInfo) -> Result<()> {
        lock(&self.state)?.balances.insert(address.to_string(), info);
        Ok(())
    }

    /// Pushes an event to every open stream subscribed to `address` (any
    /// encoding of it). Returns the number of streams reached.
    pub async fn emit(&self, address: &str, available: Decimal) -> Result<usize> {
        let targets: Vec<mpsc::Sender<BalanceEvent>> = lock(&self.state)?
            .streams
            .iter()
            .filter(|slot| {
                slot.subscribed
                    .iter()
                    .any(|sub| sub == address || address::equals(sub, address))
            })
            .map(|slot| slot.tx.clone())
            .collect();

        let mut delivered = 0;
        for tx in targets {
            let event = BalanceEvent {
                address: address.to_string(),
                available,
            };
            if tx.send(event).await.is_ok() {
                delivered += 1;
            }
        }
        debug!("Emitted balance for {} to {} streams", address, delivered);
        Ok(delivered)
    }

    /// Addresses subscribed on any open stream.
    pub fn subscribed(&self) -> Result<BTreeSet<String>> {
        Ok(lock(&self.state)?
            .streams
            .iter()
            .flat_map(|slot| slot.subscribed.iter().cloned())
            .collect())
    }

    pub fn open_streams(&self) -> Result<usize> {
        Ok(lock(&self.state)?.streams.len())
    }

    /// Total `connect` calls so far.
    pub fn connections(&self) -> Result<usize> {
        Ok(lock(&self.state)?.connections)
    }
}

#[async_trait]
impl BalanceSource for MemoryBalanceSource {
    async fn get(&self, address: &str) -> Result<BalanceInfo> {
        lock(&self.state)?
            .balances
            .iter()
            .find(|(known, _)| known.as_str() == address || address::equals(known, address))
            .map(|(_, info)| info.clone())
            .ok_or_else(|| IdentityError::BalanceSource(format!("no balance for {}", address)))
    }

    async fn connect(&self) -> Result<Box<dyn BalanceStream>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut state = lock(&self.state)?;
        let id = state.next_id;
        state.next_id += 1;
        state.connections += 1;
        state.streams.push(StreamSlot {
            id,
            subscribed: BTreeSet::new(),
            tx,
        });

        Ok(Box::new(MemoryBalanceStream {
            id,
            state: self.state.clone(),
            rx: Some(rx),
        }))
    }
}

struct MemoryBalanceStream {
    id: u64,
    state: Arc<Mutex<MemoryState>>,
    rx: Option<mpsc::Receiver<BalanceEvent>>,
}

impl MemoryBalanceStream {
    fn with_slot<T>(&self, f: impl FnOnce(&mut StreamSlot) -> T) -> Result<T> {
        let mut state = lock(&self.state)?;
        state
            .streams
            .iter_mut()
            .find(|slot| slot.id == self.id)
            .map(f)
            .ok_or_else(|| IdentityError::BalanceSource("stream is closed".to_string()))
    }

    fn detach(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.streams.retain(|slot| slot.id != self.id);
        }
    }
}

#[async_trait]
impl BalanceStream for MemoryBalanceStream {
    async fn subscribe(&mut self, address: &str) -> Result<()> {
        self.with_slot(|slot| {
            slot.subscribed.insert(address.to_string());
        })
    }

    async fn unsubscribe(&mut self, target: SubscriptionTarget) -> Result<()> {
        self.with_slot(|slot| match target {
            SubscriptionTarget::All => slot.subscribed.clear(),
            SubscriptionTarget::Address(address) => {
                slot.subscribed.remove(&address);
            }
        })
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<BalanceEvent>> {
        self.rx.take()
    }

    async fn close(&mut self) -> Result<()> {
        self.detach();
        Ok(())
    }
}

impl Drop for MemoryBalanceStream {
    fn drop(&mut self) {
        self.detach();
    }
}
