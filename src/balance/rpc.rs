// JSON-RPC balance source with a polling event stream
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use super::source::{BalanceEvent, BalanceInfo, BalanceSource, BalanceStream, SubscriptionTarget, EVENT_BUFFER};
use crate::config::BalanceConfig;
use crate::error::{IdentityError, Result};

#[derive(Deserialize)]
struct RpcBalance {
    available: Decimal,
    #[serde(default)]
    total: Option<Decimal>,
    #[serde(default)]
    decimals: Option<u8>,
}

fn parse_balance_response(json: &serde_json::Value, default_decimals: u8) -> Result<BalanceInfo> {
    if let Some(error) = json.get("error") {
        return Err(IdentityError::BalanceSource(
            error["message"].as_str().unwrap_or("Unknown error").to_string(),
        ));
    }
    let balance: RpcBalance = serde_json::from_value(json["result"].clone())
        .map_err(|e| IdentityError::BalanceSource(format!("Failed to parse balance: {}", e)))?;

    Ok(BalanceInfo {
        available: balance.available,
        total: balance.total.unwrap_or(balance.available),
        decimals: balance.decimals.unwrap_or(default_decimals),
    })
}

struct RpcClient {
    url: String,
    client: Client,
    request_id: AtomicU64,
    decimals: u8,
}

impl RpcClient {
    async fn get_balance(&self, address: &str) -> Result<BalanceInfo> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = json!({
            "jsonrpc": "2.0",
            "method": "getBalance",
            "params": { "address": address },
            "id": id,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| IdentityError::BalanceSource(format!("RPC request failed: {}", e)))?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| IdentityError::BalanceSource(format!("Failed to parse response: {}", e)))?;

        parse_balance_response(&json, self.decimals)
    }
}

pub struct RpcBalanceSource {
    client: Arc<RpcClient>,
    poll_interval: Duration,
}

impl RpcBalanceSource {
    /// Fails with `Config` for a zero poll interval.
    pub fn new(url: &str, poll_interval: Duration, request_timeout: Duration, decimals: u8) -> Result<Self> {
        if poll_interval.is_zero() {
            return Err(IdentityError::Config("balance poll interval must be non-zero".to_string()));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| IdentityError::BalanceSource(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(RpcClient {
                url: url.to_string(),
                client,
                request_id: AtomicU64::new(1),
                decimals,
            }),
            poll_interval,
        })
    }

    pub fn from_config(config: &BalanceConfig, decimals: u8) -> Result<Self> {
        Self::new(
            &config.rpc_url,
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_millis(config.request_timeout_ms),
            decimals,
        )
    }
}

#[async_trait]
impl BalanceSource for RpcBalanceSource {
    async fn get(&self, address: &str) -> Result<BalanceInfo> {
        self.client.get_balance(address).await
    }

    async fn connect(&self) -> Result<Box<dyn BalanceStream>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let subscribed = Arc::new(Mutex::new(BTreeSet::new()));
        let task = tokio::spawn(poll_loop(
            self.client.clone(),
            subscribed.clone(),
            self.poll_interval,
            tx,
        ));
        debug!("Opened polling balance stream against {}", self.client.url);

        Ok(Box::new(RpcBalanceStream {
            subscribed,
            task: Some(task),
            rx: Some(rx),
        }))
    }
}

fn current_subscriptions(subscribed: &Mutex<BTreeSet<String>>) -> Vec<String> {
    match subscribed.lock() {
        Ok(set) => set.iter().cloned().collect(),
        Err(_) => Vec::new(),
    }
}

/// Asks for every subscribed address each tick and emits on change.
async fn poll_loop(
    client: Arc<RpcClient>,
    subscribed: Arc<Mutex<BTreeSet<String>>>,
    poll_interval: Duration,
    tx: mpsc::Sender<BalanceEvent>,
) {
    let mut interval = time::interval(poll_interval);
    let mut last_seen: HashMap<String, Decimal> = HashMap::new();

    loop {
        interval.tick().await;

        let addresses = current_subscriptions(&subscribed);
        last_seen.retain(|address, _| addresses.contains(address));

        for address in addresses {
            let info = match client.get_balance(&address).await {
                Ok(info) => info,
                Err(e) => {
                    warn!("Balance poll for {} failed: {}", address, e);
                    continue;
                }
            };
            if last_seen.get(&address) == Some(&info.available) {
                continue;
            }
            last_seen.insert(address.clone(), info.available);

            let event = BalanceEvent {
                address,
                available: info.available,
            };
            if tx.send(event).await.is_err() {
                debug!("Balance consumer dropped, stopping poller");
                return;
            }
        }
    }
}

struct RpcBalanceStream {
    subscribed: Arc<Mutex<BTreeSet<String>>>,
    task: Option<JoinHandle<()>>,
    rx: Option<mpsc::Receiver<BalanceEvent>>,
}

impl RpcBalanceStream {
    fn with_subscriptions<T>(&self, f: impl FnOnce(&mut BTreeSet<String>) -> T) -> Result<T> {
        if self.task.is_none() {
            return Err(IdentityError::BalanceSource("stream is closed".to_string()));
        }
        let mut set = self
            .subscribed
            .lock()
            .map_err(|_| IdentityError::BalanceSource("subscription lock poisoned".to_string()))?;
        Ok(f(&mut set))
    }
}

#[async_trait]
impl BalanceStream for RpcBalanceStream {
    async fn subscribe(&mut self, address: &str) -> Result<()> {
        self.with_subscriptions(|set| {
            set.insert(address.to_string());
        })
    }

    async fn unsubscribe(&mut self, target: SubscriptionTarget) -> Result<()> {
        self.with_subscriptions(|set| match target {
            SubscriptionTarget::All => set.clear(),
            SubscriptionTarget::Address(address) => {
                set.remove(&address);
            }
        })
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<BalanceEvent>> {
        self.rx.take()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for RpcBalanceStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
