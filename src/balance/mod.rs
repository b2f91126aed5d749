//! Live balances for the account directory.

pub mod memory;
pub mod resolve;
pub mod rpc;
pub mod source;
pub mod subscription;

pub use memory::MemoryBalanceSource;
pub use resolve::{resolve_event, Resolution};
pub use rpc::RpcBalanceSource;
pub use source::{BalanceEvent, BalanceInfo, BalanceSource, BalanceStream, SubscriptionTarget};
pub use subscription::{apply_event, BalanceSubscriptionManager};
