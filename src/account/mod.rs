//! Account directory
//!
//! This module keeps the unified view of every discovered account:
//! - Account and balance types
//! - The insertion-ordered account map and its merge policy
//! - The shared store that publishes map snapshots
//! - Discovery from local, extension, EVM, bridge and custodial sources

pub mod directory;
pub mod map;
pub mod providers;
pub mod store;
pub mod types;

pub use directory::AccountDirectory;
pub use map::AccountMap;
pub use providers::{CustodialAccount, CustodialProvider, EvmProvider, ExtensionProvider, InjectedAccount};
pub use store::AccountStore;
pub use types::{Account, AccountAddress, Balance};
