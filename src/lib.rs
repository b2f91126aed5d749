pub mod account;
pub mod address;
pub mod balance;
pub mod cli;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod signer;
pub mod storage;

pub use context::AccountIdentityContext;
pub use error::{IdentityError, ProviderError, Result};
