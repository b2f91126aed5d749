pub mod address;
pub mod keystore;
pub mod session;

use clap::{Parser, Subcommand};

use crate::config::IdentityConfig;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "portal_identity")]
#[command(about = "Account identity and address tools", long_about = None)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "identity.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Address classification and conversion
    Address {
        #[command(subcommand)]
        cmd: address::AddressCommands,
    },
    /// Encrypted local accounts
    Keystore {
        #[command(subcommand)]
        cmd: keystore::KeystoreCommands,
    },
    /// Sign with a local account
    Sign {
        #[arg(long)]
        address: String,
        /// Text message, signed in `<Bytes>` framing
        #[arg(long, conflicts_with = "payload")]
        message: Option<String>,
        /// Hex-encoded payload
        #[arg(long)]
        payload: Option<String>,
        /// Skip the interactive prompt
        #[arg(long)]
        passphrase: Option<String>,
    },
    /// Follow balances of remembered accounts
    Watch {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

pub async fn run(command: Commands, config: &IdentityConfig) -> Result<()> {
    match command {
        Commands::Address { cmd } => address::handle_address_command(cmd, config),
        Commands::Keystore { cmd } => keystore::handle_keystore_command(cmd, config),
        Commands::Sign {
            address,
            message,
            payload,
            passphrase,
        } => session::handle_sign_command(config, &address, message, payload, passphrase).await,
        Commands::Watch { seconds } => session::handle_watch_command(config, seconds).await,
    }
}
