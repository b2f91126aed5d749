use std::sync::Arc;

use clap::Subcommand;

use crate::config::IdentityConfig;
use crate::crypto::KeyPair;
use crate::error::Result;
use crate::storage::{FileStore, Keystore};

#[derive(Subcommand)]
pub enum KeystoreCommands {
    /// Generate a new mnemonic and store it encrypted
    New {
        #[arg(long)]
        name: String,
        #[arg(long)]
        passphrase: String,
    },
    /// Import a mnemonic
    Import {
        #[arg(long)]
        name: String,
        #[arg(long)]
        mnemonic: String,
        #[arg(long)]
        passphrase: String,
    },
    /// List stored accounts
    List,
    /// Delete a stored account
    Remove { address: String },
}

pub fn handle_keystore_command(cmd: KeystoreCommands, config: &IdentityConfig) -> Result<()> {
    let keystore = Keystore::new(Arc::new(FileStore::open(&config.storage.path)?));
    let format = config.chain.codec().format();

    match cmd {
        KeystoreCommands::New { name, passphrase } => {
            let mnemonic = KeyPair::generate_mnemonic()?;
            let address = keystore.import(&name, &mnemonic, &passphrase, format)?;
            println!("Account '{}' created.", name);
            println!("Address: {}", address);
            println!("Mnemonic: {}", mnemonic.as_str());
            println!("KEEP THIS SAFE!");
        }
        KeystoreCommands::Import {
            name,
            mnemonic,
            passphrase,
        } => {
            let address = keystore.import(&name, &mnemonic, &passphrase, format)?;
            println!("Account '{}' imported: {}", name, address);
        }
        KeystoreCommands::List => {
            for (address, entry) in keystore.entries()? {
                match entry {
                    Ok(entry) => println!("Name: {}\tAddress: {}", entry.name, entry.address),
                    Err(e) => println!("Corrupt entry {}: {}", address, e),
                }
            }
        }
        KeystoreCommands::Remove { address } => {
            if keystore.remove(&address)? {
                println!("Removed {}", address);
            } else {
                println!("No account stored for {}", address);
            }
        }
    }
    Ok(())
}
