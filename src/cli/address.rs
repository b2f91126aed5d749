use clap::Subcommand;

use crate::address::{is_mirror_form, AddressCodec, AddressKind};
use crate::config::IdentityConfig;
use crate::error::Result;

#[derive(Subcommand)]
pub enum AddressCommands {
    /// Print the address space of an address
    Classify { address: String },
    /// Print the cross-space counterpart
    Mirror {
        address: String,
        /// SS58 prefix for SpaceA output (defaults to the configured chain)
        #[arg(long)]
        format: Option<u16>,
    },
    /// Re-encode canonically
    Normalize {
        address: String,
        #[arg(long)]
        format: Option<u16>,
    },
    /// Compare two addresses by identity
    Equals { a: String, b: String },
}

pub fn handle_address_command(cmd: AddressCommands, config: &IdentityConfig) -> Result<()> {
    let codec = config.chain.codec();

    match cmd {
        AddressCommands::Classify { address } => {
            let label = match codec.classify(&address) {
                AddressKind::SpaceA => "ss58",
                AddressKind::SpaceB => "evm",
                AddressKind::Unrecognized => "unrecognized",
            };
            println!("{}", label);
            if is_mirror_form(&address) {
                println!("(embeds an EVM address)");
            }
        }
        AddressCommands::Mirror { address, format } => {
            let codec = match format {
                Some(format) => AddressCodec::new(Some(format)),
                None => codec,
            };
            println!("{}", codec.to_mirror(&address)?);
        }
        AddressCommands::Normalize { address, format } => {
            println!("{}", codec.normalize(&address, format)?);
        }
        AddressCommands::Equals { a, b } => {
            println!("{}", codec.equals(&a, &b));
        }
    }
    Ok(())
}
