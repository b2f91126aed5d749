//! Commands that run a full identity context: signing and balance watching.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time;
use tracing::info;
use zeroize::Zeroizing;

use crate::config::IdentityConfig;
use crate::context::AccountIdentityContext;
use crate::error::{IdentityError, Result};
use crate::signer::{PassphrasePrompt, UnlockAttempt};

/// Reads passphrases from stdin, or uses one given up front. An empty line
/// cancels.
pub struct TerminalPrompt {
    preset: Option<Zeroizing<String>>,
}

impl TerminalPrompt {
    pub fn new(preset: Option<String>) -> Self {
        Self {
            preset: preset.map(Zeroizing::new),
        }
    }
}

#[async_trait]
impl PassphrasePrompt for TerminalPrompt {
    async fn unlock(&self, address: &str, attempt: &mut UnlockAttempt<'_>) -> Result<()> {
        if let Some(preset) = &self.preset {
            attempt.try_passphrase(preset);
            return Ok(());
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while attempt.remaining() > 0 {
            eprint!("Passphrase for {} ({} attempts left): ", address, attempt.remaining());
            let line = lines
                .next_line()
                .await
                .map_err(|e| IdentityError::SigningRejected(format!("could not read passphrase: {}", e)))?
                .map(Zeroizing::new)
                .ok_or_else(|| IdentityError::SigningRejected("no passphrase entered".to_string()))?;

            let candidate = line.trim();
            if candidate.is_empty() {
                return Err(IdentityError::SigningRejected("cancelled".to_string()));
            }
            if attempt.try_passphrase(candidate) {
                return Ok(());
            }
            eprintln!("Wrong passphrase.");
        }
        Ok(())
    }
}

pub async fn handle_sign_command(
    config: &IdentityConfig,
    address: &str,
    message: Option<String>,
    payload: Option<String>,
    passphrase: Option<String>,
) -> Result<()> {
    let context = AccountIdentityContext::from_config(config, Arc::new(TerminalPrompt::new(passphrase)))?;
    context.connect_local().await?;

    match (message, payload) {
        (Some(text), _) => {
            println!("{}", context.sign_message(address, &text).await?);
        }
        (None, Some(payload)) => {
            let digits = payload.strip_prefix("0x").unwrap_or(&payload);
            let bytes = hex::decode(digits)
                .map_err(|e| IdentityError::Serialization(format!("payload is not hex: {}", e)))?;
            let result = context.sign(address, &bytes).await?;
            println!("{} ({:?})", result.signature, result.signature_type);
        }
        (None, None) => {
            return Err(IdentityError::Config("pass --message or --payload".to_string()));
        }
    }

    context.shutdown().await;
    Ok(())
}

pub async fn handle_watch_command(config: &IdentityConfig, seconds: Option<u64>) -> Result<()> {
    let context = AccountIdentityContext::from_config(config, Arc::new(TerminalPrompt::new(None)))?;
    if context.restore().await? == 0 {
        context.connect_local().await?;
    }
    context.refresh_balances().await;

    let mut rx = context.watch();
    print_balances(&context);

    let deadline = seconds.map(|s| time::Instant::now() + Duration::from_secs(s));
    loop {
        let sleep_until = deadline.unwrap_or_else(|| time::Instant::now() + Duration::from_secs(3600));
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                print_balances(&context);
            }
            _ = tokio::signal::ctrl_c() => break,
            _ = time::sleep_until(sleep_until) => {
                if deadline.is_some() {
                    break;
                }
            }
        }
    }

    info!("Stopping balance watch");
    context.shutdown().await;
    Ok(())
}

fn print_balances(context: &AccountIdentityContext) {
    for account in context.accounts().values() {
        match account.balance {
            Some(balance) => println!(
                "{}\t{}\t{}\t(at {})",
                account.name, account.address, balance.available, balance.fetched_at
            ),
            None => println!("{}\t{}\t-", account.name, account.address),
        }
    }
}
