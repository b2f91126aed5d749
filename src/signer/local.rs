//! Signer backed by a passphrase-sealed mnemonic in the local keystore.
//!
//! The plaintext key only exists inside a [`DecryptedKey`], which lives for a
//! single signing call and zeroizes on drop.

use std::sync::Arc;

use async_trait::async_trait;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use tracing::{debug, warn};

use super::{SignatureResult, SignatureType};
use crate::address::{self, DecodedAddress};
use crate::crypto::KeyPair;
use crate::error::{IdentityError, Result};
use crate::storage::SealedSecret;

/// Payloads above this size are hashed before signing.
const MAX_UNHASHED_PAYLOAD: usize = 256;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

type Blake2b256 = Blake2b<U32>;

/// Asks the user for a passphrase.
///
/// The prompt receives an [`UnlockAttempt`] and calls
/// [`UnlockAttempt::try_passphrase`] with each candidate until one succeeds or
/// it gives up. Returning `Ok(())` without a successful attempt surfaces as
/// `DecryptionFailed`; a cancelled prompt should return `SigningRejected`.
#[async_trait]
pub trait PassphrasePrompt: Send + Sync {
    async fn unlock(&self, address: &str, attempt: &mut UnlockAttempt<'_>) -> Result<()>;
}

/// Instrumentation hook for decrypted key lifetimes.
pub trait KeyLifecycleObserver: Send + Sync {
    fn acquired(&self, address: &str);
    fn released(&self, address: &str);
}

/// Decrypted signing key, scoped to one signing call.
pub struct DecryptedKey {
    keypair: KeyPair,
    address: String,
    observer: Option<Arc<dyn KeyLifecycleObserver>>,
}

impl DecryptedKey {
    fn open(
        sealed: &SealedSecret,
        passphrase: &str,
        address: &str,
        observer: Option<Arc<dyn KeyLifecycleObserver>>,
    ) -> Result<Self> {
        let plaintext = sealed.open(passphrase)?;
        let phrase = std::str::from_utf8(&plaintext).map_err(|_| IdentityError::DecryptionFailed)?;
        let keypair = KeyPair::from_mnemonic(phrase).map_err(|_| IdentityError::DecryptionFailed)?;

        match address::decode(address) {
            Ok(DecodedAddress::SpaceA { account, .. }) if account == keypair.public_key() => {}
            _ => {
                warn!("Decrypted key does not match stored address {}", address);
                return Err(IdentityError::DecryptionFailed);
            }
        }

        if let Some(observer) = &observer {
            observer.acquired(address);
        }
        Ok(Self {
            keypair,
            address: address.to_string(),
            observer,
        })
    }

    fn sign(&self, payload: &[u8]) -> String {
        let signature = if payload.len() > MAX_UNHASHED_PAYLOAD {
            self.keypair.sign(&Blake2b256::digest(payload))
        } else {
            self.keypair.sign(payload)
        };
        format!("0x{}", hex::encode(signature.to_bytes()))
    }
}

impl Drop for DecryptedKey {
    fn drop(&mut self) {
        // SigningKey zeroizes itself; this only reports the release.
        if let Some(observer) = &self.observer {
            observer.released(&self.address);
        }
    }
}

/// One unlock session handed to a [`PassphrasePrompt`].
pub struct UnlockAttempt<'a> {
    sealed: &'a SealedSecret,
    address: &'a str,
    observer: Option<Arc<dyn KeyLifecycleObserver>>,
    attempts: u32,
    max_attempts: u32,
    key: Option<DecryptedKey>,
}

impl<'a> UnlockAttempt<'a> {
    fn new(
        sealed: &'a SealedSecret,
        address: &'a str,
        observer: Option<Arc<dyn KeyLifecycleObserver>>,
        max_attempts: u32,
    ) -> Self {
        Self {
            sealed,
            address,
            observer,
            attempts: 0,
            max_attempts,
            key: None,
        }
    }

    /// Tries one candidate passphrase. Returns `true` once unlocked; further
    /// calls after the attempt limit return `false` without decrypting.
    pub fn try_passphrase(&mut self, candidate: &str) -> bool {
        if self.key.is_some() {
            return true;
        }
        if self.attempts >= self.max_attempts {
            return false;
        }
        self.attempts += 1;

        match DecryptedKey::open(self.sealed, candidate, self.address, self.observer.clone()) {
            Ok(key) => {
                self.key = Some(key);
                true
            }
            Err(_) => {
                debug!(
                    "Passphrase attempt {}/{} failed for {}",
                    self.attempts, self.max_attempts, self.address
                );
                false
            }
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    pub fn is_unlocked(&self) -> bool {
        self.key.is_some()
    }

    fn into_key(self) -> Option<DecryptedKey> {
        self.key
    }
}

pub struct LocalSigner {
    address: String,
    sealed: SealedSecret,
    prompt: Arc<dyn PassphrasePrompt>,
    observer: Option<Arc<dyn KeyLifecycleObserver>>,
    max_attempts: u32,
}

impl LocalSigner {
    pub fn new(address: &str, sealed: SealedSecret, prompt: Arc<dyn PassphrasePrompt>) -> Self {
        Self {
            address: address.to_string(),
            sealed,
            prompt,
            observer: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn KeyLifecycleObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn acquire(&self) -> Result<DecryptedKey> {
        let mut attempt = UnlockAttempt::new(&self.sealed, &self.address, self.observer.clone(), self.max_attempts);
        self.prompt.unlock(&self.address, &mut attempt).await?;
        attempt.into_key().ok_or(IdentityError::DecryptionFailed)
    }

    pub async fn sign(&self, payload: &[u8]) -> Result<SignatureResult> {
        let key = self.acquire().await?;
        Ok(SignatureResult {
            signature: key.sign(payload),
            signature_type: SignatureType::Ed25519,
        })
    }

    pub async fn sign_message(&self, text: &str) -> Result<String> {
        let key = self.acquire().await?;
        Ok(key.sign(wrap_message(text).as_bytes()))
    }
}

/// Message framing used by account-space wallets for raw text signing.
pub fn wrap_message(text: &str) -> String {
    format!("<Bytes>{}</Bytes>", text)
}
