//! Encrypted local accounts, stored as `account:<address> -> {name, secret}`.
//!
//! `secret` is hex of `salt(16) || nonce(12) || AES-256-GCM ciphertext`, keyed
//! with PBKDF2-HMAC-SHA256 over the passphrase.

use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::KeyValueStore;
use crate::address::{self, ss58, AddressKind};
use crate::crypto::KeyPair;
use crate::error::{IdentityError, Result};

pub const ENTRY_PREFIX: &str = "account:";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const PBKDF2_ROUNDS: u32 = 100_000;

fn derive_key(passphrase: &str, salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2::<Hmac<Sha256>>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key[..]);
    key
}

/// Passphrase-sealed key material.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedSecret {
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl std::fmt::Debug for SealedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedSecret")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

impl SealedSecret {
    pub fn seal(plaintext: &[u8], passphrase: &str) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let key = derive_key(passphrase, &salt);
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|_| IdentityError::Storage("invalid key length".to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| IdentityError::Storage("encryption failure".to_string()))?;

        Ok(Self { salt, nonce, ciphertext })
    }

    /// Opens the box. Any failure (wrong passphrase, tampered data) is
    /// `DecryptionFailed`.
    pub fn open(&self, passphrase: &str) -> Result<Zeroizing<Vec<u8>>> {
        let key = derive_key(passphrase, &self.salt);
        let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| IdentityError::DecryptionFailed)?;
        cipher
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_slice())
            .map(Zeroizing::new)
            .map_err(|_| IdentityError::DecryptionFailed)
    }

    pub fn from_hex(secret: &str) -> Result<Self> {
        let digits = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes = hex::decode(digits)
            .map_err(|e| IdentityError::Serialization(format!("secret is not hex: {}", e)))?;
        if bytes.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
            return Err(IdentityError::Serialization(format!(
                "secret too short ({} bytes)",
                bytes.len()
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[..SALT_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[SALT_LEN..SALT_LEN + NONCE_LEN]);

        Ok(Self {
            salt,
            nonce,
            ciphertext: bytes[SALT_LEN + NONCE_LEN..].to_vec(),
        })
    }

    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(SALT_LEN + NONCE_LEN + self.ciphertext.len());
        bytes.extend_from_slice(&self.salt);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        hex::encode(bytes)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct StoredEntry {
    name: String,
    secret: String,
}

/// A persisted local account, validated but still sealed.
#[derive(Debug, Clone)]
pub struct LocalEntry {
    pub address: String,
    pub name: String,
    pub sealed: SealedSecret,
}

pub struct Keystore {
    store: Arc<dyn KeyValueStore>,
}

impl Keystore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key_for(address: &str) -> String {
        format!("{}{}", ENTRY_PREFIX, address)
    }

    /// Encrypts a mnemonic under `passphrase` and persists it. Returns the
    /// account address rendered with `format`.
    pub fn import(&self, name: &str, mnemonic: &str, passphrase: &str, format: u16) -> Result<String> {
        let keypair = KeyPair::from_mnemonic(mnemonic)?;
        let address = ss58::encode(format, &keypair.public_key())?;
        let sealed = SealedSecret::seal(mnemonic.as_bytes(), passphrase)?;

        self.put(&address, name, &sealed)?;
        info!("Imported local account '{}' ({})", name, address);
        Ok(address)
    }

    pub fn put(&self, address: &str, name: &str, sealed: &SealedSecret) -> Result<()> {
        let entry = StoredEntry {
            name: name.to_string(),
            secret: sealed.to_hex(),
        };
        self.store.set(&Self::key_for(address), &serde_json::to_string(&entry)?)
    }

    /// Removes the entry for `address`, matching any textual encoding of it.
    pub fn remove(&self, address: &str) -> Result<bool> {
        for key in self.store.keys()? {
            if let Some(stored) = key.strip_prefix(ENTRY_PREFIX) {
                if stored == address || address::equals(stored, address) {
                    self.store.remove(&key)?;
                    debug!("Removed local account {}", stored);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Every stored entry, each parsed independently so one corrupt record
    /// does not hide the others. Nothing is decrypted here.
    pub fn entries(&self) -> Result<Vec<(String, Result<LocalEntry>)>> {
        let mut out = Vec::new();
        for key in self.store.keys()? {
            let Some(address) = key.strip_prefix(ENTRY_PREFIX) else {
                continue;
            };
            let parsed = match self.store.get(&key)? {
                Some(raw) => Self::parse(address, &raw),
                None => continue,
            };
            out.push((address.to_string(), parsed));
        }
        Ok(out)
    }

    fn parse(address: &str, raw: &str) -> Result<LocalEntry> {
        if address::classify(address) != AddressKind::SpaceA {
            return Err(IdentityError::InvalidAddressFormat(address.to_string()));
        }
        let stored: StoredEntry = serde_json::from_str(raw)?;
        let sealed = SealedSecret::from_hex(&stored.secret)?;
        Ok(LocalEntry {
            address: address.to_string(),
            name: stored.name,
            sealed,
        })
    }
}
