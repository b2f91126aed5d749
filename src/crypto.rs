use bip39::{Language, Mnemonic};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{IdentityError, Result};

/// Ed25519 keypair derived from a BIP-39 phrase. The secret half zeroizes on drop.
pub struct KeyPair {
    pub signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new 12-word mnemonic
    pub fn generate_mnemonic() -> Result<Zeroizing<String>> {
        let mut entropy = Zeroizing::new([0u8; 16]); // 128 bits = 12 words
        OsRng.fill_bytes(&mut entropy[..]);
        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..])
            .map(Zeroizing::new)
            .map_err(|e| IdentityError::Serialization(format!("Invalid entropy: {}", e)))?;
        Ok(Zeroizing::new(mnemonic.to_string()))
    }

    /// Restore keypair from mnemonic. Uses the first 32 bytes of the seed.
    /// The parsed words are wiped when this returns; `phrase` itself is the
    /// caller's to clear.
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
            .map(Zeroizing::new)
            .map_err(|e| IdentityError::Serialization(format!("Invalid mnemonic: {}", e)))?;
        let seed = Zeroizing::new(mnemonic.to_seed(""));

        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(&seed[0..32]);
        Ok(KeyPair {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.signing_key.verifying_key().verify(message, signature).is_ok()
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

/// Verify a `0x`-hex signature against a message with a raw public key.
pub fn verify_with_pubkey(message: &[u8], signature_hex: &str, pubkey: &[u8; 32]) -> bool {
    let digits = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
    let Ok(sig_bytes) = hex::decode(digits) else {
        return false;
    };
    let (Ok(signature), Ok(key)) = (Signature::from_slice(&sig_bytes), VerifyingKey::from_bytes(pubkey)) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str = "bottom drive obey lake curtain smoke basket hold race lonely fit walk";

    #[test]
    fn test_mnemonic_is_deterministic() {
        let a = KeyPair::from_mnemonic(PHRASE).unwrap();
        let b = KeyPair::from_mnemonic(PHRASE).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_generated_mnemonic_restores() {
        let phrase = KeyPair::generate_mnemonic().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 12);
        assert!(KeyPair::from_mnemonic(&phrase).is_ok());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::from_mnemonic(PHRASE).unwrap();
        let sig = kp.sign(b"mint");
        assert!(kp.verify(b"mint", &sig));
        assert!(!kp.verify(b"burn", &sig));

        let sig_hex = format!("0x{}", hex::encode(sig.to_bytes()));
        assert!(verify_with_pubkey(b"mint", &sig_hex, &kp.public_key()));
    }

    #[test]
    fn test_parsed_mnemonic_is_wiped() {
        fn wipeable<T: zeroize::Zeroize>(_: &T) {}
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, PHRASE).unwrap();
        wipeable(&mnemonic);
        assert_eq!(Zeroizing::new(mnemonic).word_count(), 12);
    }

    #[test]
    fn test_invalid_mnemonic() {
        assert!(KeyPair::from_mnemonic("not a real phrase").is_err());
    }
}
