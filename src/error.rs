use thiserror::Error;

/// Every failure the identity layer surfaces to its callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid address format: {0}")]
    InvalidAddressFormat(String),
    #[error("Signing request was rejected: {0}")]
    SigningRejected(String),
    #[error("Signer is not available: {0}")]
    SignerUnavailable(String),
    #[error("Signer does not support {0}")]
    CapabilityNotSupported(String),
    #[error("Wallet provider is not installed or not reachable: {0}")]
    ProviderUnavailable(String),
    #[error("No accounts found in {0}; create or import an account in the wallet first")]
    NoAccountsFound(String),
    #[error("Access to {0} was blocked; allow this site in the wallet settings and retry")]
    AccessBlocked(String),
    #[error("Decryption failed (wrong passphrase?)")]
    DecryptionFailed,
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Balance source error: {0}")]
    BalanceSource(String),
    #[error("Config error: {0}")]
    Config(String),
}

/// Failure reported by an external wallet collaborator (extension, injected
/// provider, bridge session, custodial SDK).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("extension not found")]
    ExtensionNotFound,
    #[error("no accounts")]
    NoAccounts,
    #[error("access blocked")]
    AccessBlocked,
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("not ready: {0}")]
    NotReady(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Maps a signing-time failure into the uniform taxonomy.
    pub fn into_signing_error(self, signer: &str) -> IdentityError {
        match self {
            ProviderError::Rejected(reason) => IdentityError::SigningRejected(reason),
            ProviderError::Unsupported(what) => IdentityError::CapabilityNotSupported(what),
            ProviderError::AccessBlocked => IdentityError::AccessBlocked(signer.to_string()),
            ProviderError::ExtensionNotFound => {
                IdentityError::SignerUnavailable(format!("{} is not installed", signer))
            }
            ProviderError::NoAccounts => {
                IdentityError::SignerUnavailable(format!("{} has no accounts", signer))
            }
            ProviderError::NotReady(reason) | ProviderError::Other(reason) => {
                IdentityError::SignerUnavailable(format!("{}: {}", signer, reason))
            }
        }
    }

    /// Maps a discovery-time failure into a distinct, user-actionable condition.
    pub fn into_discovery_error(self, source: &str) -> IdentityError {
        match self {
            ProviderError::ExtensionNotFound => IdentityError::ProviderUnavailable(source.to_string()),
            ProviderError::NoAccounts => IdentityError::NoAccountsFound(source.to_string()),
            ProviderError::AccessBlocked => IdentityError::AccessBlocked(source.to_string()),
            ProviderError::Rejected(_) => IdentityError::AccessBlocked(source.to_string()),
            ProviderError::NotReady(reason)
            | ProviderError::Unsupported(reason)
            | ProviderError::Other(reason) => {
                IdentityError::ProviderUnavailable(format!("{}: {}", source, reason))
            }
        }
    }
}

impl From<serde_json::Error> for IdentityError {
    fn from(err: serde_json::Error) -> Self {
        IdentityError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for IdentityError {
    fn from(err: std::io::Error) -> Self {
        IdentityError::Storage(err.to_string())
    }
}

pub type Result<T, E = IdentityError> = std::result::Result<T, E>;
