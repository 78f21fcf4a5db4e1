use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WalletError {
    // Key material errors
    InvalidMnemonic(String),
    CryptoError(String),

    // Envelope errors
    WrongCredential,
    DecryptionFailed,
    WrongMethod(String),

    // Passkey ceremony errors
    UserCancelled,
    CredentialNotFound,

    // Lifecycle errors
    NoWallet,
    WalletExists,
    NotUnlocked,
    LockedOut(String),

    // Storage errors
    StorageReadFailed(String),
    StorageWriteFailed(String),

    // Validation errors
    ValidationError(String),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalletError::InvalidMnemonic(msg) => write!(f, "Invalid mnemonic: {}", msg),
            WalletError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),

            // WrongCredential and DecryptionFailed must stay textually
            // identical so callers cannot distinguish a wrong password from
            // a corrupted record by message alone.
            WalletError::WrongCredential => write!(f, "Unable to decrypt wallet data"),
            WalletError::DecryptionFailed => write!(f, "Unable to decrypt wallet data"),
            WalletError::WrongMethod(msg) => write!(f, "Wrong unlock method: {}", msg),

            WalletError::UserCancelled => write!(f, "Authentication cancelled"),
            WalletError::CredentialNotFound => write!(f, "Passkey credential not found"),

            WalletError::NoWallet => write!(f, "No wallet exists on this device"),
            WalletError::WalletExists => write!(f, "A wallet already exists on this device"),
            WalletError::NotUnlocked => write!(f, "Wallet is not unlocked"),
            WalletError::LockedOut(msg) => write!(f, "Unlock temporarily disabled: {}", msg),

            WalletError::StorageReadFailed(msg) => write!(f, "Storage read failed: {}", msg),
            WalletError::StorageWriteFailed(msg) => write!(f, "Storage write failed: {}", msg),

            WalletError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

pub type WalletResult<T> = Result<T, WalletError>;
