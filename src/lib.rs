// lib.rs - Core library structure for the custody wallet

pub mod authenticator;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod keys;
pub mod session;
pub mod signer;
pub mod store;
pub mod validation;
pub mod wallet;

// Re-export common types
pub use authenticator::{
    CeremonyOutcome, CredentialDescriptor, PlatformAuthenticator, SoftwareAuthenticator,
    VerifiedCeremony,
};
pub use config::{ConfigStore, PolicyConfig, SessionConfig, WalletConfig};
pub use envelope::passkey::PasskeyCodec;
pub use envelope::password::PasswordCodec;
pub use envelope::{EncryptionMethod, WalletRecord};
pub use errors::{WalletError, WalletResult};
pub use keys::KeyMaterial;
pub use session::SessionManager;
pub use signer::{SignedTransaction, SigningOptions, WalletSigner};
pub use store::{FileRecordStore, MemoryRecordStore, RecordStore};
pub use validation::InputValidator;
pub use wallet::{WalletManager, WalletStatus, WalletSummary};
