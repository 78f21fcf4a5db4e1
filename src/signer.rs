//! Signing adapter boundary consumed by the rest of the application.
//!
//! Both the embedded custody wallet and any external/hardware wallet
//! implement this surface, so callers stay agnostic to custody method.

use crate::errors::{WalletError, WalletResult};
use crate::wallet::WalletManager;

/// Adapter-specific signing options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningOptions {
    /// Ask the adapter to broadcast after signing. External wallet adapters
    /// may honor this; the embedded wallet performs no network I/O and
    /// rejects it.
    pub broadcast: bool,
}

/// A signed transaction payload ready for an external broadcaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

pub trait WalletSigner {
    fn get_address(&self) -> Option<String>;
    fn get_public_key(&self) -> Option<Vec<u8>>;
    fn sign_message(&self, text: &str) -> WalletResult<Vec<u8>>;
    fn sign_transaction(
        &self,
        transaction_bytes: &[u8],
        options: &SigningOptions,
    ) -> WalletResult<SignedTransaction>;
}

impl WalletSigner for WalletManager {
    fn get_address(&self) -> Option<String> {
        match self.address() {
            Ok(address) => address,
            Err(e) => {
                log::warn!("Failed to read wallet address: {}", e);
                None
            }
        }
    }

    fn get_public_key(&self) -> Option<Vec<u8>> {
        match self.public_key() {
            Ok(key) => key,
            Err(e) => {
                log::warn!("Failed to read wallet public key: {}", e);
                None
            }
        }
    }

    fn sign_message(&self, text: &str) -> WalletResult<Vec<u8>> {
        WalletManager::sign_message(self, text)
    }

    fn sign_transaction(
        &self,
        transaction_bytes: &[u8],
        options: &SigningOptions,
    ) -> WalletResult<SignedTransaction> {
        if options.broadcast {
            return Err(WalletError::ValidationError(
                "Embedded wallet does not broadcast transactions".to_string(),
            ));
        }

        let signature = self.sign(transaction_bytes)?;
        let public_key = self
            .public_key()?
            .ok_or(WalletError::NoWallet)?;

        Ok(SignedTransaction {
            payload: transaction_bytes.to_vec(),
            signature,
            public_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::SoftwareAuthenticator;
    use crate::config::WalletConfig;
    use crate::store::MemoryRecordStore;
    use secrecy::SecretString;
    use std::sync::Arc;

    fn unlocked_manager() -> WalletManager {
        let manager = WalletManager::new(
            Arc::new(MemoryRecordStore::new()),
            Arc::new(SoftwareAuthenticator::new()),
            &WalletConfig::default(),
        )
        .unwrap();
        manager
            .generate(&SecretString::from("adapter test pass".to_string()))
            .unwrap();
        manager
    }

    #[test]
    fn adapter_exposes_address_and_public_key() {
        let manager = unlocked_manager();
        let signer: &dyn WalletSigner = &manager;

        let address = signer.get_address().expect("address available");
        assert!(address.starts_with("bc1q"));
        assert_eq!(signer.get_public_key().unwrap().len(), 32);
    }

    #[test]
    fn adapter_returns_none_when_no_wallet() {
        let manager = WalletManager::new(
            Arc::new(MemoryRecordStore::new()),
            Arc::new(SoftwareAuthenticator::new()),
            &WalletConfig::default(),
        )
        .unwrap();
        let signer: &dyn WalletSigner = &manager;
        assert!(signer.get_address().is_none());
        assert!(signer.get_public_key().is_none());
    }

    #[test]
    fn sign_transaction_packages_signature_and_key() {
        let manager = unlocked_manager();
        let signed = manager
            .sign_transaction(b"raw tx bytes", &SigningOptions::default())
            .unwrap();
        assert_eq!(signed.payload, b"raw tx bytes");
        assert_eq!(signed.signature.len(), 64);
        assert_eq!(signed.public_key.len(), 32);
    }

    #[test]
    fn broadcast_option_is_rejected_by_embedded_wallet() {
        let manager = unlocked_manager();
        let options = SigningOptions { broadcast: true };
        let err = manager.sign_transaction(b"tx", &options).unwrap_err();
        assert!(matches!(err, WalletError::ValidationError(_)));
    }

    #[test]
    fn locked_adapter_refuses_to_sign() {
        let manager = unlocked_manager();
        manager.lock();
        let err = manager
            .sign_transaction(b"tx", &SigningOptions::default())
            .unwrap_err();
        assert_eq!(err, WalletError::NotUnlocked);
    }
}
