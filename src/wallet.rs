//! Wallet lifecycle controller.
//!
//! The public contract of the custody subsystem: a state machine over
//! `NoWallet -> Locked -> Unlocked` composing the key material generator,
//! the two envelope codecs and the record store. Codec selection happens in
//! exactly one place, the dispatch on `record.encryption_method`; no other
//! module branches on the method.

use std::sync::Arc;

use parking_lot::Mutex;
use secrecy::SecretString;
use zeroize::Zeroizing;

use crate::authenticator::PlatformAuthenticator;
use crate::config::{ConfigStore, WalletConfig};
use crate::envelope::passkey::PasskeyCodec;
use crate::envelope::password::PasswordCodec;
use crate::envelope::{EncryptionMethod, WalletRecord};
use crate::errors::{WalletError, WalletResult};
use crate::keys::KeyMaterial;
use crate::session::SessionManager;
use crate::store::{FileRecordStore, RecordStore};
use crate::validation::InputValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStatus {
    NoWallet,
    Locked,
    Unlocked,
}

/// Cleartext record fields, readable without unlocking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSummary {
    pub address: String,
    pub public_key: Vec<u8>,
    pub encryption_method: EncryptionMethod,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&WalletRecord> for WalletSummary {
    fn from(record: &WalletRecord) -> Self {
        Self {
            address: record.address.clone(),
            public_key: record.public_key.clone(),
            encryption_method: record.encryption_method,
            created_at: record.created_at,
        }
    }
}

/// Owns the custody lifecycle for one device profile.
///
/// `generate`, `import`, `unlock` and `delete` are single-flight per
/// instance: a per-instance mutex serializes them so a generate racing an
/// unlock can never leave the record and the in-memory session inconsistent.
pub struct WalletManager {
    store: Arc<dyn RecordStore>,
    authenticator: Arc<dyn PlatformAuthenticator>,
    session: SessionManager,
    validator: InputValidator,
    min_password_length: usize,
    op_lock: Mutex<()>,
}

impl WalletManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        authenticator: Arc<dyn PlatformAuthenticator>,
        config: &WalletConfig,
    ) -> WalletResult<Self> {
        let timeout =
            std::time::Duration::from_secs(u64::from(config.session.auto_lock_minutes.max(1)) * 60);
        Ok(Self {
            store,
            authenticator,
            session: SessionManager::new(timeout, config.session.max_failed_attempts.max(1)),
            validator: InputValidator::new()?,
            min_password_length: config.policy.min_password_length,
            op_lock: Mutex::new(()),
        })
    }

    /// Compose a file-backed manager for a device profile directory.
    pub fn initialize(
        profile_dir: impl AsRef<std::path::Path>,
        authenticator: Arc<dyn PlatformAuthenticator>,
    ) -> WalletResult<Self> {
        let config = ConfigStore::new(profile_dir.as_ref()).load_or_default()?;
        let store = Arc::new(FileRecordStore::new(profile_dir));
        Self::new(store, authenticator, &config)
    }

    pub fn status(&self) -> WalletStatus {
        if !self.session.is_locked() {
            WalletStatus::Unlocked
        } else if self.store.exists() {
            WalletStatus::Locked
        } else {
            WalletStatus::NoWallet
        }
    }

    /// Cleartext record fields for display; `None` when no wallet exists.
    pub fn summary(&self) -> WalletResult<Option<WalletSummary>> {
        Ok(self.store.load()?.as_ref().map(WalletSummary::from))
    }

    /// Create a fresh wallet sealed under a password. Ends `Unlocked`.
    pub fn generate(&self, password: &SecretString) -> WalletResult<String> {
        let _guard = self.op_lock.lock();
        self.create_with_password(KeyMaterial::generate()?, password)
    }

    /// Create a fresh wallet sealed under a passkey credential for
    /// `username`. Ends `Unlocked`.
    pub fn generate_with_passkey(&self, username: &str) -> WalletResult<String> {
        let _guard = self.op_lock.lock();
        self.validator.validate_username(username)?;
        self.create_with_passkey(KeyMaterial::generate()?, username)
    }

    /// Restore a wallet from a 24-word phrase, sealed under a password.
    /// Fails with `InvalidMnemonic` before any persistence is attempted.
    pub fn import_from_mnemonic(
        &self,
        phrase: &str,
        password: &SecretString,
    ) -> WalletResult<String> {
        let _guard = self.op_lock.lock();
        self.validator.validate_mnemonic_shape(phrase)?;
        self.create_with_password(KeyMaterial::from_mnemonic(phrase)?, password)
    }

    /// Restore a wallet from a 24-word phrase, sealed under a passkey.
    pub fn import_from_mnemonic_with_passkey(
        &self,
        phrase: &str,
        username: &str,
    ) -> WalletResult<String> {
        let _guard = self.op_lock.lock();
        self.validator.validate_mnemonic_shape(phrase)?;
        self.validator.validate_username(username)?;
        self.create_with_passkey(KeyMaterial::from_mnemonic(phrase)?, username)
    }

    /// Unlock a password-encrypted wallet. State is unchanged on failure;
    /// a correct password always unlocks, even inside a backoff window.
    pub fn unlock(&self, password: &SecretString) -> WalletResult<String> {
        let _guard = self.op_lock.lock();

        let record = self.store.load()?.ok_or(WalletError::NoWallet)?;
        if record.encryption_method != EncryptionMethod::Password {
            return Err(WalletError::WrongMethod(
                "record requires a passkey ceremony to unlock".to_string(),
            ));
        }

        match PasswordCodec::open(&record, password) {
            Ok(material) => {
                let address = material.address.clone();
                self.session.unlock(material);
                log::info!("Wallet unlocked with password");
                Ok(address)
            }
            Err(WalletError::WrongCredential) => {
                match self.session.register_failed_attempt() {
                    Ok(_remaining) => Err(WalletError::WrongCredential),
                    Err(lockout) => Err(lockout),
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Unlock a passkey-encrypted wallet via a live authenticator ceremony.
    /// Cancellation is a normal outcome; state is unchanged on failure.
    pub fn unlock_with_passkey(&self) -> WalletResult<String> {
        let _guard = self.op_lock.lock();

        let record = self.store.load()?.ok_or(WalletError::NoWallet)?;
        if record.encryption_method != EncryptionMethod::Webauthn {
            return Err(WalletError::WrongMethod(
                "record unlocks with a password, not a passkey".to_string(),
            ));
        }

        let material = PasskeyCodec::open(&record, self.authenticator.as_ref())?;
        let address = material.address.clone();
        self.session.unlock(material);
        log::info!("Wallet unlocked with passkey");
        Ok(address)
    }

    /// Drop the in-memory key material. Idempotent; waits for in-flight
    /// signing operations to finish.
    pub fn lock(&self) {
        self.session.lock();
    }

    /// Erase the wallet record and end in `NoWallet`. Idempotent; a missing
    /// record is not an error.
    pub fn delete(&self) -> WalletResult<()> {
        let _guard = self.op_lock.lock();
        self.session.lock();
        self.store.delete()?;
        log::info!("Wallet record deleted");
        Ok(())
    }

    /// Sign raw transaction bytes. Only valid in `Unlocked`.
    pub fn sign(&self, transaction_bytes: &[u8]) -> WalletResult<Vec<u8>> {
        self.session
            .with_unlocked(|material| material.sign(transaction_bytes))
    }

    /// Sign a human-readable message. Only valid in `Unlocked`.
    pub fn sign_message(&self, text: &str) -> WalletResult<Vec<u8>> {
        self.session
            .with_unlocked(|material| material.sign(text.as_bytes()))
    }

    /// One-time mnemonic export. Separately gated from signing: callers must
    /// invoke this explicitly, and the phrase comes back in a zeroizing
    /// buffer.
    pub fn reveal_mnemonic(&self) -> WalletResult<Zeroizing<String>> {
        self.session
            .with_unlocked(|material| Ok(Zeroizing::new(material.mnemonic.clone())))
    }

    /// Account address: from the live session when unlocked, otherwise from
    /// the record's cleartext copy. `None` when no wallet exists.
    pub fn address(&self) -> WalletResult<Option<String>> {
        if let Ok(address) = self
            .session
            .peek_unlocked(|material| Ok(material.address.clone()))
        {
            return Ok(Some(address));
        }
        Ok(self.store.load()?.map(|record| record.address))
    }

    /// Account public key, available without unlocking.
    pub fn public_key(&self) -> WalletResult<Option<Vec<u8>>> {
        if let Ok(key) = self
            .session
            .peek_unlocked(|material| Ok(material.public_key.clone()))
        {
            return Ok(Some(key));
        }
        Ok(self.store.load()?.map(|record| record.public_key))
    }

    fn create_with_password(
        &self,
        material: KeyMaterial,
        password: &SecretString,
    ) -> WalletResult<String> {
        self.ensure_no_wallet()?;
        self.validator
            .validate_new_password(password, self.min_password_length)?;

        let record = PasswordCodec::seal(&material, password)?;
        self.persist_and_unlock(record, material)
    }

    fn create_with_passkey(&self, material: KeyMaterial, username: &str) -> WalletResult<String> {
        self.ensure_no_wallet()?;

        if !self.authenticator.is_supported()
            || !self.authenticator.is_platform_authenticator_available()
        {
            return Err(WalletError::ValidationError(
                "Platform authenticator is not available on this device".to_string(),
            ));
        }

        let descriptor = self.authenticator.create_credential(username)?;
        let record = PasskeyCodec::seal(
            &material,
            &descriptor.public_key,
            &descriptor.credential_id,
        )?;
        self.persist_and_unlock(record, material)
    }

    fn persist_and_unlock(
        &self,
        record: WalletRecord,
        material: KeyMaterial,
    ) -> WalletResult<String> {
        self.store.save(&record)?;
        let address = material.address.clone();
        self.session.unlock(material);
        log::info!("Wallet record created for address {}", address);
        Ok(address)
    }

    fn ensure_no_wallet(&self) -> WalletResult<()> {
        if self.store.exists() {
            return Err(WalletError::WalletExists);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::SoftwareAuthenticator;
    use crate::store::MemoryRecordStore;

    fn secret(password: &str) -> SecretString {
        SecretString::from(password.to_string())
    }

    fn manager() -> WalletManager {
        WalletManager::new(
            Arc::new(MemoryRecordStore::new()),
            Arc::new(SoftwareAuthenticator::new()),
            &WalletConfig::default(),
        )
        .unwrap()
    }

    const TEST_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
         abandon abandon abandon abandon abandon abandon abandon abandon \
         abandon abandon abandon abandon abandon abandon abandon art";

    #[test]
    fn generate_unlock_lock_scenario() {
        let manager = manager();
        assert_eq!(manager.status(), WalletStatus::NoWallet);

        let address = manager.generate(&secret("correcthorsebattery")).unwrap();
        assert_eq!(manager.status(), WalletStatus::Unlocked);

        manager.lock();
        assert_eq!(manager.status(), WalletStatus::Locked);

        let unlocked_address = manager.unlock(&secret("correcthorsebattery")).unwrap();
        assert_eq!(unlocked_address, address);
        assert_eq!(manager.status(), WalletStatus::Unlocked);

        manager.lock();
        let err = manager.unlock(&secret("wrong-password")).unwrap_err();
        assert_eq!(err, WalletError::WrongCredential);
        assert_eq!(manager.status(), WalletStatus::Locked);
    }

    #[test]
    fn unlock_without_wallet_fails_with_no_wallet() {
        let manager = manager();
        let err = manager.unlock(&secret("whatever1")).unwrap_err();
        assert_eq!(err, WalletError::NoWallet);
    }

    #[test]
    fn generate_rejects_short_passwords() {
        let manager = manager();
        let err = manager.generate(&secret("short")).unwrap_err();
        assert!(matches!(err, WalletError::ValidationError(_)));
        assert_eq!(manager.status(), WalletStatus::NoWallet);
    }

    #[test]
    fn generate_over_existing_wallet_is_rejected() {
        let manager = manager();
        manager.generate(&secret("correcthorsebattery")).unwrap();
        let err = manager.generate(&secret("another-password")).unwrap_err();
        assert_eq!(err, WalletError::WalletExists);
    }

    #[test]
    fn import_is_deterministic_and_validates_first() {
        let manager = manager();
        let address = manager
            .import_from_mnemonic(TEST_PHRASE, &secret("importpass"))
            .unwrap();

        let reference = KeyMaterial::from_mnemonic(TEST_PHRASE).unwrap();
        assert_eq!(address, reference.address);
    }

    #[test]
    fn invalid_mnemonic_fails_before_persistence() {
        let manager = manager();
        let err = manager
            .import_from_mnemonic("not a mnemonic", &secret("importpass"))
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(_)));
        assert_eq!(manager.status(), WalletStatus::NoWallet);
    }

    #[test]
    fn sign_requires_unlocked_state() {
        let manager = manager();
        manager.generate(&secret("correcthorsebattery")).unwrap();

        assert!(manager.sign(b"tx").is_ok());
        assert!(manager.sign_message("hello").is_ok());

        manager.lock();
        assert_eq!(manager.sign(b"tx").unwrap_err(), WalletError::NotUnlocked);
        assert_eq!(
            manager.sign_message("hello").unwrap_err(),
            WalletError::NotUnlocked
        );

        manager.unlock(&secret("correcthorsebattery")).unwrap();
        assert!(manager.sign(b"tx").is_ok());
    }

    #[test]
    fn reveal_mnemonic_is_gated_on_unlock() {
        let manager = manager();
        manager
            .import_from_mnemonic(TEST_PHRASE, &secret("importpass"))
            .unwrap();

        let revealed = manager.reveal_mnemonic().unwrap();
        assert_eq!(
            revealed.split_whitespace().count(),
            crate::keys::MNEMONIC_WORD_COUNT
        );

        manager.lock();
        assert_eq!(
            manager.reveal_mnemonic().unwrap_err(),
            WalletError::NotUnlocked
        );
    }

    #[test]
    fn delete_then_generate_creates_unrelated_wallet() {
        let manager = manager();
        let first = manager.generate(&secret("correcthorsebattery")).unwrap();

        manager.delete().unwrap();
        assert_eq!(manager.status(), WalletStatus::NoWallet);
        assert_eq!(
            manager.unlock(&secret("correcthorsebattery")).unwrap_err(),
            WalletError::NoWallet
        );
        // Idempotent.
        manager.delete().unwrap();

        let second = manager.generate(&secret("correcthorsebattery")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn passkey_lifecycle_round_trip() {
        let manager = manager();
        let address = manager.generate_with_passkey("alice@pixswap").unwrap();
        assert_eq!(manager.status(), WalletStatus::Unlocked);

        manager.lock();
        let unlocked_address = manager.unlock_with_passkey().unwrap();
        assert_eq!(unlocked_address, address);
    }

    #[test]
    fn cancelled_ceremony_leaves_wallet_locked() {
        let authenticator = Arc::new(SoftwareAuthenticator::new());
        let manager = WalletManager::new(
            Arc::new(MemoryRecordStore::new()),
            authenticator.clone(),
            &WalletConfig::default(),
        )
        .unwrap();

        manager.generate_with_passkey("bob").unwrap();
        manager.lock();

        authenticator.cancel_next_ceremony();
        let err = manager.unlock_with_passkey().unwrap_err();
        assert_eq!(err, WalletError::UserCancelled);
        assert_eq!(manager.status(), WalletStatus::Locked);

        // A retry after cancellation succeeds.
        assert!(manager.unlock_with_passkey().is_ok());
    }

    #[test]
    fn method_dispatch_rejects_mismatched_unlock() {
        let manager = manager();
        manager.generate_with_passkey("carol").unwrap();
        manager.lock();
        let err = manager.unlock(&secret("correcthorsebattery")).unwrap_err();
        assert!(matches!(err, WalletError::WrongMethod(_)));

        let manager = self::manager();
        manager.generate(&secret("correcthorsebattery")).unwrap();
        manager.lock();
        let err = manager.unlock_with_passkey().unwrap_err();
        assert!(matches!(err, WalletError::WrongMethod(_)));
    }

    #[test]
    fn summary_and_address_work_while_locked() {
        let manager = manager();
        let address = manager.generate(&secret("correcthorsebattery")).unwrap();
        manager.lock();

        let summary = manager.summary().unwrap().expect("record present");
        assert_eq!(summary.address, address);
        assert_eq!(summary.encryption_method, EncryptionMethod::Password);

        assert_eq!(manager.address().unwrap(), Some(address));
        assert!(manager.public_key().unwrap().is_some());
    }

    #[test]
    fn repeated_wrong_passwords_are_throttled() {
        let manager = manager();
        manager.generate(&secret("correcthorsebattery")).unwrap();
        manager.lock();

        assert_eq!(
            manager.unlock(&secret("wrong-one")).unwrap_err(),
            WalletError::WrongCredential
        );
        // A second failure inside the backoff window is rejected.
        let err = manager.unlock(&secret("wrong-two")).unwrap_err();
        assert!(matches!(err, WalletError::LockedOut(_)));
        assert_eq!(manager.status(), WalletStatus::Locked);
    }

    #[test]
    fn correct_password_unlocks_during_backoff_window() {
        let manager = manager();
        let address = manager.generate(&secret("correcthorsebattery")).unwrap();
        manager.lock();

        assert_eq!(
            manager.unlock(&secret("wrong-password")).unwrap_err(),
            WalletError::WrongCredential
        );
        // Throttling applies to failures only; the right password goes
        // straight through with no waiting period.
        let unlocked = manager.unlock(&secret("correcthorsebattery")).unwrap();
        assert_eq!(unlocked, address);
        assert_eq!(manager.status(), WalletStatus::Unlocked);
    }
}
