//! Platform authenticator collaborator boundary.
//!
//! The custody core treats the authenticator as opaque I/O: a ceremony either
//! verifies possession of a credential, is cancelled by the user, or finds no
//! matching credential. Cancellation is a normal outcome value so callers can
//! offer a retry instead of implying data corruption.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use zeroize::Zeroizing;

use crate::errors::{WalletError, WalletResult};

const CREDENTIAL_ID_BYTES: usize = 32;
const MAX_USERNAME_LENGTH: usize = 120;

/// A newly created discoverable, user-verifying, platform-attached credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialDescriptor {
    pub credential_id: Vec<u8>,
    pub public_key: Vec<u8>,
}

/// Proof that a live ceremony completed against a credential.
///
/// The raw credential id proves which credential answered; it is never used
/// as keying material. The credential public key is what the envelope codec
/// feeds its KDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCeremony {
    pub raw_credential_id: Vec<u8>,
    pub credential_public_key: Vec<u8>,
}

/// Result of an authentication ceremony. Not an error type: user dismissal
/// is an expected outcome of a UI-blocking hardware prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CeremonyOutcome {
    Verified(VerifiedCeremony),
    Cancelled,
    UnknownCredential,
}

/// External collaborator performing WebAuthn-style ceremonies. The ceremony
/// may block indefinitely on user interaction.
pub trait PlatformAuthenticator: Send + Sync {
    fn is_supported(&self) -> bool;
    fn is_platform_authenticator_available(&self) -> bool;
    fn create_credential(&self, username: &str) -> WalletResult<CredentialDescriptor>;
    fn authenticate(&self, credential_id: &[u8]) -> WalletResult<CeremonyOutcome>;
}

#[derive(Debug)]
struct SoftCredential {
    credential_id: [u8; CREDENTIAL_ID_BYTES],
    public_key: [u8; 32],
    private_key: Zeroizing<[u8; 32]>,
    username: String,
    counter: u32,
}

/// In-process authenticator backed by Ed25519 credentials.
///
/// Stands in for the platform authenticator in development builds and tests;
/// ceremonies can be scripted to cancel, which is how tests exercise the
/// `UserCancelled` path without a hardware prompt.
#[derive(Debug, Default)]
pub struct SoftwareAuthenticator {
    entries: Mutex<Vec<SoftCredential>>,
    cancel_next: AtomicBool,
    ceremonies: AtomicU32,
}

impl SoftwareAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next ceremony to end as user dismissal.
    pub fn cancel_next_ceremony(&self) {
        self.cancel_next.store(true, Ordering::SeqCst);
    }

    /// Number of ceremonies completed (verified or not) since creation.
    pub fn ceremony_count(&self) -> u32 {
        self.ceremonies.load(Ordering::SeqCst)
    }
}

impl PlatformAuthenticator for SoftwareAuthenticator {
    fn is_supported(&self) -> bool {
        true
    }

    fn is_platform_authenticator_available(&self) -> bool {
        true
    }

    fn create_credential(&self, username: &str) -> WalletResult<CredentialDescriptor> {
        let username = username.trim();
        if username.is_empty() {
            return Err(WalletError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }
        if username.len() > MAX_USERNAME_LENGTH {
            return Err(WalletError::ValidationError(format!(
                "Username exceeds {} characters",
                MAX_USERNAME_LENGTH
            )));
        }

        let mut private_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut private_bytes);
        let signing_key = SigningKey::from_bytes(&private_bytes);
        let public_key = signing_key.verifying_key().to_bytes();

        let mut credential_id = [0u8; CREDENTIAL_ID_BYTES];
        OsRng.fill_bytes(&mut credential_id);

        let mut entries = self.entries.lock();
        entries.push(SoftCredential {
            credential_id,
            public_key,
            private_key: Zeroizing::new(private_bytes),
            username: username.to_string(),
            counter: 0,
        });

        Ok(CredentialDescriptor {
            credential_id: credential_id.to_vec(),
            public_key: public_key.to_vec(),
        })
    }

    fn authenticate(&self, credential_id: &[u8]) -> WalletResult<CeremonyOutcome> {
        self.ceremonies.fetch_add(1, Ordering::SeqCst);

        if self.cancel_next.swap(false, Ordering::SeqCst) {
            return Ok(CeremonyOutcome::Cancelled);
        }

        let mut entries = self.entries.lock();
        let entry = match entries
            .iter_mut()
            .find(|entry| entry.credential_id.as_slice() == credential_id)
        {
            Some(entry) => entry,
            None => return Ok(CeremonyOutcome::UnknownCredential),
        };

        entry.counter = entry.counter.saturating_add(1);

        // Sign a fresh challenge with the credential key and check it against
        // the registered public half, so a verified outcome actually proves
        // possession rather than a successful id lookup.
        let mut challenge = [0u8; 32];
        OsRng.fill_bytes(&mut challenge);
        let mut hasher = blake3::Hasher::new();
        hasher.update(entry.username.as_bytes());
        hasher.update(&entry.counter.to_le_bytes());
        hasher.update(&challenge);
        let digest = hasher.finalize();

        let signing_key = SigningKey::from_bytes(&entry.private_key);
        let signature = signing_key.sign(digest.as_bytes());
        let verifying_key = VerifyingKey::from_bytes(&entry.public_key)
            .map_err(|e| WalletError::CryptoError(format!("Invalid credential key: {}", e)))?;
        verifying_key
            .verify(digest.as_bytes(), &signature)
            .map_err(|_| {
                WalletError::CryptoError("Credential signature verification failed".to_string())
            })?;

        Ok(CeremonyOutcome::Verified(VerifiedCeremony {
            raw_credential_id: entry.credential_id.to_vec(),
            credential_public_key: entry.public_key.to_vec(),
        }))
    }
}
