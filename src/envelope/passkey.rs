//! Passkey envelope codec.
//!
//! Derives the AEAD key from the platform-authenticator credential public
//! key with HKDF-SHA256. The public key is, by definition, not secret;
//! protection comes from requiring a live ceremony on the same
//! device/authenticator to reproduce it. Platform authenticators never
//! export their private signing key, so keying off the public half is what
//! lets this codec share the password codec's record format, substituting
//! only the KDF and its source keying material.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{
    open_key_material, random_salt, record_timestamp_now, seal_key_material, EncryptionMethod,
    WalletRecord, KEY_LEN,
};
use crate::authenticator::{CeremonyOutcome, PlatformAuthenticator};
use crate::errors::{WalletError, WalletResult};
use crate::keys::KeyMaterial;

/// Application-specific HKDF info string, fixed for the v1 record format.
const PASSKEY_KDF_INFO: &[u8] = b"pixswap.wallet.passkey.envelope.v1";

pub struct PasskeyCodec;

impl PasskeyCodec {
    pub fn seal(
        material: &KeyMaterial,
        authenticator_public_key: &[u8],
        authenticator_credential_id: &[u8],
    ) -> WalletResult<WalletRecord> {
        if authenticator_public_key.is_empty() {
            return Err(WalletError::ValidationError(
                "Authenticator public key cannot be empty".to_string(),
            ));
        }
        if authenticator_credential_id.is_empty() {
            return Err(WalletError::ValidationError(
                "Authenticator credential id cannot be empty".to_string(),
            ));
        }

        let salt = random_salt();
        let key = derive_key(authenticator_public_key, &salt)?;
        let (ciphertext, iv) = seal_key_material(&key, material)?;

        Ok(WalletRecord {
            ciphertext,
            salt: salt.to_vec(),
            iv: iv.to_vec(),
            encryption_method: EncryptionMethod::Webauthn,
            address: material.address.clone(),
            public_key: material.public_key.clone(),
            created_at: record_timestamp_now(),
            webauthn_credential_id: Some(authenticator_credential_id.to_vec()),
            webauthn_public_key: Some(authenticator_public_key.to_vec()),
        })
    }

    /// Complete a live ceremony against the record's credential, then
    /// re-derive the AEAD key and decrypt.
    ///
    /// The ceremony proves possession; the key is derived from the credential
    /// public key the ceremony reports, which for the genuine authenticator
    /// equals the stored `webauthn_public_key`. A tag mismatch after a
    /// successful ceremony is an integrity fault (`DecryptionFailed`), not a
    /// retryable credential error.
    pub fn open(
        record: &WalletRecord,
        authenticator: &dyn PlatformAuthenticator,
    ) -> WalletResult<KeyMaterial> {
        if record.encryption_method != EncryptionMethod::Webauthn {
            return Err(WalletError::WrongMethod(
                "record is not passkey-encrypted".to_string(),
            ));
        }

        let credential_id = record
            .webauthn_credential_id
            .as_deref()
            .ok_or(WalletError::CredentialNotFound)?;

        let ceremony = match authenticator.authenticate(credential_id)? {
            CeremonyOutcome::Verified(ceremony) => ceremony,
            CeremonyOutcome::Cancelled => return Err(WalletError::UserCancelled),
            CeremonyOutcome::UnknownCredential => return Err(WalletError::CredentialNotFound),
        };

        let key = derive_key(&ceremony.credential_public_key, &record.salt)?;
        open_key_material(&key, &record.iv, &record.ciphertext)
    }
}

fn derive_key(ikm: &[u8], salt: &[u8]) -> WalletResult<Zeroizing<[u8; KEY_LEN]>> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    hkdf.expand(PASSKEY_KDF_INFO, key.as_mut())
        .map_err(|e| WalletError::CryptoError(format!("HKDF expansion failed: {}", e)))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::{CredentialDescriptor, SoftwareAuthenticator, VerifiedCeremony};

    /// Simulated authenticator that always verifies and reports a fixed
    /// public key, regardless of which credential is asked for.
    struct ScriptedAuthenticator {
        public_key: Vec<u8>,
    }

    impl PlatformAuthenticator for ScriptedAuthenticator {
        fn is_supported(&self) -> bool {
            true
        }

        fn is_platform_authenticator_available(&self) -> bool {
            true
        }

        fn create_credential(&self, _username: &str) -> WalletResult<CredentialDescriptor> {
            unimplemented!("scripted authenticator never creates credentials")
        }

        fn authenticate(&self, credential_id: &[u8]) -> WalletResult<CeremonyOutcome> {
            Ok(CeremonyOutcome::Verified(VerifiedCeremony {
                raw_credential_id: credential_id.to_vec(),
                credential_public_key: self.public_key.clone(),
            }))
        }
    }

    fn sealed_wallet() -> (WalletRecord, KeyMaterial, SoftwareAuthenticator) {
        let authenticator = SoftwareAuthenticator::new();
        let descriptor = authenticator.create_credential("alice@pixswap").unwrap();
        let material = KeyMaterial::generate().unwrap();
        let record = PasskeyCodec::seal(
            &material,
            &descriptor.public_key,
            &descriptor.credential_id,
        )
        .unwrap();
        (record, material, authenticator)
    }

    #[test]
    fn seal_open_round_trip_with_live_ceremony() {
        let (record, material, authenticator) = sealed_wallet();

        assert_eq!(record.encryption_method, EncryptionMethod::Webauthn);
        assert!(record.validate().is_ok());
        assert_eq!(record.address, material.address);

        let opened = PasskeyCodec::open(&record, &authenticator).unwrap();
        assert_eq!(opened, material);
        assert_eq!(authenticator.ceremony_count(), 1);
    }

    #[test]
    fn cancelled_ceremony_surfaces_as_user_cancelled() {
        let (record, _, authenticator) = sealed_wallet();
        authenticator.cancel_next_ceremony();
        let err = PasskeyCodec::open(&record, &authenticator).unwrap_err();
        assert_eq!(err, WalletError::UserCancelled);
    }

    #[test]
    fn missing_credential_surfaces_as_credential_not_found() {
        let (record, _, _) = sealed_wallet();
        // A fresh authenticator has no matching credential.
        let other = SoftwareAuthenticator::new();
        let err = PasskeyCodec::open(&record, &other).unwrap_err();
        assert_eq!(err, WalletError::CredentialNotFound);
    }

    #[test]
    fn ceremony_reporting_original_public_key_round_trips() {
        let (record, material, _) = sealed_wallet();
        let scripted = ScriptedAuthenticator {
            public_key: record.webauthn_public_key.clone().unwrap(),
        };
        let opened = PasskeyCodec::open(&record, &scripted).unwrap();
        assert_eq!(opened, material);
    }

    #[test]
    fn wrong_authenticator_public_key_fails_as_decryption_failed() {
        let (record, _, _) = sealed_wallet();
        let scripted = ScriptedAuthenticator {
            public_key: vec![0xAB; 32],
        };
        let err = PasskeyCodec::open(&record, &scripted).unwrap_err();
        assert_eq!(err, WalletError::DecryptionFailed);
    }

    #[test]
    fn tampered_ciphertext_fails_after_successful_ceremony() {
        let (mut record, _, authenticator) = sealed_wallet();
        record.ciphertext[0] ^= 0xFF;
        let err = PasskeyCodec::open(&record, &authenticator).unwrap_err();
        assert_eq!(err, WalletError::DecryptionFailed);
    }

    #[test]
    fn open_rejects_password_records() {
        let (mut record, _, authenticator) = sealed_wallet();
        record.encryption_method = EncryptionMethod::Password;
        let err = PasskeyCodec::open(&record, &authenticator).unwrap_err();
        assert!(matches!(err, WalletError::WrongMethod(_)));
    }

    #[test]
    fn seal_rejects_empty_authenticator_inputs() {
        let material = KeyMaterial::generate().unwrap();
        assert!(PasskeyCodec::seal(&material, &[], &[1]).is_err());
        assert!(PasskeyCodec::seal(&material, &[1], &[]).is_err());
    }
}
