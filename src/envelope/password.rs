//! Password envelope codec.
//!
//! Derives the AEAD key from a user password with PBKDF2-HMAC-SHA256. The
//! iteration count is a compatibility-relevant constant: records sealed at
//! one count can only be opened at the same count, so it must never change
//! for the v1 record format.

use std::num::NonZeroU32;

use ring::pbkdf2;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use super::{
    open_key_material, random_salt, record_timestamp_now, seal_key_material, EncryptionMethod,
    WalletRecord, KEY_LEN,
};
use crate::errors::{WalletError, WalletResult};
use crate::keys::KeyMaterial;

/// Fixed work factor shared by seal and open.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Encrypts and decrypts the wallet record under a password-derived key.
///
/// The codec accepts any password of any length; the documented 8-character
/// minimum is the caller's create-time policy, enforced in
/// [`crate::validation`], never here — unlock must always accept whatever
/// the record was sealed with.
pub struct PasswordCodec;

impl PasswordCodec {
    pub fn seal(material: &KeyMaterial, password: &SecretString) -> WalletResult<WalletRecord> {
        let salt = random_salt();
        let key = derive_key(password, &salt)?;
        let (ciphertext, iv) = seal_key_material(&key, material)?;

        Ok(WalletRecord {
            ciphertext,
            salt: salt.to_vec(),
            iv: iv.to_vec(),
            encryption_method: EncryptionMethod::Password,
            address: material.address.clone(),
            public_key: material.public_key.clone(),
            created_at: record_timestamp_now(),
            webauthn_credential_id: None,
            webauthn_public_key: None,
        })
    }

    /// Re-derive the key from `(password, record.salt)` and decrypt.
    ///
    /// Authentication-tag failure surfaces as `WrongCredential`, deliberately
    /// indistinguishable from a corrupted record: anything more specific
    /// would be an oracle for password guessing.
    pub fn open(record: &WalletRecord, password: &SecretString) -> WalletResult<KeyMaterial> {
        if record.encryption_method != EncryptionMethod::Password {
            return Err(WalletError::WrongMethod(
                "record is not password-encrypted".to_string(),
            ));
        }

        let key = derive_key(password, &record.salt)?;
        open_key_material(&key, &record.iv, &record.ciphertext).map_err(|e| match e {
            WalletError::DecryptionFailed => WalletError::WrongCredential,
            other => other,
        })
    }
}

/// PBKDF2-HMAC-SHA256 over the trimmed password. Only leading and trailing
/// whitespace is collapsed (copy-paste artifacts); interior whitespace is
/// significant.
fn derive_key(password: &SecretString, salt: &[u8]) -> WalletResult<Zeroizing<[u8; KEY_LEN]>> {
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS)
        .ok_or_else(|| WalletError::CryptoError("PBKDF2 iteration count is zero".to_string()))?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.expose_secret().trim().as_bytes(),
        key.as_mut(),
    );
    Ok(key)
}
