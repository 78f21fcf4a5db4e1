//! Envelope encryption for the persisted wallet record.
//!
//! Two interchangeable codecs share one record shape and one AEAD layer:
//! [`password`] derives the symmetric key from a user password (PBKDF2),
//! [`passkey`] derives it from a platform-authenticator credential public
//! key (HKDF). Only the KDF and its source keying material differ; the
//! ciphertext format is bit-for-bit compatible between the two.

pub mod passkey;
pub mod password;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::errors::{WalletError, WalletResult};
use crate::keys::KeyMaterial;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// How the record's ciphertext key is derived.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EncryptionMethod {
    /// Legacy records predate the method field and are password-encrypted.
    #[default]
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "webauthn")]
    Webauthn,
}

/// The single persisted wallet record for a device profile.
///
/// Serialized field names and encodings are the on-disk contract shared with
/// the application frontend; changing them breaks existing profiles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    #[serde(with = "serde_b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "serde_b64")]
    pub salt: Vec<u8>,
    #[serde(with = "serde_b64")]
    pub iv: Vec<u8>,
    #[serde(default)]
    pub encryption_method: EncryptionMethod,
    /// Cleartext copy for display without unlocking; never a substitute for
    /// the ciphertext contents.
    pub address: String,
    #[serde(with = "serde_hex")]
    pub public_key: Vec<u8>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_b64_opt")]
    pub webauthn_credential_id: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_b64_opt")]
    pub webauthn_public_key: Option<Vec<u8>>,
}

impl WalletRecord {
    /// Enforce the structural invariants of the persisted format.
    pub fn validate(&self) -> WalletResult<()> {
        if self.salt.len() != SALT_LEN {
            return Err(WalletError::ValidationError(format!(
                "Record salt must be {} bytes, got {}",
                SALT_LEN,
                self.salt.len()
            )));
        }
        if self.iv.len() != IV_LEN {
            return Err(WalletError::ValidationError(format!(
                "Record IV must be {} bytes, got {}",
                IV_LEN,
                self.iv.len()
            )));
        }

        match self.encryption_method {
            EncryptionMethod::Webauthn => {
                if self.webauthn_credential_id.is_none() || self.webauthn_public_key.is_none() {
                    return Err(WalletError::ValidationError(
                        "Webauthn record is missing authenticator fields".to_string(),
                    ));
                }
            }
            EncryptionMethod::Password => {
                if self.webauthn_credential_id.is_some() || self.webauthn_public_key.is_some() {
                    return Err(WalletError::ValidationError(
                        "Password record must not carry authenticator fields".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Current time truncated to milliseconds, the precision of the persisted
/// `createdAt` encoding. Sealing at full precision would make a record
/// compare unequal to its own saved-then-loaded copy.
pub(crate) fn record_timestamp_now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

pub(crate) fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub(crate) fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Serialize and AEAD-encrypt key material with a fresh IV.
pub(crate) fn seal_key_material(
    key: &Zeroizing<[u8; KEY_LEN]>,
    material: &KeyMaterial,
) -> WalletResult<(Vec<u8>, [u8; IV_LEN])> {
    let iv = random_iv();
    let plaintext = Zeroizing::new(
        serde_json::to_vec(material)
            .map_err(|e| WalletError::CryptoError(format!("Serialization failed: {}", e)))?,
    );
    let ciphertext = encrypt_aes_gcm(key, iv, &plaintext)?;
    Ok((ciphertext, iv))
}

/// AEAD-decrypt and deserialize key material. Any tag or shape failure is
/// reported as `DecryptionFailed`; the password codec narrows that to
/// `WrongCredential` on its own path.
pub(crate) fn open_key_material(
    key: &Zeroizing<[u8; KEY_LEN]>,
    iv: &[u8],
    ciphertext: &[u8],
) -> WalletResult<KeyMaterial> {
    let iv: [u8; IV_LEN] = iv
        .try_into()
        .map_err(|_| WalletError::DecryptionFailed)?;
    let plaintext = decrypt_aes_gcm(key, iv, ciphertext)?;
    serde_json::from_slice(&plaintext).map_err(|_| WalletError::DecryptionFailed)
}

fn encrypt_aes_gcm(
    key: &Zeroizing<[u8; KEY_LEN]>,
    iv: [u8; IV_LEN],
    plaintext: &[u8],
) -> WalletResult<Vec<u8>> {
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, key.as_ref())
        .map_err(|e| WalletError::CryptoError(format!("Invalid encryption key: {}", e)))?;
    let key = LessSafeKey::new(unbound_key);
    let nonce = Nonce::assume_unique_for_key(iv);

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| WalletError::CryptoError("Encryption failure".to_string()))?;
    Ok(in_out)
}

fn decrypt_aes_gcm(
    key: &Zeroizing<[u8; KEY_LEN]>,
    iv: [u8; IV_LEN],
    ciphertext: &[u8],
) -> WalletResult<Zeroizing<Vec<u8>>> {
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, key.as_ref())
        .map_err(|e| WalletError::CryptoError(format!("Invalid encryption key: {}", e)))?;
    let key = LessSafeKey::new(unbound_key);
    let nonce = Nonce::assume_unique_for_key(iv);

    if ciphertext.len() < aead::AES_256_GCM.tag_len() {
        return Err(WalletError::DecryptionFailed);
    }

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| WalletError::DecryptionFailed)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

pub(crate) mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod serde_b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(&encoded).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod serde_b64_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
