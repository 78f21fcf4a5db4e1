/// Key material generation for the custody wallet.
///
/// Turns CSPRNG entropy into a 24-word BIP39 mnemonic and deterministically
/// derives a single Ed25519 account (private key, public key, bech32 address)
/// from it. Pure functions of their input; nothing here touches storage.
use bech32::{hrp, segwit, Fe32};
use bip39::{Language, Mnemonic};
use ed25519_dalek::{Signature, Signer, SigningKey};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroize;

use crate::errors::{WalletError, WalletResult};

/// Wallets are always created from 256 bits of entropy (24 words).
pub const MNEMONIC_WORD_COUNT: usize = 24;
const ENTROPY_BYTES: usize = 32;
const ED25519_DERIVATION_DOMAIN: &[u8] = b"PIXSWAP_ED25519_DERIVE_V1";
const WITNESS_PROGRAM_LEN: usize = 20;

/// Decrypted spending key material. Exists only between unlock/generate and
/// the next lock; zeroized on drop. This struct is also the plaintext of the
/// envelope ciphertext, so its serialized field names are part of the
/// persisted format.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
#[serde(rename_all = "camelCase")]
pub struct KeyMaterial {
    pub mnemonic: String,
    #[serde(with = "crate::envelope::serde_hex")]
    pub private_key: Vec<u8>,
    #[serde(with = "crate::envelope::serde_hex")]
    pub public_key: Vec<u8>,
    pub address: String,
}

impl KeyMaterial {
    /// Generate fresh key material from OS entropy.
    pub fn generate() -> WalletResult<Self> {
        let mut entropy = [0u8; ENTROPY_BYTES];
        let mut rng = OsRng;
        rng.try_fill_bytes(&mut entropy)
            .map_err(|e| WalletError::CryptoError(format!("Failed to generate entropy: {}", e)))?;

        let mnemonic = Mnemonic::from_entropy(&entropy)
            .map_err(|e| WalletError::CryptoError(format!("Failed to create mnemonic: {}", e)))?;
        entropy.zeroize();

        Self::derive(mnemonic)
    }

    /// Restore key material from a caller-supplied 24-word phrase.
    ///
    /// Any malformed phrase (wrong word count, unknown word, checksum
    /// mismatch) fails with `InvalidMnemonic`; a bad checksum is never
    /// silently corrected.
    pub fn from_mnemonic(phrase: &str) -> WalletResult<Self> {
        let word_count = phrase.split_whitespace().count();
        if word_count != MNEMONIC_WORD_COUNT {
            return Err(WalletError::InvalidMnemonic(format!(
                "expected {} words, got {}",
                MNEMONIC_WORD_COUNT, word_count
            )));
        }

        let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;

        Self::derive(mnemonic)
    }

    fn derive(mnemonic: Mnemonic) -> WalletResult<Self> {
        let mut seed = mnemonic.to_seed("");

        let mut hmac = Hmac::<Sha512>::new_from_slice(ED25519_DERIVATION_DOMAIN)
            .map_err(|e| WalletError::CryptoError(format!("HMAC error: {}", e)))?;
        hmac.update(&seed);
        let digest = hmac.finalize().into_bytes();
        seed.zeroize();

        let mut private_bytes: [u8; 32] = digest[..32]
            .try_into()
            .map_err(|_| WalletError::CryptoError("Key derivation failed".to_string()))?;

        let signing_key = SigningKey::from_bytes(&private_bytes);
        let verifying_key = signing_key.verifying_key();
        private_bytes.zeroize();

        let public_key = verifying_key.to_bytes().to_vec();
        let address = derive_address(&public_key)?;

        Ok(Self {
            mnemonic: mnemonic.to_string(),
            private_key: signing_key.to_bytes().to_vec(),
            public_key,
            address,
        })
    }

    /// Sign arbitrary bytes with the account key.
    pub fn sign(&self, data: &[u8]) -> WalletResult<Vec<u8>> {
        let signature: Signature = self.signing_key()?.sign(data);
        Ok(signature.to_bytes().to_vec())
    }

    fn signing_key(&self) -> WalletResult<SigningKey> {
        let bytes: [u8; 32] = self
            .private_key
            .as_slice()
            .try_into()
            .map_err(|_| WalletError::CryptoError("Malformed private key".to_string()))?;
        Ok(SigningKey::from_bytes(&bytes))
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("address", &self.address)
            .field("public_key", &self.public_key_hex())
            .field("private_key", &"<redacted>")
            .field("mnemonic", &"<redacted>")
            .finish()
    }
}

/// Derive the bech32 account address: witness v0 over SHA-256(pubkey)[..20].
fn derive_address(public_key: &[u8]) -> WalletResult<String> {
    let digest = Sha256::digest(public_key);
    let program = &digest[..WITNESS_PROGRAM_LEN];
    segwit::encode(hrp::BC, Fe32::Q, program)
        .map_err(|e| WalletError::CryptoError(format!("Address encoding failed: {}", e)))
}
