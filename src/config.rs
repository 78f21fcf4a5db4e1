use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use blake3::Hasher as Blake3;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{WalletError, WalletResult};

const CONFIG_VERSION: u16 = 1;
const CONFIG_FILE: &str = "wallet.config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    pub auto_lock_minutes: u32,
    pub max_failed_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_lock_minutes: 15,
            max_failed_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Create-time minimum; unlock accepts any password so existing records
    /// remain openable.
    pub min_password_length: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_password_length: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletConfig {
    pub session: SessionConfig,
    pub policy: PolicyConfig,
    pub last_updated: DateTime<Utc>,
    pub version: u16,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            policy: PolicyConfig::default(),
            last_updated: Utc::now(),
            version: CONFIG_VERSION,
        }
    }
}

impl WalletConfig {
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigEnvelope {
    version: u16,
    checksum: [u8; 32],
    payload: WalletConfig,
}

/// Handles persistence of wallet configuration with integrity checks.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(profile_dir: impl AsRef<Path>) -> Self {
        Self {
            path: profile_dir.as_ref().join(CONFIG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_default(&self) -> WalletResult<WalletConfig> {
        if !self.path.exists() {
            let config = WalletConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let bytes = fs::read(&self.path)
            .map_err(|e| WalletError::StorageReadFailed(e.to_string()))?;
        let envelope: ConfigEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| WalletError::StorageReadFailed(format!("Malformed config: {}", e)))?;

        if envelope.version != CONFIG_VERSION {
            return Err(WalletError::ValidationError(format!(
                "Unsupported config version {}",
                envelope.version
            )));
        }

        if checksum(&envelope.payload)? != envelope.checksum {
            return Err(WalletError::ValidationError(
                "Config integrity verification failed".to_string(),
            ));
        }

        Ok(envelope.payload)
    }

    pub fn save(&self, config: &WalletConfig) -> WalletResult<()> {
        let mut payload = config.clone();
        payload.touch();

        let envelope = ConfigEnvelope {
            version: CONFIG_VERSION,
            checksum: checksum(&payload)?,
            payload,
        };

        let serialized = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;
        }
        let tmp_path = self.path.with_extension("new");
        {
            let mut file = File::create(&tmp_path)
                .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;
            file.write_all(&serialized)
                .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;
            file.sync_all()
                .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;
        }
        fs::rename(tmp_path, &self.path)
            .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn update<F>(&self, updater: F) -> WalletResult<WalletConfig>
    where
        F: FnOnce(&mut WalletConfig) -> WalletResult<()>,
    {
        let mut config = self.load_or_default()?;
        updater(&mut config)?;
        config.touch();
        self.save(&config)?;
        Ok(config)
    }
}

fn checksum(config: &WalletConfig) -> WalletResult<[u8; 32]> {
    let encoded = serde_json::to_vec(config)
        .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;
    let mut hasher = Blake3::new();
    hasher.update(&encoded);
    let mut output = [0u8; 32];
    output.copy_from_slice(hasher.finalize().as_bytes());
    Ok(output)
}
