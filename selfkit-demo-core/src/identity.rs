//! Identity management for selfkit demos
//!
//! An identity is the ed25519 key behind one inbox. The inbox address is the
//! verifying key. Identities are persisted encrypted with the account storage
//! key (AES-256-GCM), so a run started with a different key cannot read them.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use ed25519_dalek::SigningKey;
use rand::RngCore;
use selfkit_lib::config::STORAGE_KEY_LEN;
use selfkit_lib::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const FORMAT_VERSION: u32 = 1;
const CURRENT_FILE: &str = "current";

/// A user's inbox key with metadata
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    /// Human-readable nickname
    pub nickname: Option<String>,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        Self::from_secret(&secret)
    }

    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
            nickname: None,
        }
    }

    /// Set a nickname for this identity
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Inbox address for this identity
    pub fn address(&self) -> Address {
        Address::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address())
            .field("nickname", &self.nickname)
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    version: u32,
    address: Address,
    nickname: Option<String>,
    nonce_hex: String,
    encrypted_key_hex: String,
}

/// Persists identities under one directory, encrypted with the storage key
pub struct IdentityManager {
    storage_dir: PathBuf,
    cipher: Aes256Gcm,
}

impl IdentityManager {
    pub fn new(storage_dir: impl AsRef<Path>, storage_key: &[u8; STORAGE_KEY_LEN]) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            cipher: Aes256Gcm::new(storage_key.into()),
        }
    }

    /// Save an identity to disk
    pub fn save(&self, identity: &Identity, name: &str) -> Result<()> {
        std::fs::create_dir_all(&self.storage_dir).context("Failed to create storage directory")?;

        let mut nonce_bytes = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let encrypted = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                identity.signing_key.to_bytes().as_ref(),
            )
            .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

        let stored = StoredIdentity {
            version: FORMAT_VERSION,
            address: identity.address(),
            nickname: identity.nickname.clone(),
            nonce_hex: hex::encode(nonce_bytes),
            encrypted_key_hex: hex::encode(encrypted),
        };

        let path = self.identity_path(name);
        let json = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write identity to {:?}", path))?;
        Ok(())
    }

    /// Load an identity from disk
    pub fn load(&self, name: &str) -> Result<Identity> {
        let path = self.identity_path(name);
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read identity from {:?}", path))?;
        let stored: StoredIdentity = serde_json::from_str(&json)?;

        if stored.version != FORMAT_VERSION {
            anyhow::bail!("Unsupported identity version: {}", stored.version);
        }

        let nonce_bytes = hex::decode(&stored.nonce_hex).context("Invalid nonce")?;
        if nonce_bytes.len() != 12 {
            anyhow::bail!("Invalid nonce length");
        }
        let encrypted = hex::decode(&stored.encrypted_key_hex).context("Invalid encrypted key")?;

        let decrypted = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), encrypted.as_ref())
            .map_err(|_| anyhow::anyhow!("Decryption failed - wrong storage key or corrupted data"))?;
        let secret: [u8; 32] = decrypted
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid decrypted key length"))?;

        let mut identity = Identity::from_secret(&secret);
        if identity.address() != stored.address {
            anyhow::bail!("Address mismatch - identity file may be corrupted");
        }
        identity.nickname = stored.nickname;
        Ok(identity)
    }

    /// List all saved identities
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.storage_dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.storage_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Mark `name` as the identity demos open by default
    pub fn set_current(&self, name: &str) -> Result<()> {
        std::fs::create_dir_all(&self.storage_dir).context("Failed to create storage directory")?;
        std::fs::write(self.storage_dir.join(CURRENT_FILE), name)
            .context("Failed to record current identity")?;
        Ok(())
    }

    pub fn current_name(&self) -> Option<String> {
        std::fs::read_to_string(self.storage_dir.join(CURRENT_FILE))
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }

    /// Load the current identity, creating and saving one if none exists yet.
    ///
    /// Returns the identity and whether it was newly created.
    pub fn load_or_create(&self, default_name: &str) -> Result<(Identity, bool)> {
        let name = self
            .current_name()
            .unwrap_or_else(|| default_name.to_string());
        if self.identity_path(&name).exists() {
            return Ok((self.load(&name)?, false));
        }

        let identity = Identity::generate().with_nickname(name.clone());
        self.save(&identity, &name)?;
        self.set_current(&name)?;
        Ok((identity, true))
    }

    fn identity_path(&self, name: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.json", name))
    }
}
