//! Connection secrets at rest: AES-256-GCM, one random nonce per value.
//!
//! Stored form is `enc:v1:` followed by base64 of `nonce || ciphertext`.

use std::collections::BTreeMap;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::DatabaseConfig;
use crate::error::{GatewayError, Result};

const PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// The passphrase is hashed with SHA-256 into the 256-bit key.
    pub fn from_passphrase(passphrase: &str) -> Result<Self> {
        if passphrase.trim().is_empty() {
            return Err(GatewayError::Config("settings encryption key is empty".into()));
        }
        let digest = Sha256::digest(passphrase.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Random per-process key. Anything sealed with it is unreadable after a restart.
    pub fn ephemeral() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Postgres requires a configured key; the process-local store may run on an ephemeral one.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        if !config.secrets_key.trim().is_empty() {
            return Self::from_passphrase(&config.secrets_key);
        }
        if !config.url.is_empty() {
            return Err(GatewayError::Config(
                "SETTINGS_ENCRYPTION_KEY is required when DATABASE_URL is set".into(),
            ));
        }
        warn!("SETTINGS_ENCRYPTION_KEY not set, using a per-process key");
        Ok(Self::ephemeral())
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| GatewayError::Crypto("failed to encrypt secret".into()))?;
        let mut raw = nonce.to_vec();
        raw.extend_from_slice(&sealed);
        Ok(format!("{PREFIX}{}", STANDARD.encode(raw)))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let encoded = stored
            .strip_prefix(PREFIX)
            .ok_or_else(|| GatewayError::Crypto("stored secret is not encrypted".into()))?;
        let raw = STANDARD
            .decode(encoded)
            .map_err(|e| GatewayError::Crypto(format!("malformed secret: {e}")))?;
        if raw.len() <= NONCE_LEN {
            return Err(GatewayError::Crypto("malformed secret: too short".into()));
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| {
                GatewayError::Crypto("secret could not be decrypted with the configured key".into())
            })?;
        String::from_utf8(plain).map_err(|e| GatewayError::Crypto(format!("malformed secret: {e}")))
    }

    /// Empty values are dropped rather than sealed.
    pub fn encrypt_map(&self, secrets: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
        secrets
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| Ok((k.clone(), self.encrypt(v)?)))
            .collect()
    }

    pub fn decrypt_map(&self, sealed: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
        sealed
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.decrypt(v)?)))
            .collect()
    }
}
