//! Secret vault for wallet signing material
//!
//! Wallet secrets are persisted only as ciphertext; plaintext key material
//! exists in memory for the span of one operation and never leaves this
//! module except as transient signing input.
//!
//! Several ciphertext generations are in circulation, so `decrypt` tries
//! formats in strict priority order: tagged ciphertext, plaintext-key
//! passthrough, legacy untagged ciphertext, plain base64.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};

/// Format tag prefixed to ciphertext produced by this vault
pub const CIPHERTEXT_TAG: &str = "v1:";

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// Environment variable holding the process-wide master secret
pub const MASTER_KEY_ENV: &str = "WALLET_MASTER_KEY";

/// Encrypts and decrypts wallet signing material
pub struct SecretVault {
    cipher: Aes256Gcm,
}

impl SecretVault {
    /// Create a vault from an explicit master secret.
    ///
    /// The AES-256 key is derived once per process as SHA-256 of the
    /// master secret.
    pub fn new(master_secret: &str) -> Result<Self> {
        if master_secret.trim().is_empty() {
            return Err(Error::Config("master secret must not be empty".to_string()));
        }

        let digest = Sha256::digest(master_secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);

        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Create a vault from the process environment.
    ///
    /// A missing master secret is a fatal configuration error; the engine
    /// must not start without one.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let secret = std::env::var(MASTER_KEY_ENV)
            .map_err(|_| Error::MissingEnvVar(MASTER_KEY_ENV.to_string()))?;
        Self::new(&secret)
    }

    /// Encrypt plaintext key material into tagged ciphertext.
    ///
    /// Uses a fresh random nonce per call; output is `v1:` +
    /// base64(nonce || ciphertext).
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| Error::Encryption("AES-GCM encryption failed".to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", CIPHERTEXT_TAG, BASE64.encode(payload)))
    }

    /// Decrypt stored wallet material into plaintext key material.
    ///
    /// Tries, in order: explicitly tagged ciphertext, valid plaintext key
    /// passthrough, legacy untagged ciphertext, plain base64. Fails with a
    /// `Decryption` error only after every format is exhausted.
    pub fn decrypt(&self, raw: &str) -> Result<String> {
        let raw = raw.trim();

        // 1. Explicitly tagged ciphertext
        if let Some(encoded) = raw.strip_prefix(CIPHERTEXT_TAG) {
            if let Ok(plaintext) = self.decrypt_payload(encoded) {
                return Ok(plaintext);
            }
        }

        // 2. Already-plaintext key shapes pass through unchanged
        if looks_like_key_material(raw) {
            return Ok(raw.to_string());
        }

        // 3. Legacy untagged ciphertext (nonce || ciphertext, base64)
        if let Ok(plaintext) = self.decrypt_payload(raw) {
            return Ok(plaintext);
        }

        // 4. Plain base64 of key material
        if let Ok(decoded) = BASE64.decode(raw) {
            if let Ok(text) = String::from_utf8(decoded) {
                if looks_like_key_material(text.trim()) {
                    return Ok(text.trim().to_string());
                }
            }
        }

        warn!(
            audit = true,
            "wallet secret decryption failed: no supported format matched"
        );
        Err(Error::Decryption(
            "no supported ciphertext or key format matched".to_string(),
        ))
    }

    fn decrypt_payload(&self, encoded: &str) -> Result<String> {
        let payload = BASE64
            .decode(encoded)
            .map_err(|e| Error::Decryption(format!("invalid base64: {}", e)))?;

        if payload.len() <= NONCE_LEN {
            return Err(Error::Decryption("payload too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::Decryption("AES-GCM authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Decryption("plaintext is not valid UTF-8".to_string()))
    }
}

/// Detect raw key material shapes: a base58-encoded 64-byte (or 32-byte)
/// secret, or a JSON array of 64 bytes as written by solana-keygen.
pub fn looks_like_key_material(value: &str) -> bool {
    if value.starts_with('[') {
        if let Ok(bytes) = serde_json::from_str::<Vec<u8>>(value) {
            return bytes.len() == 64 || bytes.len() == 32;
        }
        return false;
    }

    if let Ok(decoded) = bs58::decode(value).into_vec() {
        return decoded.len() == 64 || decoded.len() == 32;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> SecretVault {
        SecretVault::new("test-master-secret").unwrap()
    }

    fn sample_base58_key() -> String {
        bs58::encode([7u8; 64]).into_string()
    }

    #[test]
    fn test_empty_master_secret_rejected() {
        assert!(SecretVault::new("  ").is_err());
    }

    #[test]
    fn test_roundtrip_tagged() {
        let vault = test_vault();
        let key = sample_base58_key();

        let ciphertext = vault.encrypt(&key).unwrap();
        assert!(ciphertext.starts_with(CIPHERTEXT_TAG));
        assert_eq!(vault.decrypt(&ciphertext).unwrap(), key);
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let vault = test_vault();
        let key = sample_base58_key();
        assert_ne!(vault.encrypt(&key).unwrap(), vault.encrypt(&key).unwrap());
    }

    #[test]
    fn test_base58_passthrough() {
        let vault = test_vault();
        let key = sample_base58_key();
        assert_eq!(vault.decrypt(&key).unwrap(), key);
    }

    #[test]
    fn test_json_array_passthrough() {
        let vault = test_vault();
        let key = serde_json::to_string(&vec![9u8; 64]).unwrap();
        assert_eq!(vault.decrypt(&key).unwrap(), key);
    }

    #[test]
    fn test_legacy_untagged_ciphertext() {
        let vault = test_vault();
        let key = sample_base58_key();

        let tagged = vault.encrypt(&key).unwrap();
        let untagged = tagged.strip_prefix(CIPHERTEXT_TAG).unwrap();
        assert_eq!(vault.decrypt(untagged).unwrap(), key);
    }

    #[test]
    fn test_plain_base64_fallback() {
        let vault = test_vault();
        let key = sample_base58_key();

        let encoded = BASE64.encode(key.as_bytes());
        assert_eq!(vault.decrypt(&encoded).unwrap(), key);
    }

    #[test]
    fn test_garbage_exhausts_all_formats() {
        let vault = test_vault();
        let result = vault.decrypt("definitely-not-a-wallet-secret!!");
        assert!(matches!(result, Err(Error::Decryption(_))));
    }

    #[test]
    fn test_wrong_master_secret_fails_auth() {
        let vault = test_vault();
        let other = SecretVault::new("different-master-secret").unwrap();

        // The ciphertext must not decrypt under another key, and the
        // tagged payload is not valid under any fallback format either.
        let ciphertext = vault.encrypt(&sample_base58_key()).unwrap();
        assert!(other.decrypt(&ciphertext).is_err());
    }
}
