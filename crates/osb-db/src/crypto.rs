//! Credential-at-rest encryption adapter.
//!
//! Out of scope for the core engine's own logic — this module exists
//! only so the Store has something concrete to decrypt at its read seam.
//! This is intentionally the only place in the codebase that links against
//! `aes-gcm`; no other crate touches the raw key material.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{bail, Context, Result};
use rand::RngCore;

pub const ENV_ENCRYPTION_KEY: &str = "POLLER_ENCRYPTION_KEY";

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    /// Reads `POLLER_ENCRYPTION_KEY` from the environment. Fatal at startup
    /// if unset or malformed: the Scheduler must
    /// not boot without a usable key.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(ENV_ENCRYPTION_KEY)
            .with_context(|| format!("missing required env var {ENV_ENCRYPTION_KEY}"))?;
        Self::from_base64_key(&key)
    }

    /// `key_b64` must decode to exactly 32 raw bytes (base64).
    pub fn from_base64_key(key_b64: &str) -> Result<Self> {
        use base64::Engine as _;
        let raw = base64::engine::general_purpose::STANDARD
            .decode(key_b64.trim())
            .context("POLLER_ENCRYPTION_KEY is not valid base64")?;
        if raw.len() != 32 {
            bail!(
                "POLLER_ENCRYPTION_KEY must decode to 32 bytes, got {}",
                raw.len()
            );
        }
        let key = Key::<Aes256Gcm>::from_slice(&raw);
        Ok(Encryptor {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt cleartext, returning a hex-encoded `nonce || ciphertext` blob
    /// suitable for a TEXT column.
    pub fn encrypt(&self, cleartext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, cleartext.as_bytes())
            .map_err(|e| anyhow::anyhow!("credential encryption failed: {e}"))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(hex::encode(blob))
    }

    /// Decrypt a hex-encoded `nonce || ciphertext` blob back to cleartext.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let blob = hex::decode(ciphertext).context("credential ciphertext is not valid hex")?;
        if blob.len() < NONCE_LEN {
            bail!("credential ciphertext shorter than a nonce");
        }
        let (nonce_bytes, body) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plain = self
            .cipher
            .decrypt(nonce, body)
            .map_err(|e| anyhow::anyhow!("credential decryption failed: {e}"))?;
        String::from_utf8(plain).context("decrypted credential is not valid utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_a() -> Encryptor {
        Encryptor::from_base64_key("MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTIzNDU2Nzg5MDE=").unwrap()
    }

    fn key_b() -> Encryptor {
        Encryptor::from_base64_key("YWJjZGVmZ2hpamtsbW5vcGFiY2RlZmdoaWprbG1ub3Bh").unwrap()
    }

    #[test]
    fn round_trips() {
        let enc = key_a();
        let cipher = enc.encrypt("sk-live-abc123").unwrap();
        assert_ne!(cipher, "sk-live-abc123");
        assert_eq!(enc.decrypt(&cipher).unwrap(), "sk-live-abc123");
    }

    #[test]
    fn nonces_differ_between_calls() {
        let enc = key_a();
        let a = enc.encrypt("same-secret").unwrap();
        let b = enc.encrypt("same-secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn different_keys_do_not_decrypt_each_other() {
        let a = key_a();
        let b = key_b();
        let cipher = a.encrypt("secret").unwrap();
        assert!(b.decrypt(&cipher).is_err());
    }

    #[test]
    fn rejects_key_of_wrong_length() {
        assert!(Encryptor::from_base64_key("dG9vc2hvcnQ=").is_err());
    }
}
