//! Symmetric encryption at rest for provider API keys, replacing the
//! original server's Fernet-based `services/encryption.py` with an
//! AES-256-GCM scheme: a random 96-bit nonce per call, key derived from
//! `VIGIL_ENCRYPTION_KEY` via SHA-256 so operators can supply a passphrase
//! of any length.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

use crate::error::VigilError;

#[derive(Clone)]
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    pub fn new(encryption_key: &str) -> Self {
        let digest = Sha256::digest(encryption_key.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Encryptor {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypts `plaintext`, returning `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VigilError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VigilError::Decryption)?;
        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(payload))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, VigilError> {
        let payload = STANDARD.decode(encoded).map_err(|_| VigilError::Decryption)?;
        if payload.len() < 12 {
            return Err(VigilError::Decryption);
        }
        let (nonce_bytes, ciphertext) = payload.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VigilError::Decryption)?;
        String::from_utf8(plaintext).map_err(|_| VigilError::Decryption)
    }
}

/// `sk-abcd1234...wxyz` → `sk-abc****`-style masked preview: only the first
/// six characters survive, never the tail, and anything too short to mask
/// meaningfully collapses to a bare `"****"`.
pub fn mask_key(plain: &str) -> String {
    if plain.len() < 8 {
        return "****".to_string();
    }
    let head_len = (0..=6)
        .rev()
        .find(|&n| plain.is_char_boundary(n))
        .unwrap_or(0);
    format!("{}****", &plain[..head_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let enc = Encryptor::new("test-key");
        let ciphertext = enc.encrypt("sk-supersecret").unwrap();
        assert_eq!(enc.decrypt(&ciphertext).unwrap(), "sk-supersecret");
    }

    #[test]
    fn two_encryptions_differ() {
        let enc = Encryptor::new("test-key");
        let a = enc.encrypt("same-plaintext").unwrap();
        let b = enc.encrypt("same-plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let a = Encryptor::new("key-a");
        let b = Encryptor::new("key-b");
        let ciphertext = a.encrypt("secret").unwrap();
        assert!(b.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn mask_key_shows_only_a_prefix() {
        assert_eq!(mask_key("sk-abcdefghijkl"), "sk-abc****");
        assert_eq!(mask_key("short"), "****");
        assert_eq!(mask_key(""), "****");
    }
}
