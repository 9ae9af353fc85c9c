//! Payload encryption with the pre-shared key.
//!
//! Change records are sealed with AES-256-GCM. The 12-byte nonce is
//! generated fresh per message and prepended to the ciphertext; the whole
//! blob is base64-encoded so the payload stays a single whitespace-free
//! token on the wire. The hub never holds the key.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes.
const NONCE_SIZE: usize = 12;

/// Crypto errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The configured key has the wrong length.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length.
        expected: usize,
        /// Provided length.
        actual: usize,
    },

    /// Encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// The ciphertext blob is not valid base64 or is too short to carry a
    /// nonce.
    #[error("malformed ciphertext")]
    MalformedCiphertext,

    /// Authentication failed: tampered ciphertext or wrong key.
    #[error("decryption failed: authentication error")]
    DecryptionFailed,
}

/// The 32-byte pre-shared key all edges in a sync group hold.
#[derive(Clone)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    /// Build a key from the settings-file string.
    pub fn from_str_key(key: &str) -> Result<Self, CryptoError> {
        Self::from_bytes(key.as_bytes())
    }

    /// Build a key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(bytes))
    }

    /// Encrypt plaintext into the wire payload form.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(&self.0).map_err(|_| CryptoError::EncryptionFailed)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a wire payload back into plaintext.
    ///
    /// Tampered input and wrong keys yield [`CryptoError::DecryptionFailed`];
    /// undecodable blobs yield [`CryptoError::MalformedCiphertext`].
    pub fn open(&self, payload: &str) -> Result<Vec<u8>, CryptoError> {
        let blob = BASE64
            .decode(payload)
            .map_err(|_| CryptoError::MalformedCiphertext)?;
        if blob.len() < NONCE_SIZE {
            return Err(CryptoError::MalformedCiphertext);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);

        let cipher = Aes256Gcm::new_from_slice(&self.0).map_err(|_| CryptoError::DecryptionFailed)?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretKey {
        SecretKey::from_str_key("0123456789abcdef0123456789abcdef").unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let plaintext = b"three field record goes here";
        let sealed = key().seal(plaintext).unwrap();
        assert_eq!(key().open(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn sealed_payload_is_single_token() {
        let sealed = key().seal(b"content with spaces\nand newlines").unwrap();
        assert!(!sealed.contains(' '));
        assert!(!sealed.contains('\n'));
    }

    #[test]
    fn fresh_nonce_per_seal() {
        let a = key().seal(b"same plaintext").unwrap();
        let b = key().seal(b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = key().seal(b"secret").unwrap();
        let other = SecretKey::from_str_key("ffffffffffffffffffffffffffffffff").unwrap();
        assert!(matches!(
            other.open(&sealed),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let sealed = key().seal(b"secret").unwrap();
        let mut blob = BASE64.decode(&sealed).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        let tampered = BASE64.encode(blob);
        assert!(matches!(
            key().open(&tampered),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn garbage_payload_is_malformed_not_auth_failure() {
        assert!(matches!(
            key().open("not!!base64"),
            Err(CryptoError::MalformedCiphertext)
        ));
        // Valid base64 but shorter than a nonce.
        assert!(matches!(
            key().open("c2hvcnQ="),
            Err(CryptoError::MalformedCiphertext)
        ));
    }

    #[test]
    fn key_length_is_validated() {
        let err = SecretKey::from_str_key("tooshort").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 8
            }
        ));
    }

    #[test]
    fn debug_never_prints_key_material() {
        let debug = format!("{:?}", key());
        assert!(!debug.contains("0123456789abcdef"));
    }
}
