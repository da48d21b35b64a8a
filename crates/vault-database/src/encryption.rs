//! ChaCha20-Poly1305 encryption for individual values.
//!
//! Encrypted values are stored as text: `base64(nonce):base64(ciphertext)`.

use crate::{DatabaseError, DatabaseKey, DatabaseResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Generate a random nonce for encryption.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

fn cipher(key: &DatabaseKey) -> DatabaseResult<ChaCha20Poly1305> {
    ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| DatabaseError::Encryption(e.to_string()))
}

/// Encrypt bytes with a caller-provided nonce. Returns ciphertext with the tag appended.
pub fn encrypt_content(
    key: &DatabaseKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> DatabaseResult<Vec<u8>> {
    cipher(key)?
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| DatabaseError::Encryption(e.to_string()))
}

/// Decrypt bytes produced by [`encrypt_content`].
pub fn decrypt_content(
    key: &DatabaseKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> DatabaseResult<Vec<u8>> {
    cipher(key)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| DatabaseError::Encryption("decryption failed".to_string()))
}

/// Encrypt a string under a fresh nonce into the `nonce:ciphertext` text form.
pub fn encrypt_value(key: &DatabaseKey, plaintext: &str) -> DatabaseResult<String> {
    let nonce = generate_nonce();
    let ciphertext = encrypt_content(key, &nonce, plaintext.as_bytes())?;
    Ok(format!("{}:{}", BASE64.encode(nonce), BASE64.encode(ciphertext)))
}

/// Inverse of [`encrypt_value`].
pub fn decrypt_value(key: &DatabaseKey, stored: &str) -> DatabaseResult<String> {
    let (nonce_b64, ciphertext_b64) = stored
        .split_once(':')
        .ok_or_else(|| DatabaseError::Encryption("malformed encrypted value".to_string()))?;

    let nonce: [u8; NONCE_SIZE] = BASE64
        .decode(nonce_b64)
        .map_err(|e| DatabaseError::Encryption(format!("invalid nonce encoding: {e}")))?
        .try_into()
        .map_err(|_| DatabaseError::Encryption("invalid nonce size".to_string()))?;
    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| DatabaseError::Encryption(format!("invalid ciphertext encoding: {e}")))?;

    let plaintext = decrypt_content(key, &nonce, &ciphertext)?;
    String::from_utf8(plaintext)
        .map_err(|_| DatabaseError::Encryption("decrypted value is not UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> DatabaseKey {
        DatabaseKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let nonce = generate_nonce();
        let plaintext = b"Hello, World! This is a test message.";

        let ciphertext = encrypt_content(&key(1), &nonce, plaintext).unwrap();
        assert_ne!(ciphertext, plaintext);

        let decrypted = decrypt_content(&key(1), &nonce, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let nonce = generate_nonce();
        let ciphertext = encrypt_content(&key(1), &nonce, b"Secret message").unwrap();
        assert!(decrypt_content(&key(2), &nonce, &ciphertext).is_err());
    }

    #[test]
    fn test_value_format_and_fresh_nonce() {
        let a = encrypt_value(&key(3), "\"hunter2\"").unwrap();
        let b = encrypt_value(&key(3), "\"hunter2\"").unwrap();

        assert_ne!(a, b);
        assert_eq!(a.matches(':').count(), 1);
        assert!(!a.contains("hunter2"));
        assert_eq!(decrypt_value(&key(3), &a).unwrap(), "\"hunter2\"");
    }

    #[test]
    fn test_decrypt_value_rejects_malformed() {
        assert!(decrypt_value(&key(3), "no-separator").is_err());
        assert!(decrypt_value(&key(3), "AAAA:AAAA").is_err());

        let tampered = encrypt_value(&key(3), "{}").unwrap().replacen(':', ":A", 1);
        assert!(decrypt_value(&key(3), &tampered).is_err());
    }
}
