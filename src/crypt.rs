//! AES and bcrypt wrappers
//!
//! AES messages are AES-256-CBC with PKCS#7 padding, keyed by the SHA-256 of
//! the password, with a random IV prepended to the ciphertext and the whole
//! thing base64 encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use openssl::rand::rand_bytes;
use openssl::symm::{decrypt, encrypt, Cipher};
use sha2::{Digest, Sha256};

use crate::common::{Result, UtilError};

/// Password used by the `*_default` helpers
pub const DEFAULT_PASSWORD: &str = "Who1sy0urDaddy?!";

/// Cost used when none is given
pub const DEFAULT_BCRYPT_ROUNDS: u32 = 12;

const BLOCK_SIZE: usize = 16;

fn derive_key(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

/// Encrypt `message` with a key derived from `password`
pub fn aes_encrypt(message: &str, password: &str) -> Result<String> {
    let key = derive_key(password);
    let mut iv = [0u8; BLOCK_SIZE];
    rand_bytes(&mut iv)?;

    let ciphertext = encrypt(Cipher::aes_256_cbc(), &key, Some(&iv), message.as_bytes())?;
    let mut envelope = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(envelope))
}

/// Decrypt a message produced by [`aes_encrypt`]
pub fn aes_decrypt(encrypted: &str, password: &str) -> Result<String> {
    let envelope = STANDARD
        .decode(encrypted.trim())
        .map_err(|e| UtilError::Crypto(format!("invalid base64: {}", e)))?;
    if envelope.len() < BLOCK_SIZE * 2 {
        return Err(UtilError::Crypto("message too short".to_string()));
    }

    let (iv, ciphertext) = envelope.split_at(BLOCK_SIZE);
    let key = derive_key(password);
    let plain = decrypt(Cipher::aes_256_cbc(), &key, Some(iv), ciphertext).map_err(|e| {
        debug!("AES decrypt failed: {}", e);
        UtilError::Crypto("wrong password or corrupted message".to_string())
    })?;
    String::from_utf8(plain).map_err(|_| UtilError::Crypto("plaintext is not UTF-8".to_string()))
}

pub fn aes_encrypt_default(message: &str) -> Result<String> {
    aes_encrypt(message, DEFAULT_PASSWORD)
}

pub fn aes_decrypt_default(encrypted: &str) -> Result<String> {
    aes_decrypt(encrypted, DEFAULT_PASSWORD)
}

/// Bcrypt hash prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BcryptVariant {
    /// `$2a$`
    TwoA,
    /// `$2b$`
    #[default]
    TwoB,
    /// `$2x$`
    TwoX,
    /// `$2y$`
    TwoY,
}

impl From<BcryptVariant> for bcrypt::Version {
    fn from(variant: BcryptVariant) -> Self {
        match variant {
            BcryptVariant::TwoA => bcrypt::Version::TwoA,
            BcryptVariant::TwoB => bcrypt::Version::TwoB,
            BcryptVariant::TwoX => bcrypt::Version::TwoX,
            BcryptVariant::TwoY => bcrypt::Version::TwoY,
        }
    }
}

/// Hash `message` with a fresh salt
pub fn bcrypt_hash(message: &str, rounds: u32, variant: BcryptVariant) -> Result<String> {
    let parts = bcrypt::hash_with_result(message, rounds)?;
    Ok(parts.format_for_version(variant.into()))
}

/// Whether `message` matches `hashed`; malformed hashes never match
pub fn bcrypt_check(message: &str, hashed: &str) -> bool {
    bcrypt::verify(message, hashed).unwrap_or_else(|e| {
        debug!("bcrypt verify failed: {}", e);
        false
    })
}
