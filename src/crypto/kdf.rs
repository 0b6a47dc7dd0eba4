//! Key derivation for JPS archives.
//!
//! Two schemes exist. Archives up to format 1.10 use the legacy key: the
//! zero-padded password encrypted with itself. Format 2.0 uses
//! PBKDF2-HMAC-SHA1 with either one archive-wide salt or a salt per block.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;

use super::cipher::Aes128;
use super::CryptoError;

pub const KEY_SIZE: usize = 16;
pub const SALT_SIZE: usize = 64;

/// Legacy self-encrypted key.
///
/// Takes the first 16 bytes of the UTF-8 password, pads with zeros and
/// encrypts that block with itself as the key. Weak, but older archives
/// depend on it byte for byte.
pub fn legacy_key(password: &str) -> Result<[u8; KEY_SIZE], CryptoError> {
    if password.is_empty() {
        return Err(CryptoError::EmptyPassword);
    }
    let mut key = [0u8; KEY_SIZE];
    let bytes = password.as_bytes();
    let len = bytes.len().min(KEY_SIZE);
    key[..len].copy_from_slice(&bytes[..len]);

    let cipher = Aes128::new(&key);
    cipher.encrypt_block(&mut key);
    Ok(key)
}

/// PBKDF2 algorithms a JPS archive may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pbkdf2Algorithm {
    Sha1,
}

impl Pbkdf2Algorithm {
    pub fn from_id(id: u8) -> Result<Self, CryptoError> {
        match id {
            0 => Ok(Self::Sha1),
            other => Err(CryptoError::UnsupportedAlgorithm(other)),
        }
    }
}

/// PBKDF2 parameters from the JPS 2.0 extra header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pbkdf2Params {
    pub algorithm: Pbkdf2Algorithm,
    pub iterations: u32,
    /// `true` when `salt` is used for every block.
    pub static_salt: bool,
    pub salt: [u8; SALT_SIZE],
}

impl Pbkdf2Params {
    pub fn derive(&self, password: &str, salt: &[u8]) -> [u8; KEY_SIZE] {
        match self.algorithm {
            Pbkdf2Algorithm::Sha1 => pbkdf2_sha1(password, salt, self.iterations),
        }
    }
}

pub fn pbkdf2_sha1(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, iterations, &mut key);
    key
}
