//! Cryptographic support for encrypted JPS archives.
//!
//! JPS data is AES-128-CBC with zero padding. Keys come either from the
//! legacy self-encrypted password ([`legacy_key`]) or from PBKDF2-HMAC-SHA1
//! ([`Pbkdf2Params`]). The block cipher itself is implemented in [`cipher`].

pub mod block;
pub mod cipher;
pub mod kdf;

pub use block::{seal_block, BlockDecryptor};
pub use cipher::Aes128;
pub use kdf::{legacy_key, pbkdf2_sha1, Pbkdf2Algorithm, Pbkdf2Params};

/// Error type for cryptographic operations.
#[derive(Debug, Clone)]
pub enum CryptoError {
    /// No password was supplied
    EmptyPassword,
    /// Decrypted block is shorter than its declared length
    SizeMismatch { expected: usize, actual: usize },
    /// PBKDF2 algorithm id other than SHA-1
    UnsupportedAlgorithm(u8),
    /// Decryption failed
    DecryptionFailed(String),
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::EmptyPassword => write!(f, "Empty password"),
            CryptoError::SizeMismatch { expected, actual } => {
                write!(f, "Decrypted size mismatch: expected {}, got {}", expected, actual)
            }
            CryptoError::UnsupportedAlgorithm(a) => write!(f, "Unsupported PBKDF2 algorithm: {}", a),
            CryptoError::DecryptionFailed(msg) => write!(f, "Decryption failed: {}", msg),
        }
    }
}

impl std::error::Error for CryptoError {}
