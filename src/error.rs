//! Error types for archive reading, decryption and extraction.
//!
//! This module provides the [`ArchiveError`] type which covers every fault that
//! can end an extraction pass. None of them are retried: the engine turns them
//! into an `Error` progress snapshot and stops.
//!
//! ## Error Categories
//!
//! | Category | Errors | Description |
//! |----------|--------|-------------|
//! | Multipart I/O | [`PartFileMissing`], [`PartOutOfRange`] | Part files vanished or the cursor ran past the set |
//! | Format | [`InvalidArchiveSignature`], [`InvalidHeader`], [`InvalidEntityType`], [`UnsupportedCompressionMethod`], [`UnsupportedExtension`] | Archive is malformed or unrecognised |
//! | Encryption | [`DecryptionFailure`], [`DecryptionSizeMismatch`], [`EmptyPassword`], [`UnsupportedPbkdf2Algorithm`] | JPS-only crypto faults |
//! | ZIP | [`EocdNotFound`] | No End Of Central Directory record |
//! | Version | [`UnsupportedFormatVersion`] | JPS version gate |
//! | Payload | [`Decompression`], [`ChecksumMismatch`] | Corrupt entity data |
//! | I/O | [`Io`], [`Sink`], [`BufferTooSmall`] | Read/write errors |
//!
//! ## Example
//!
//! ```rust,ignore
//! use jpa_stream::{ArchiveError, ExtractionStatus};
//!
//! let progress = unarchiver.test(&mut observer, &token);
//! if progress.status == ExtractionStatus::Error {
//!     match progress.last_error.as_deref() {
//!         Some(ArchiveError::EmptyPassword) => eprintln!("Archive needs a password"),
//!         Some(e) => eprintln!("Error: {}", e),
//!         None => {}
//!     }
//! }
//! ```
//!
//! [`PartFileMissing`]: ArchiveError::PartFileMissing
//! [`PartOutOfRange`]: ArchiveError::PartOutOfRange
//! [`InvalidArchiveSignature`]: ArchiveError::InvalidArchiveSignature
//! [`InvalidHeader`]: ArchiveError::InvalidHeader
//! [`InvalidEntityType`]: ArchiveError::InvalidEntityType
//! [`UnsupportedCompressionMethod`]: ArchiveError::UnsupportedCompressionMethod
//! [`UnsupportedExtension`]: ArchiveError::UnsupportedExtension
//! [`DecryptionFailure`]: ArchiveError::DecryptionFailure
//! [`DecryptionSizeMismatch`]: ArchiveError::DecryptionSizeMismatch
//! [`EmptyPassword`]: ArchiveError::EmptyPassword
//! [`UnsupportedPbkdf2Algorithm`]: ArchiveError::UnsupportedPbkdf2Algorithm
//! [`EocdNotFound`]: ArchiveError::EocdNotFound
//! [`UnsupportedFormatVersion`]: ArchiveError::UnsupportedFormatVersion
//! [`Decompression`]: ArchiveError::Decompression
//! [`ChecksumMismatch`]: ArchiveError::ChecksumMismatch
//! [`Io`]: ArchiveError::Io
//! [`Sink`]: ArchiveError::Sink
//! [`BufferTooSmall`]: ArchiveError::BufferTooSmall

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::crypto::CryptoError;

/// Error type for archive operations.
#[derive(Debug)]
pub enum ArchiveError {
    /// A part file found during discovery could not be opened.
    PartFileMissing {
        /// 1-based part number.
        part: usize,
        /// Path that was probed.
        path: PathBuf,
    },

    /// A read, skip or open addressed a part outside `1..=parts`.
    PartOutOfRange {
        /// Requested 1-based part number.
        part: usize,
        /// Number of parts in the set.
        parts: usize,
    },

    /// The archive does not start with the signature its extension promises.
    InvalidArchiveSignature {
        /// Signature the format requires.
        expected: &'static [u8],
        /// Bytes actually found.
        found: Vec<u8>,
    },

    /// A header or entity block is malformed.
    ///
    /// The `String` says which record and why.
    InvalidHeader(String),

    /// The entity kind byte is not directory, file or symlink.
    InvalidEntityType(u8),

    /// The compression method code is not stored, deflate or bzip2.
    UnsupportedCompressionMethod(u16),

    /// The file extension does not name a supported archive format.
    UnsupportedExtension(String),

    /// AES-CBC decryption could not be performed on a block.
    DecryptionFailure(String),

    /// A decrypted block does not have the declared plaintext length.
    DecryptionSizeMismatch {
        /// Declared length.
        expected: usize,
        /// Length actually available.
        actual: usize,
    },

    /// An encrypted archive was opened without a password.
    EmptyPassword,

    /// The PBKDF2 extra header names an algorithm other than SHA-1.
    UnsupportedPbkdf2Algorithm(u8),

    /// No End Of Central Directory record was found in a ZIP archive.
    EocdNotFound,

    /// The JPS version pair is not one of 1.9, 1.10 or 2.0.
    UnsupportedFormatVersion {
        /// Major version byte.
        major: u8,
        /// Minor version byte.
        minor: u8,
    },

    /// Fewer bytes were available than a fixed-size record needs.
    ///
    /// Only happens at the true end of the archive set.
    BufferTooSmall {
        /// Number of bytes needed.
        needed: usize,
        /// Number of bytes available.
        have: usize,
    },

    /// The deflate or bzip2 stream of an entity is corrupt.
    Decompression(String),

    /// A ZIP payload does not match its declared CRC-32.
    ChecksumMismatch {
        /// Stored path of the entity.
        path: String,
        /// Declared checksum.
        expected: u32,
        /// Checksum of the decoded bytes.
        actual: u32,
    },

    /// The data sink rejected an operation (disk full, permission denied, ...).
    Sink(io::Error),

    /// An I/O error occurred while reading the archive.
    Io(io::Error),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartFileMissing { part, path } => {
                write!(f, "Part {} is missing: {}", part, path.display())
            }
            Self::PartOutOfRange { part, parts } => {
                write!(f, "Part {} out of range (archive has {} parts)", part, parts)
            }
            Self::InvalidArchiveSignature { expected, found } => write!(
                f,
                "Invalid archive signature: expected {:?}, found {:?}",
                String::from_utf8_lossy(expected),
                String::from_utf8_lossy(found)
            ),
            Self::InvalidHeader(msg) => write!(f, "Invalid or malformed header: {}", msg),
            Self::InvalidEntityType(t) => write!(f, "Invalid entity type: {}", t),
            Self::UnsupportedCompressionMethod(m) => {
                write!(f, "Unsupported compression method: {}", m)
            }
            Self::UnsupportedExtension(ext) => {
                write!(f, "Unsupported archive extension: {:?}", ext)
            }
            Self::DecryptionFailure(msg) => write!(f, "Decryption failed: {}", msg),
            Self::DecryptionSizeMismatch { expected, actual } => write!(
                f,
                "Decrypted size mismatch: expected {} bytes, got {}",
                expected, actual
            ),
            Self::EmptyPassword => write!(f, "Password required for encrypted archive"),
            Self::UnsupportedPbkdf2Algorithm(a) => {
                write!(f, "Unsupported PBKDF2 algorithm: {}", a)
            }
            Self::EocdNotFound => write!(f, "End of Central Directory record not found"),
            Self::UnsupportedFormatVersion { major, minor } => {
                write!(f, "Unsupported format version {}.{}", major, minor)
            }
            Self::BufferTooSmall { needed, have } => {
                write!(f, "Buffer too small: need {} bytes, have {}", needed, have)
            }
            Self::Decompression(msg) => write!(f, "Decompression failed: {}", msg),
            Self::ChecksumMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "CRC mismatch for {}: expected {:08x}, got {:08x}",
                path, expected, actual
            ),
            Self::Sink(e) => write!(f, "Sink error: {}", e),
            Self::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::Sink(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ArchiveError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<CryptoError> for ArchiveError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::EmptyPassword => Self::EmptyPassword,
            CryptoError::SizeMismatch { expected, actual } => {
                Self::DecryptionSizeMismatch { expected, actual }
            }
            CryptoError::UnsupportedAlgorithm(a) => Self::UnsupportedPbkdf2Algorithm(a),
            CryptoError::DecryptionFailed(msg) => Self::DecryptionFailure(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
