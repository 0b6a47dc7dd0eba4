//! Per-block decryption of JPS data.
//!
//! Every encrypted block ends with a trailer read backwards from its end:
//!
//! ```text
//! ciphertext | ["JPST" salt(64)] | ["JPIV" iv(16)] | plaintext_len(u32 LE)
//! ```
//!
//! A salt record replaces the archive key with one derived from that salt.
//! An IV record replaces the default IV, which is the legacy key.

use super::cipher::Aes128;
use super::kdf::{legacy_key, Pbkdf2Params, KEY_SIZE, SALT_SIZE};
use super::CryptoError;

const SALT_SIGNATURE: &[u8; 4] = b"JPST";
const IV_SIGNATURE: &[u8; 4] = b"JPIV";
/// Salt record, then IV record and plaintext length.
const SALT_TRAILER: usize = 4 + SALT_SIZE + 4 + 20;
const SALT_RECORD: usize = 4 + SALT_SIZE;
/// Signature + IV + plaintext length.
const IV_TRAILER: usize = 4 + 16 + 4;
const IV_RECORD: usize = 4 + 16;
const LENGTH_SIZE: usize = 4;

/// Key material for one extraction pass over a JPS archive.
pub struct BlockDecryptor {
    password: String,
    legacy_key: [u8; KEY_SIZE],
    pbkdf2: Option<Pbkdf2Params>,
    /// Key derived from the static salt, if the archive has one.
    global_key: Option<[u8; KEY_SIZE]>,
    /// Last per-block salt and its key.
    salt_cache: Option<([u8; SALT_SIZE], [u8; KEY_SIZE])>,
}

impl std::fmt::Debug for BlockDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockDecryptor")
            .field("pbkdf2", &self.pbkdf2.as_ref().map(|p| p.iterations))
            .field("global_key", &self.global_key.is_some())
            .finish_non_exhaustive()
    }
}

impl BlockDecryptor {
    /// Prepare keys. `pbkdf2` is `Some` for format 2.0 archives.
    pub fn new(password: &str, pbkdf2: Option<Pbkdf2Params>) -> Result<Self, CryptoError> {
        let legacy_key = legacy_key(password)?;
        let global_key = pbkdf2
            .as_ref()
            .filter(|params| params.static_salt)
            .map(|params| params.derive(password, &params.salt));

        Ok(Self {
            password: password.to_string(),
            legacy_key,
            pbkdf2,
            global_key,
            salt_cache: None,
        })
    }

    fn key_for_salt(&mut self, salt: &[u8]) -> Result<[u8; KEY_SIZE], CryptoError> {
        if let Some((cached_salt, key)) = &self.salt_cache {
            if cached_salt[..] == *salt {
                return Ok(*key);
            }
        }
        let Some(params) = self.pbkdf2.as_ref() else {
            return Err(CryptoError::DecryptionFailed(
                "block carries a salt but the archive declares no PBKDF2 parameters".into(),
            ));
        };
        let key = params.derive(&self.password, salt);
        let mut cached = [0u8; SALT_SIZE];
        cached.copy_from_slice(salt);
        self.salt_cache = Some((cached, key));
        Ok(key)
    }

    /// Decrypt one block and return exactly its declared plaintext.
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let len = data.len();
        if len < LENGTH_SIZE {
            return Err(CryptoError::DecryptionFailed(format!(
                "block of {} bytes has no length trailer",
                len
            )));
        }

        let mut trim = LENGTH_SIZE;
        let mut key = match (&self.pbkdf2, self.global_key) {
            (None, _) => Some(self.legacy_key),
            (Some(_), global) => global,
        };
        let mut iv = self.legacy_key;

        if len > SALT_TRAILER && &data[len - SALT_TRAILER..len - SALT_TRAILER + 4] == SALT_SIGNATURE {
            trim += SALT_RECORD;
            let start = len - SALT_TRAILER + 4;
            key = Some(self.key_for_salt(&data[start..start + SALT_SIZE])?);
        }

        if len > IV_TRAILER && &data[len - IV_TRAILER..len - IV_TRAILER + 4] == IV_SIGNATURE {
            trim += IV_RECORD;
            let start = len - IV_TRAILER + 4;
            iv.copy_from_slice(&data[start..start + 16]);
        }

        let mut declared = [0u8; LENGTH_SIZE];
        declared.copy_from_slice(&data[len - LENGTH_SIZE..]);
        let declared = u32::from_le_bytes(declared) as usize;

        let Some(key) = key else {
            return Err(CryptoError::DecryptionFailed(
                "block has no salt and the archive has no static salt".into(),
            ));
        };

        let ciphertext = &data[..len - trim];
        let mut plaintext = Aes128::new(&key).cbc_decrypt(&iv, ciphertext)?;
        if plaintext.len() < declared {
            return Err(CryptoError::SizeMismatch {
                expected: declared,
                actual: plaintext.len(),
            });
        }
        plaintext.truncate(declared);
        Ok(plaintext)
    }
}

/// Build an encrypted block the way archivers write them.
///
/// A salt record is only recognised when an IV record follows it. Used by
/// tests and benchmarks to produce fixtures.
pub fn seal_block(
    key: &[u8; KEY_SIZE],
    iv: Option<&[u8; 16]>,
    salt: Option<&[u8; SALT_SIZE]>,
    plaintext: &[u8],
) -> Vec<u8> {
    let default_iv = *key;
    let cipher = Aes128::new(key);
    let mut out = cipher.cbc_encrypt(iv.unwrap_or(&default_iv), plaintext);
    if let Some(salt) = salt {
        out.extend_from_slice(SALT_SIGNATURE);
        out.extend_from_slice(salt);
    }
    if let Some(iv) = iv {
        out.extend_from_slice(IV_SIGNATURE);
        out.extend_from_slice(iv);
    }
    out.extend_from_slice(&(plaintext.len() as u32).to_le_bytes());
    out
}
