//! Secret key and payload transform for encrypted characteristics.
//!
//! Danfoss Eco valves encrypt most characteristic values with XXTEA under a
//! per-device 128-bit key. Payload words are big-endian, key words are
//! little-endian. No padding is applied, so every encrypted characteristic
//! has a fixed length that is a multiple of four bytes.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const DELTA: u32 = 0x9e37_79b9;

/// Per-device 128-bit secret key.
///
/// The key can only be read from the valve while it is in pairing mode
/// (after pressing its button); afterwards it has to be supplied by the
/// caller for every session.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; SecretKey::LEN]);

impl SecretKey {
    /// Key length in bytes.
    pub const LEN: usize = 16;

    /// Create a key from raw bytes as read from the secret key characteristic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] for payloads of the wrong length, and for
    /// an all-zero payload, which the valve returns outside pairing mode.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let bytes: [u8; Self::LEN] = data.try_into().map_err(|_| {
            Error::InvalidData(format!(
                "secret key must be {} bytes, got {}",
                Self::LEN,
                data.len()
            ))
        })?;
        if bytes.iter().all(|&b| b == 0) {
            return Err(Error::InvalidData(
                "secret key is all zeros; is the valve in pairing mode?".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Lowercase hex form, as accepted by [`FromStr`].
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn words(&self) -> [u32; 4] {
        let mut words = [0u32; 4];
        for (word, chunk) in words.iter_mut().zip(self.0.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words
    }
}

impl FromStr for SecretKey {
    type Err = Error;

    /// Parse exactly 32 hex characters.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != Self::LEN * 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::invalid_config(
                "secret key must be exactly 32 hex characters",
            ));
        }
        let mut bytes = [0u8; Self::LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|e| Error::invalid_config(format!("secret key: {e}")))?;
        }
        Self::from_bytes(&bytes)
            .map_err(|_| Error::invalid_config("secret key must not be all zeros"))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Encrypt a plaintext characteristic value.
///
/// # Errors
///
/// Returns [`Error::InvalidData`] unless the payload is a multiple of four
/// bytes and at least eight bytes long.
pub fn encrypt(key: &SecretKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut words = to_words(plaintext)?;
    encrypt_words(&mut words, &key.words());
    Ok(from_words(&words))
}

/// Decrypt an encrypted characteristic value.
///
/// # Errors
///
/// Same length rules as [`encrypt`].
pub fn decrypt(key: &SecretKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut words = to_words(ciphertext)?;
    decrypt_words(&mut words, &key.words());
    Ok(from_words(&words))
}

fn to_words(data: &[u8]) -> Result<Vec<u32>> {
    if data.len() < 8 || data.len() % 4 != 0 {
        return Err(Error::InvalidData(format!(
            "encrypted payload must be a multiple of 4 bytes and at least 8, got {}",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn from_words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

#[inline]
fn mx(sum: u32, y: u32, z: u32, p: usize, e: usize, key: &[u32; 4]) -> u32 {
    (((z >> 5) ^ (y << 2)).wrapping_add((y >> 3) ^ (z << 4)))
        ^ ((sum ^ y).wrapping_add(key[(p & 3) ^ e] ^ z))
}

fn encrypt_words(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    let rounds = 6 + 52 / n;
    let mut sum = 0u32;
    let mut z = v[n - 1];
    for _ in 0..rounds {
        sum = sum.wrapping_add(DELTA);
        let e = ((sum >> 2) & 3) as usize;
        for p in 0..n {
            let y = v[(p + 1) % n];
            v[p] = v[p].wrapping_add(mx(sum, y, z, p, e, key));
            z = v[p];
        }
    }
}

fn decrypt_words(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    let rounds = 6 + 52 / n;
    let mut sum = DELTA.wrapping_mul(rounds as u32);
    let mut y = v[0];
    for _ in 0..rounds {
        let e = ((sum >> 2) & 3) as usize;
        for p in (0..n).rev() {
            let z = v[(p + n - 1) % n];
            v[p] = v[p].wrapping_sub(mx(sum, y, z, p, e, key));
            y = v[p];
        }
        sum = sum.wrapping_sub(DELTA);
    }
}
