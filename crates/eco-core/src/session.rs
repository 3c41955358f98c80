//! Per-connection key state.

use tracing::{debug, info};

use crate::cipher::{self, SecretKey};
use crate::error::{Error, Result};

/// Key material for one BLE session.
///
/// The key is installed after connecting and cleared when the link drops,
/// so a stale key is never reused for a new session.
#[derive(Debug, Default, Clone)]
pub struct Session {
    key: Option<SecretKey>,
}

impl Session {
    /// A session with no key installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A session with `key` already installed.
    pub fn with_key(key: SecretKey) -> Self {
        Self { key: Some(key) }
    }

    /// Install (or replace) the session key.
    pub fn install(&mut self, key: SecretKey) {
        if self.key.replace(key).is_some() {
            info!("Replaced session secret key");
        } else {
            info!("Installed session secret key");
        }
    }

    /// Discard the session key.
    pub fn clear(&mut self) {
        if self.key.take().is_some() {
            debug!("Cleared session secret key");
        }
    }

    /// Whether a key is installed.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// The installed key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingKey`] if no key is installed.
    pub fn key(&self) -> Result<&SecretKey> {
        self.key.as_ref().ok_or(Error::MissingKey)
    }

    /// Encrypt with the installed key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        cipher::encrypt(self.key()?, plaintext)
    }

    /// Decrypt with the installed key.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        cipher::decrypt(self.key()?, ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_without_key() {
        let session = Session::new();
        assert!(!session.has_key());
        assert!(matches!(session.encrypt(&[0; 8]), Err(Error::MissingKey)));
        assert!(matches!(session.decrypt(&[0; 8]), Err(Error::MissingKey)));
    }

    #[test]
    fn test_install_and_clear() {
        let mut session = Session::new();
        session.install(SecretKey::from_bytes(&[7; 16]).unwrap());
        assert!(session.has_key());

        let ciphertext = session.encrypt(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(
            session.decrypt(&ciphertext).unwrap(),
            [1, 2, 3, 4, 5, 6, 7, 8]
        );

        session.clear();
        assert!(!session.has_key());
        assert!(matches!(session.key(), Err(Error::MissingKey)));
    }
}
