use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use thiserror::Error;

/// Base64 of the key bundled with development builds. Production start-up
/// refuses to run with it.
pub const DEV_DEFAULT_KEY: &str = "cmFpbG9wcy1kZXYtb25seS1rZXktMDEyMzQ1Njc4OWE=";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("encryption key environment variable {0} is not set")]
    MissingKey(String),

    #[error("encryption key must be base64 of {KEY_LEN} bytes")]
    MalformedKey,

    #[error("refusing to start with the bundled development key")]
    DefaultKeyInProduction,

    #[error("stored ciphertext is corrupt or was sealed under a different key")]
    Corrupt,
}

/// Holder of the single process-wide symmetric key.
///
/// Ciphertext layout is `base64(nonce ‖ aead_ciphertext)` with a fresh
/// random 96-bit nonce per seal. There is no key rotation; changing the key
/// invalidates everything sealed under the old one.
#[derive(Clone)]
pub struct Vault {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").finish_non_exhaustive()
    }
}

impl Vault {
    pub fn new(key_bytes: &[u8; KEY_LEN]) -> Self {
        Vault {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key_bytes)),
        }
    }

    /// Load the key from `var`. With `strict` (production posture) the
    /// variable must be present and must not equal the bundled default.
    pub fn from_env(var: &str, strict: bool) -> Result<Self, VaultError> {
        let encoded = match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => value,
            _ if strict => return Err(VaultError::MissingKey(var.to_string())),
            _ => DEV_DEFAULT_KEY.to_string(),
        };
        if strict && encoded.trim() == DEV_DEFAULT_KEY {
            return Err(VaultError::DefaultKeyInProduction);
        }
        Self::from_base64(encoded.trim())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let raw = BASE64.decode(encoded).map_err(|_| VaultError::MalformedKey)?;
        let key: [u8; KEY_LEN] = raw.try_into().map_err(|_| VaultError::MalformedKey)?;
        Ok(Vault::new(&key))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("ChaCha20Poly1305 encryption is infallible for in-memory buffers");
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        BASE64.encode(sealed)
    }

    pub fn decrypt(&self, sealed: &str) -> Result<Vec<u8>, VaultError> {
        let raw = BASE64.decode(sealed.trim()).map_err(|_| VaultError::Corrupt)?;
        if raw.len() <= NONCE_LEN {
            return Err(VaultError::Corrupt);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| VaultError::Corrupt)
    }

    pub fn decrypt_string(&self, sealed: &str) -> Result<String, VaultError> {
        let bytes = self.decrypt(sealed)?;
        String::from_utf8(bytes).map_err(|_| VaultError::Corrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn test_vault() -> Vault {
        Vault::new(&[7u8; 32])
    }

    #[test]
    fn round_trips_plaintext() {
        let vault = test_vault();
        let sealed = vault.encrypt(b"refresh-token-material");
        assert_eq!(vault.decrypt(&sealed).unwrap(), b"refresh-token-material");
    }

    #[test]
    fn nonces_differ_between_seals() {
        let vault = test_vault();
        assert_ne!(vault.encrypt(b"x"), vault.encrypt(b"x"));
    }

    #[test]
    fn wrong_key_is_reported_as_corrupt() {
        let sealed = test_vault().encrypt(b"secret");
        let other = Vault::new(&[8u8; 32]);
        assert_matches!(other.decrypt(&sealed), Err(VaultError::Corrupt));
    }

    #[test]
    fn tampered_ciphertext_is_corrupt() {
        let vault = test_vault();
        let sealed = vault.encrypt(b"secret");
        let mut raw = BASE64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        assert_matches!(vault.decrypt(&BASE64.encode(raw)), Err(VaultError::Corrupt));
    }

    #[test]
    fn strict_mode_rejects_default_key() {
        std::env::set_var("VAULT_TEST_DEFAULT", DEV_DEFAULT_KEY);
        assert_matches!(
            Vault::from_env("VAULT_TEST_DEFAULT", true),
            Err(VaultError::DefaultKeyInProduction)
        );
        assert_matches!(
            Vault::from_env("VAULT_TEST_UNSET_VAR", true),
            Err(VaultError::MissingKey(_))
        );
        // Development posture falls back to the bundled key.
        assert!(Vault::from_env("VAULT_TEST_UNSET_VAR", false).is_ok());
    }
}
