//! Per-user password retrieval
//!
//! Secondary passwords live in a separate password store, RSA-OAEP
//! (SHA-256) encrypted and base64 encoded. The private key must be an
//! encrypted PKCS#8 PEM file; an unencrypted key is refused.

mod key;
mod locator;
mod store;

pub use key::EncryptedPrivateKey;
pub use locator::{login_token, password_store_url, PASSWORD_STORE_EXTENSION};
pub use store::{interpret_entry_response, HttpPasswordStore, PasswordStore};

use crate::directory::DirectoryError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::Oaep;
use sha2::Sha256;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Encrypted private key required; passphrase must not be empty")]
    PassphraseRequired,
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("Server URL must start with https://: {0}")]
    InsecureServerUrl(String),
    #[error("Private key {0} is not encrypted")]
    UnencryptedKey(String),
    #[error("Could not read private key file {path:?}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to load private key: {0}")]
    KeyLoad(String),
    #[error("Invalid user id {0}")]
    InvalidUserId(u64),
    #[error("Password store request failed: {0}")]
    Transport(String),
    #[error("Unexpected response from password store: {status} {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("Invalid password store response: {0}")]
    InvalidResponse(String),
    #[error("secondaryPassword is missing in response")]
    MissingPassword,
    #[error("Encrypted password is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("Decryption failed: {0}")]
    Decryption(String),
    #[error("Password store settings: {0}")]
    Settings(String),
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

impl PasswordError {
    /// Operator mistakes, as opposed to runtime failures
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PasswordError::PassphraseRequired
                | PasswordError::MissingArgument(_)
                | PasswordError::InsecureServerUrl(_)
                | PasswordError::UnencryptedKey(_)
                | PasswordError::KeyRead { .. }
                | PasswordError::KeyLoad(_)
                | PasswordError::Settings(_)
        )
    }
}

/// Fetches and decrypts secondary passwords
pub struct PasswordService {
    key: EncryptedPrivateKey,
    store: Arc<dyn PasswordStore>,
}

impl PasswordService {
    pub fn new(key: EncryptedPrivateKey, store: Arc<dyn PasswordStore>) -> Self {
        PasswordService { key, store }
    }

    /// Build a service talking to the HTTP password store
    ///
    /// The passphrase is checked first, then the remaining arguments, then
    /// the URL scheme. The key file itself is only read on first decryption.
    pub fn connect(
        key_path: &str,
        passphrase: &str,
        api_token: &str,
        server_url: &str,
    ) -> Result<Self, PasswordError> {
        if passphrase.trim().is_empty() {
            return Err(PasswordError::PassphraseRequired);
        }
        let key = EncryptedPrivateKey::new(key_path, passphrase)?;
        let store = HttpPasswordStore::new(server_url, api_token)?;
        Ok(Self::new(key, Arc::new(store)))
    }

    /// Encrypted password of a user, `None` if the store has no entry
    pub async fn get_encrypted_pwd(&self, user_id: u64) -> Result<Option<String>, PasswordError> {
        if user_id == 0 {
            return Err(PasswordError::InvalidUserId(user_id));
        }
        self.store.fetch_secondary_password(user_id).await
    }

    pub async fn decrypt_pwd(&self, encrypted: &str) -> Result<String, PasswordError> {
        let trimmed = encrypted.trim();
        if trimmed.is_empty() {
            return Err(PasswordError::InvalidBase64("empty input".to_string()));
        }
        let ciphertext = STANDARD
            .decode(trimmed)
            .map_err(|e| PasswordError::InvalidBase64(e.to_string()))?;

        let key = self.key.get().await?;
        let plain = key
            .decrypt(Oaep::new::<Sha256>(), &ciphertext)
            .map_err(|e| PasswordError::Decryption(e.to_string()))?;

        String::from_utf8(plain).map_err(|e| PasswordError::Decryption(e.to_string()))
    }

    pub async fn get_cleartext_pwd(&self, user_id: u64) -> Result<Option<String>, PasswordError> {
        match self.get_encrypted_pwd(user_id).await? {
            None => {
                debug!(user_id, "No password store entry");
                Ok(None)
            }
            Some(encrypted) => self.decrypt_pwd(&encrypted).await.map(Some),
        }
    }
}
