use super::PasswordError;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::debug;

/// Passphrase-protected RSA private key, loaded on first use
pub struct EncryptedPrivateKey {
    path: PathBuf,
    passphrase: String,
    key: OnceCell<RsaPrivateKey>,
}

impl EncryptedPrivateKey {
    pub fn new(path: &str, passphrase: &str) -> Result<Self, PasswordError> {
        if passphrase.trim().is_empty() {
            return Err(PasswordError::PassphraseRequired);
        }
        if path.trim().is_empty() {
            return Err(PasswordError::MissingArgument("pathToPrivateDecryptionKey"));
        }
        Ok(EncryptedPrivateKey {
            path: PathBuf::from(path.trim()),
            passphrase: passphrase.trim().to_string(),
            key: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> Result<&RsaPrivateKey, PasswordError> {
        self.key.get_or_try_init(|| self.load()).await
    }

    async fn load(&self) -> Result<RsaPrivateKey, PasswordError> {
        let pem = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| PasswordError::KeyRead {
                path: self.path.clone(),
                source,
            })?;

        if is_unencrypted(&pem) {
            return Err(PasswordError::UnencryptedKey(self.path.display().to_string()));
        }

        let key = RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, self.passphrase.as_bytes())
            .map_err(|e| PasswordError::KeyLoad(e.to_string()))?;

        debug!(path = %self.path.display(), "Loaded private decryption key");
        Ok(key)
    }
}

/// A key that loads without a passphrase is not encrypted
fn is_unencrypted(pem: &str) -> bool {
    RsaPrivateKey::from_pkcs8_pem(pem).is_ok() || RsaPrivateKey::from_pkcs1_pem(pem).is_ok()
}

impl fmt::Debug for EncryptedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedPrivateKey")
            .field("path", &self.path)
            .field("loaded", &self.key.initialized())
            .finish()
    }
}
