//! Error classification for the authorization chain
//!
//! Every failure ends as a Reject line on stdout and exit code 1, but the
//! three kinds are logged differently: end-user input problems at warn,
//! operator mistakes and internal failures at error.

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::directory::DirectoryError;
use crate::password::PasswordError;
use ctradius_proto::ResponseError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or disallowed input from the end user
    Authentication,
    /// Invalid configuration or operator mistake
    Configuration,
    /// Directory, password store, decryption or cache failure
    Internal,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Authentication(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Module misconfiguration: {0}")]
    Misconfigured(String),
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("Password store error: {0}")]
    Password(#[from] PasswordError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Response error: {0}")]
    Response(#[from] ResponseError),
}

impl AuthError {
    pub fn authentication(message: impl Into<String>) -> Self {
        AuthError::Authentication(message.into())
    }

    pub fn misconfigured(message: impl Into<String>) -> Self {
        AuthError::Misconfigured(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Authentication(_) => ErrorKind::Authentication,
            AuthError::Config(_) | AuthError::Misconfigured(_) => ErrorKind::Configuration,
            AuthError::Password(e) if e.is_configuration() => ErrorKind::Configuration,
            AuthError::Password(_)
            | AuthError::Directory(_)
            | AuthError::Cache(_)
            | AuthError::Response(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AuthError::authentication("empty").kind(),
            ErrorKind::Authentication
        );
        assert_eq!(
            AuthError::misconfigured("vlan").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            AuthError::from(ConfigError::InheritanceCycle("a".into())).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            AuthError::from(PasswordError::UnencryptedKey("/k.pem".into())).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            AuthError::from(PasswordError::MissingPassword).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            AuthError::from(DirectoryError::Transport("refused".into())).kind(),
            ErrorKind::Internal
        );
    }
}
