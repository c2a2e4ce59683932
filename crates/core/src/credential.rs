use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one trading account login.
///
/// The secret is never serialized and never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub account_id: Option<u64>,
    #[serde(default, alias = "password", skip_serializing)]
    pub secret: String,
    #[serde(default, alias = "account_server")]
    pub server: String,
}

/// Reason a credential is unusable for login.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("account_id is not set")]
    MissingAccountId,
    #[error("password is not set")]
    MissingSecret,
    #[error("account_server is not set")]
    MissingServer,
}

impl Credential {
    pub fn new(account_id: u64, secret: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id),
            secret: secret.into(),
            server: server.into(),
        }
    }

    /// Check that all three fields are present, returning the account id.
    pub fn validate(&self) -> Result<u64, CredentialError> {
        let id = self.account_id.ok_or(CredentialError::MissingAccountId)?;
        if self.secret.is_empty() {
            return Err(CredentialError::MissingSecret);
        }
        if self.server.is_empty() {
            return Err(CredentialError::MissingServer);
        }
        Ok(id)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("secret", &"**********")
            .field("server", &self.server)
            .finish()
    }
}
