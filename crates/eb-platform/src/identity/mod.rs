//! Identity Directory Adapters
//!
//! The identity directory is the external user directory that owns
//! authentication. Provisioning only needs a handful of account operations,
//! captured by [`IdentityDirectory`]; each provider gets an adapter.

pub mod keycloak;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use keycloak::{KeycloakConfig, KeycloakDirectory};
pub use memory::InMemoryDirectory;

/// An account in the identity directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityAccount {
    /// Directory-assigned key, immutable
    pub external_id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub disabled: bool,
}

/// Fields to change on an account. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    pub email: Option<String>,
    pub secret: Option<String>,
    pub display_name: Option<String>,
    pub disabled: Option<bool>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.secret.is_none()
            && self.display_name.is_none()
            && self.disabled.is_none()
    }
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Identity account already exists for {email}")]
    EmailExists { email: String },

    #[error("Secret rejected: {message}")]
    WeakSecret { message: String },

    #[error("Invalid email: {email}")]
    InvalidEmail { email: String },

    #[error("Identity account not found: {external_id}")]
    NotFound { external_id: String },

    #[error("Identity provider error: {message}")]
    Provider { message: String },

    #[error("Identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Account operations the provisioning protocol consumes.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Provider identifier, for logs
    fn provider_type(&self) -> &'static str;

    async fn create_account(
        &self,
        email: &str,
        secret: &str,
        display_name: &str,
    ) -> Result<IdentityAccount, IdentityError>;

    /// `Ok(None)` is the directory's "not found".
    async fn lookup_by_email(&self, email: &str) -> Result<Option<IdentityAccount>, IdentityError>;

    async fn update_account(&self, external_id: &str, update: &AccountUpdate) -> Result<(), IdentityError>;

    /// Fails with [`IdentityError::NotFound`] when the account does not exist.
    async fn delete_account(&self, external_id: &str) -> Result<(), IdentityError>;

    async fn list_accounts(&self) -> Result<Vec<IdentityAccount>, IdentityError>;
}
