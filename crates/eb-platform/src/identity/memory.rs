//! In-memory identity directory
//!
//! Enforces global email uniqueness and a minimum secret length like a real
//! provider would. Used in dev mode and tests; operations can be made to
//! fail for a given email or account id.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{AccountUpdate, IdentityAccount, IdentityDirectory, IdentityError};

#[derive(Debug, Clone)]
struct StoredAccount {
    account: IdentityAccount,
    secret: String,
}

#[derive(Default)]
struct DirectoryState {
    accounts: BTreeMap<String, StoredAccount>,
    fail_creates: HashSet<String>,
    fail_updates: HashSet<String>,
    fail_deletes: HashSet<String>,
}

pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
    min_secret_length: usize,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::with_min_secret_length(6)
    }

    pub fn with_min_secret_length(min_secret_length: usize) -> Self {
        Self {
            state: Mutex::new(DirectoryState::default()),
            min_secret_length,
        }
    }

    /// Fail `create_account` for this email with a provider error.
    pub fn fail_create_for(&self, email: impl Into<String>) {
        self.state.lock().fail_creates.insert(email.into());
    }

    /// Fail `update_account` for this account id with a provider error.
    pub fn fail_update_for(&self, external_id: impl Into<String>) {
        self.state.lock().fail_updates.insert(external_id.into());
    }

    /// Fail `delete_account` with a provider error for the account with this
    /// id or this email. Matching by email covers accounts not created yet.
    pub fn fail_delete_for(&self, key: impl Into<String>) {
        self.state.lock().fail_deletes.insert(key.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_creates.clear();
        state.fail_updates.clear();
        state.fail_deletes.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored secret for an account, for assertions in tests.
    pub fn secret_of(&self, external_id: &str) -> Option<String> {
        self.state.lock().accounts.get(external_id).map(|a| a.secret.clone())
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn email_taken(state: &DirectoryState, email: &str, except: Option<&str>) -> bool {
    state
        .accounts
        .values()
        .any(|a| a.account.email.eq_ignore_ascii_case(email) && Some(a.account.external_id.as_str()) != except)
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    fn provider_type(&self) -> &'static str {
        "memory"
    }

    async fn create_account(
        &self,
        email: &str,
        secret: &str,
        display_name: &str,
    ) -> Result<IdentityAccount, IdentityError> {
        let mut state = self.state.lock();

        if state.fail_creates.contains(email) {
            return Err(IdentityError::Provider {
                message: format!("create rejected for {}", email),
            });
        }
        if !email.contains('@') {
            return Err(IdentityError::InvalidEmail { email: email.to_string() });
        }
        if secret.chars().count() < self.min_secret_length {
            return Err(IdentityError::WeakSecret {
                message: format!("password must be at least {} characters", self.min_secret_length),
            });
        }
        if email_taken(&state, email, None) {
            return Err(IdentityError::EmailExists { email: email.to_string() });
        }

        let account = IdentityAccount {
            external_id: uuid::Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            disabled: false,
        };
        state.accounts.insert(
            account.external_id.clone(),
            StoredAccount {
                account: account.clone(),
                secret: secret.to_string(),
            },
        );
        debug!(external_id = %account.external_id, "Created in-memory identity");
        Ok(account)
    }

    async fn lookup_by_email(&self, email: &str) -> Result<Option<IdentityAccount>, IdentityError> {
        let state = self.state.lock();
        Ok(state
            .accounts
            .values()
            .find(|a| a.account.email.eq_ignore_ascii_case(email))
            .map(|a| a.account.clone()))
    }

    async fn update_account(&self, external_id: &str, update: &AccountUpdate) -> Result<(), IdentityError> {
        let mut state = self.state.lock();

        if state.fail_updates.contains(external_id) {
            return Err(IdentityError::Provider {
                message: format!("update rejected for {}", external_id),
            });
        }
        if !state.accounts.contains_key(external_id) {
            return Err(IdentityError::NotFound { external_id: external_id.to_string() });
        }
        if let Some(ref email) = update.email {
            if email_taken(&state, email, Some(external_id)) {
                return Err(IdentityError::EmailExists { email: email.clone() });
            }
        }
        if let Some(ref secret) = update.secret {
            if secret.chars().count() < self.min_secret_length {
                return Err(IdentityError::WeakSecret {
                    message: format!("password must be at least {} characters", self.min_secret_length),
                });
            }
        }

        if let Some(stored) = state.accounts.get_mut(external_id) {
            if let Some(ref email) = update.email {
                stored.account.email = email.clone();
            }
            if let Some(ref name) = update.display_name {
                stored.account.display_name = name.clone();
            }
            if let Some(disabled) = update.disabled {
                stored.account.disabled = disabled;
            }
            if let Some(ref secret) = update.secret {
                stored.secret = secret.clone();
            }
        }
        Ok(())
    }

    async fn delete_account(&self, external_id: &str) -> Result<(), IdentityError> {
        let mut state = self.state.lock();

        let blocked = state.fail_deletes.contains(external_id)
            || state
                .accounts
                .get(external_id)
                .is_some_and(|a| state.fail_deletes.contains(&a.account.email));
        if blocked {
            return Err(IdentityError::Provider {
                message: format!("delete rejected for {}", external_id),
            });
        }
        match state.accounts.remove(external_id) {
            Some(_) => Ok(()),
            None => Err(IdentityError::NotFound { external_id: external_id.to_string() }),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<IdentityAccount>, IdentityError> {
        Ok(self.state.lock().accounts.values().map(|a| a.account.clone()).collect())
    }
}
