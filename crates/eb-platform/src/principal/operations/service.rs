//! Provisioning Service
//!
//! One service handles every principal kind. The operations themselves live
//! in sibling modules as `impl ProvisioningService` blocks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::identity::{IdentityDirectory, IdentityError};
use crate::principal::entity::PrincipalKind;
use crate::principal::repository::{ProfileFilter, ProfileStore};
use crate::shared::error::ProvisioningError;
use crate::details;

/// Rules applied to every provisioning request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    pub min_secret_length: usize,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self { min_secret_length: 6 }
    }
}

/// What happened to the identity account during a removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityRemoval {
    Deleted,
    /// The directory had no such account
    AlreadyAbsent,
    Failed { message: String },
    /// No identity key was known, nothing was attempted
    Skipped,
}

impl IdentityRemoval {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

pub struct ProvisioningService {
    pub(crate) identity: Arc<dyn IdentityDirectory>,
    pub(crate) profiles: Arc<dyn ProfileStore>,
    pub(crate) settings: ProvisioningSettings,
}

impl ProvisioningService {
    pub fn new(
        identity: Arc<dyn IdentityDirectory>,
        profiles: Arc<dyn ProfileStore>,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            identity,
            profiles,
            settings,
        }
    }

    pub fn identity(&self) -> &Arc<dyn IdentityDirectory> {
        &self.identity
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    pub fn settings(&self) -> &ProvisioningSettings {
        &self.settings
    }

    /// Delete an identity account, treating "not found" as already removed.
    /// Never fails; the outcome is reported instead.
    pub(crate) async fn remove_identity(&self, external_id: &str) -> IdentityRemoval {
        match self.identity.delete_account(external_id).await {
            Ok(()) => {
                debug!(external_id = %external_id, "Identity removed");
                IdentityRemoval::Deleted
            }
            Err(IdentityError::NotFound { .. }) => {
                debug!(external_id = %external_id, "Identity already absent");
                IdentityRemoval::AlreadyAbsent
            }
            Err(e) => {
                warn!(
                    external_id = %external_id,
                    provider = self.identity.provider_type(),
                    error = %e,
                    "Failed to remove identity"
                );
                IdentityRemoval::Failed { message: e.to_string() }
            }
        }
    }

    /// Conflict when the kind's collection already holds this email, or (for
    /// students) this registration number.
    pub(crate) async fn ensure_profile_free(
        &self,
        kind: PrincipalKind,
        email: Option<&str>,
        registration_number: Option<&str>,
        except_id: Option<&str>,
    ) -> Result<(), ProvisioningError> {
        let taken_by_other = |id: &str| Some(id) != except_id;

        if let Some(email) = email {
            let existing = self
                .profiles
                .find_one(kind, &ProfileFilter::Email(email.to_string()))
                .await?;
            if existing.is_some_and(|p| taken_by_other(&p.id)) {
                return Err(ProvisioningError::conflict_with_details(
                    "EMAIL_EXISTS",
                    format!("A {} profile with email '{}' already exists", kind, email),
                    details! { "email" => email, "kind" => kind.as_str(), "side" => "profile" },
                ));
            }
        }

        if let Some(reg) = registration_number {
            let existing = self
                .profiles
                .find_one(kind, &ProfileFilter::RegistrationNumber(reg.to_string()))
                .await?;
            if existing.is_some_and(|p| taken_by_other(&p.id)) {
                return Err(ProvisioningError::conflict_with_details(
                    "REGISTRATION_NUMBER_EXISTS",
                    format!("Registration number '{}' is already assigned", reg),
                    details! { "registrationNumber" => reg, "kind" => kind.as_str(), "side" => "profile" },
                ));
            }
        }

        Ok(())
    }

    /// Conflict when the directory already has an account for this email.
    pub(crate) async fn ensure_identity_free(&self, email: &str) -> Result<(), ProvisioningError> {
        if self.identity.lookup_by_email(email).await?.is_some() {
            return Err(IdentityError::EmailExists { email: email.to_string() }.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::InMemoryDirectory;
    use crate::principal::memory_repository::InMemoryProfileStore;

    fn service() -> (Arc<InMemoryDirectory>, ProvisioningService) {
        let directory = Arc::new(InMemoryDirectory::new());
        let service = ProvisioningService::new(
            directory.clone(),
            Arc::new(InMemoryProfileStore::new()),
            ProvisioningSettings::default(),
        );
        (directory, service)
    }

    #[tokio::test]
    async fn test_remove_identity_outcomes() {
        let (directory, service) = service();
        let account = directory.create_account("a@x.com", "abcdef", "A").await.unwrap();

        assert_eq!(service.remove_identity(&account.external_id).await, IdentityRemoval::Deleted);
        assert_eq!(
            service.remove_identity(&account.external_id).await,
            IdentityRemoval::AlreadyAbsent
        );

        let other = directory.create_account("b@x.com", "abcdef", "B").await.unwrap();
        directory.fail_delete_for(&other.external_id);
        assert!(service.remove_identity(&other.external_id).await.is_failure());
    }

    #[test]
    fn test_identity_removal_serialization() {
        let json = serde_json::to_value(IdentityRemoval::Failed { message: "boom".into() }).unwrap();
        assert_eq!(json["outcome"], "FAILED");
        assert_eq!(json["message"], "boom");

        let json = serde_json::to_value(IdentityRemoval::AlreadyAbsent).unwrap();
        assert_eq!(json["outcome"], "ALREADY_ABSENT");
    }
}
