//! Delete Principal
//!
//! Identity first, then profile. A missing identity never blocks the
//! profile deletion, so repeating a delete is harmless.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::service::{IdentityRemoval, ProvisioningService};
use crate::details;
use crate::principal::entity::PrincipalKind;
use crate::principal::input::normalize_email;
use crate::principal::repository::ProfileFilter;
use crate::shared::error::ProvisioningError;

/// How the principal to delete is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileKey {
    Id(String),
    ExternalId(String),
    Email(String),
}

impl ProfileKey {
    /// Build a key from the `by` selector used by the HTTP layer.
    pub fn parse(by: &str, value: &str) -> Result<Self, ProvisioningError> {
        match by {
            "id" => Ok(Self::Id(value.to_string())),
            "externalId" | "external_id" => Ok(Self::ExternalId(value.to_string())),
            "email" => Ok(Self::Email(value.to_string())),
            other => Err(ProvisioningError::validation_with_details(
                "INVALID_KEY_TYPE",
                format!("Unknown key type '{}', expected id, externalId or email", other),
                details! { "by" => other },
            )),
        }
    }

    fn to_filter(&self) -> ProfileFilter {
        match self {
            Self::Id(id) => ProfileFilter::Id(id.clone()),
            Self::ExternalId(id) => ProfileFilter::ExternalId(id.clone()),
            Self::Email(email) => ProfileFilter::Email(normalize_email(email)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    /// False when there was no profile to delete
    pub profile_deleted: bool,
    pub identity: IdentityRemoval,
}

impl ProvisioningService {
    /// Kind of the profile paired with this identity, if any.
    async fn owning_kind(&self, external_id: &str) -> Result<Option<PrincipalKind>, ProvisioningError> {
        let filter = ProfileFilter::ExternalId(external_id.to_string());
        for kind in PrincipalKind::ALL {
            if self.profiles.find_one(kind, &filter).await?.is_some() {
                return Ok(Some(kind));
            }
        }
        Ok(None)
    }

    pub async fn delete(&self, kind: PrincipalKind, key: &ProfileKey) -> Result<DeleteReport, ProvisioningError> {
        let Some(profile) = self.profiles.find_one(kind, &key.to_filter()).await? else {
            let identity = match key {
                ProfileKey::ExternalId(external_id) => match self.owning_kind(external_id).await? {
                    Some(owner) => {
                        warn!(
                            kind = %kind,
                            owner = %owner,
                            external_id = %external_id,
                            "Identity belongs to a profile of another kind, not removing it"
                        );
                        IdentityRemoval::Skipped
                    }
                    None => self.remove_identity(external_id).await,
                },
                _ => IdentityRemoval::Skipped,
            };
            info!(kind = %kind, key = ?key, identity = ?identity, "No profile to delete");
            return Ok(DeleteReport {
                profile_deleted: false,
                identity,
            });
        };

        let identity = self.remove_identity(&profile.external_id).await;
        if identity.is_failure() {
            warn!(
                kind = %kind,
                profile_id = %profile.id,
                external_id = %profile.external_id,
                "Deleting profile although identity removal failed"
            );
        }

        let deleted = self
            .profiles
            .delete_one(kind, &ProfileFilter::Id(profile.id.clone()))
            .await?;

        info!(
            kind = %kind,
            profile_id = %profile.id,
            external_id = %profile.external_id,
            "Deleted principal"
        );

        Ok(DeleteReport {
            profile_deleted: deleted > 0,
            identity,
        })
    }
}
