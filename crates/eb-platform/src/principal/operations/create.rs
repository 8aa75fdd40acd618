//! Create Principal
//!
//! Identity first, then profile. When the profile insert fails the freshly
//! created identity is deleted again so no half-provisioned principal stays
//! behind.

use tracing::{info, warn};

use super::service::{IdentityRemoval, ProvisioningService};
use crate::principal::entity::Profile;
use crate::principal::input::PrincipalInput;
use crate::shared::error::ProvisioningError;

/// Outcome of a single create, including the identity it created (if any)
/// even when the call as a whole failed.
pub(crate) struct CreateAttempt {
    pub result: Result<Profile, ProvisioningError>,
    pub created_identity: Option<String>,
}

impl ProvisioningService {
    pub async fn create(&self, input: &PrincipalInput) -> Result<Profile, ProvisioningError> {
        self.create_tracked(input).await.result
    }

    pub(crate) async fn create_tracked(&self, input: &PrincipalInput) -> CreateAttempt {
        let mut created_identity = None;
        let result = self.create_paired(input, &mut created_identity).await;
        CreateAttempt {
            result,
            created_identity,
        }
    }

    async fn create_paired(
        &self,
        input: &PrincipalInput,
        created_identity: &mut Option<String>,
    ) -> Result<Profile, ProvisioningError> {
        let new = input.validate(self.settings.min_secret_length)?;
        let kind = new.kind();

        self.ensure_profile_free(kind, Some(new.email.as_str()), new.details.registration_number(), None)
            .await?;
        self.ensure_identity_free(&new.email).await?;

        let account = self
            .identity
            .create_account(&new.email, &new.secret, &new.name)
            .await?;
        *created_identity = Some(account.external_id.clone());

        let profile = Profile::new(&account.external_id, &new.email, &new.name, &new.secret, new.details);

        match self.profiles.insert(&profile).await {
            Ok(saved) => {
                info!(
                    kind = %kind,
                    profile_id = %saved.id,
                    external_id = %saved.external_id,
                    "Provisioned principal"
                );
                Ok(saved)
            }
            Err(insert_error) => {
                let mut error = ProvisioningError::from(insert_error);
                match self.remove_identity(&account.external_id).await {
                    IdentityRemoval::Failed { message } => {
                        warn!(
                            kind = %kind,
                            external_id = %account.external_id,
                            error = %message,
                            "Compensation failed, identity left without profile"
                        );
                        error = error.with_detail("compensationError", message.into());
                    }
                    _ => {
                        info!(
                            kind = %kind,
                            external_id = %account.external_id,
                            "Rolled back identity after failed profile insert"
                        );
                    }
                }
                Err(error)
            }
        }
    }
}
