//! Update Principal
//!
//! Identity first, then profile. If the profile write fails after the
//! identity write succeeded the two sides disagree; the error says so with
//! `partialState: true` and nothing is repaired automatically.

use tracing::{error, info};

use super::service::ProvisioningService;
use crate::details;
use crate::identity::AccountUpdate;
use crate::principal::entity::{PrincipalKind, Profile};
use crate::principal::input::{normalize_email, DetailsPatch, PrincipalPatch};
use crate::principal::repository::{ProfileFilter, ProfileUpdate};
use crate::shared::error::ProvisioningError;

impl ProvisioningService {
    async fn find_profile_by_email(&self, kind: PrincipalKind, email: &str) -> Result<Profile, ProvisioningError> {
        self.profiles
            .find_one(kind, &ProfileFilter::Email(email.to_string()))
            .await?
            .ok_or_else(|| {
                ProvisioningError::profile_not_found(
                    format!("No {} profile with email '{}'", kind, email),
                    details! { "email" => email, "kind" => kind.as_str() },
                )
            })
    }

    pub async fn update(
        &self,
        kind: PrincipalKind,
        old_email: &str,
        patch: &PrincipalPatch,
    ) -> Result<Profile, ProvisioningError> {
        let old_email = normalize_email(old_email);
        let profile = self.find_profile_by_email(kind, &old_email).await?;

        let patch = patch.validate(self.settings.min_secret_length)?;
        let details = if patch.details.is_empty() {
            None
        } else {
            Some(patch.details.apply(&profile.details)?)
        };

        let account = self
            .identity
            .lookup_by_email(&old_email)
            .await?
            .ok_or_else(|| {
                ProvisioningError::identity_not_found(
                    format!("No identity account for '{}'", old_email),
                    details! { "email" => &old_email, "kind" => kind.as_str() },
                )
            })?;

        // The email may resolve to an account paired with another profile.
        if account.external_id != profile.external_id {
            return Err(ProvisioningError::identity_not_found(
                format!(
                    "Identity account for '{}' is not the one paired with this {} profile",
                    old_email, kind
                ),
                details! {
                    "email" => &old_email,
                    "kind" => kind.as_str(),
                    "profileExternalId" => &profile.external_id,
                    "identityExternalId" => &account.external_id
                },
            ));
        }

        let new_email = patch.new_email.filter(|email| *email != profile.email);
        if let Some(ref email) = new_email {
            self.ensure_identity_free(email).await?;
        }
        let new_registration = patch
            .details
            .registration_number
            .as_deref()
            .filter(|reg| Some(*reg) != profile.registration_number());
        self.ensure_profile_free(kind, new_email.as_deref(), new_registration, Some(profile.id.as_str()))
            .await?;

        let account_update = AccountUpdate {
            email: new_email.clone(),
            secret: patch.new_secret.clone(),
            display_name: patch.name.clone(),
            disabled: None,
        };
        let identity_written = !account_update.is_empty();
        if identity_written {
            self.identity
                .update_account(&account.external_id, &account_update)
                .await?;
        }

        let profile_update = ProfileUpdate {
            email: new_email,
            name: patch.name,
            secret: patch.new_secret,
            details,
        };

        let outcome = self
            .profiles
            .update_one(kind, &ProfileFilter::Id(profile.id.clone()), &profile_update)
            .await;

        let failure = match outcome {
            Ok(Some(updated)) => {
                info!(
                    kind = %kind,
                    profile_id = %updated.id,
                    external_id = %updated.external_id,
                    "Updated principal"
                );
                return Ok(updated);
            }
            Ok(None) => ProvisioningError::profile_not_found(
                format!("{} profile '{}' disappeared during update", kind, profile.id),
                details! { "profileId" => &profile.id, "kind" => kind.as_str() },
            ),
            Err(e) => ProvisioningError::from(e),
        };

        if identity_written {
            error!(
                kind = %kind,
                profile_id = %profile.id,
                external_id = %account.external_id,
                code = failure.code(),
                "Identity updated but profile update failed, sides have diverged"
            );
            return Err(failure.with_detail("partialState", true.into()));
        }
        Err(failure)
    }

    /// Patch profile-only attributes. The identity directory is not involved.
    pub async fn update_details(
        &self,
        kind: PrincipalKind,
        email: &str,
        patch: &DetailsPatch,
    ) -> Result<Profile, ProvisioningError> {
        let email = normalize_email(email);
        let profile = self.find_profile_by_email(kind, &email).await?;

        let change = patch.validate()?;
        let details = change.apply(&profile.details)?;

        let update = ProfileUpdate {
            details: Some(details),
            ..Default::default()
        };
        let updated = self
            .profiles
            .update_one(kind, &ProfileFilter::Id(profile.id.clone()), &update)
            .await?
            .ok_or_else(|| {
                ProvisioningError::profile_not_found(
                    format!("No {} profile with email '{}'", kind, email),
                    details! { "email" => &email, "kind" => kind.as_str() },
                )
            })?;

        info!(kind = %kind, profile_id = %updated.id, "Updated principal details");
        Ok(updated)
    }
}
