//! Consistency Report
//!
//! Read-only comparison of the identity directory against the profile
//! store. Surfaces the drift the provisioning protocol can leave behind:
//! profiles whose identity is gone (failed bulk batches) and profiles whose
//! email no longer matches their identity (partial updates).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::identity::{IdentityAccount, IdentityDirectory};
use crate::principal::entity::PrincipalKind;
use crate::principal::repository::ProfileStore;
use crate::shared::error::ProvisioningError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedProfile {
    pub profile_id: String,
    pub external_id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMismatch {
    pub profile_id: String,
    pub external_id: String,
    pub profile_email: String,
    pub identity_email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindConsistency {
    pub kind: Option<PrincipalKind>,
    pub profiles_checked: usize,
    pub orphaned_profiles: Vec<OrphanedProfile>,
    pub email_mismatches: Vec<EmailMismatch>,
}

impl KindConsistency {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_profiles.is_empty() && self.email_mismatches.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub kinds: Vec<KindConsistency>,
    /// Identities referenced by no profile of any kind
    pub orphaned_identities: Vec<IdentityAccount>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_identities.is_empty() && self.kinds.iter().all(KindConsistency::is_consistent)
    }
}

pub struct ConsistencyChecker {
    identity: Arc<dyn IdentityDirectory>,
    profiles: Arc<dyn ProfileStore>,
}

impl ConsistencyChecker {
    pub fn new(identity: Arc<dyn IdentityDirectory>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { identity, profiles }
    }

    async fn accounts_by_id(&self) -> Result<HashMap<String, IdentityAccount>, ProvisioningError> {
        Ok(self
            .identity
            .list_accounts()
            .await?
            .into_iter()
            .map(|account| (account.external_id.clone(), account))
            .collect())
    }

    async fn check_against(
        &self,
        kind: PrincipalKind,
        accounts: &HashMap<String, IdentityAccount>,
        referenced: &mut HashSet<String>,
    ) -> Result<KindConsistency, ProvisioningError> {
        let profiles = self.profiles.find_all(kind).await?;
        let mut report = KindConsistency {
            kind: Some(kind),
            profiles_checked: profiles.len(),
            ..Default::default()
        };

        for profile in profiles {
            referenced.insert(profile.external_id.clone());
            match accounts.get(&profile.external_id) {
                None => report.orphaned_profiles.push(OrphanedProfile {
                    profile_id: profile.id,
                    external_id: profile.external_id,
                    email: profile.email,
                }),
                Some(account) if !account.email.eq_ignore_ascii_case(&profile.email) => {
                    report.email_mismatches.push(EmailMismatch {
                        profile_id: profile.id,
                        external_id: profile.external_id,
                        profile_email: profile.email,
                        identity_email: account.email.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        Ok(report)
    }

    pub async fn check(&self, kind: PrincipalKind) -> Result<KindConsistency, ProvisioningError> {
        let accounts = self.accounts_by_id().await?;
        let mut referenced = HashSet::new();
        self.check_against(kind, &accounts, &mut referenced).await
    }

    pub async fn check_all(&self) -> Result<ConsistencyReport, ProvisioningError> {
        let accounts = self.accounts_by_id().await?;
        let mut referenced = HashSet::new();
        let mut report = ConsistencyReport::default();

        for kind in PrincipalKind::ALL {
            report
                .kinds
                .push(self.check_against(kind, &accounts, &mut referenced).await?);
        }

        report.orphaned_identities = accounts
            .into_values()
            .filter(|account| !referenced.contains(&account.external_id))
            .collect();
        report
            .orphaned_identities
            .sort_by(|a, b| a.email.cmp(&b.email));

        info!(
            consistent = report.is_consistent(),
            orphaned_identities = report.orphaned_identities.len(),
            "Consistency check finished"
        );
        Ok(report)
    }
}
