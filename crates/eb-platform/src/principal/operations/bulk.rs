//! Bulk Provisioning
//!
//! Runs the single create for each input in order. If any item fails, every
//! identity created during the batch is deleted afterwards, including those
//! whose profiles were inserted. Inserted profiles are left in place, so a
//! failed batch leaves profiles whose identity is gone; the consistency
//! report lists them as orphans.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::service::{IdentityRemoval, ProvisioningService};
use crate::details;
use crate::principal::entity::PrincipalKind;
use crate::principal::input::PrincipalInput;
use crate::shared::error::ProvisioningError;

/// Result for one input, in input order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemOutcome {
    pub email: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProvisioningError>,
}

/// An identity the group compensation could not delete
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationFailure {
    pub external_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub results: Vec<BulkItemOutcome>,
    /// External ids removed by the group compensation
    pub rolled_back: Vec<String>,
    pub compensation_failures: Vec<CompensationFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

impl BulkReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn summary(&self) -> BulkSummary {
        BulkSummary {
            total: self.total(),
            success: self.succeeded(),
            failed: self.failed(),
        }
    }
}

pub struct BulkProvisioner {
    service: Arc<ProvisioningService>,
    max_batch_size: usize,
}

impl BulkProvisioner {
    pub fn new(service: Arc<ProvisioningService>, max_batch_size: usize) -> Self {
        Self {
            service,
            max_batch_size,
        }
    }

    pub fn service(&self) -> &Arc<ProvisioningService> {
        &self.service
    }

    pub async fn create_many(
        &self,
        kind: PrincipalKind,
        inputs: Vec<PrincipalInput>,
    ) -> Result<BulkReport, ProvisioningError> {
        if inputs.len() > self.max_batch_size {
            return Err(ProvisioningError::validation_with_details(
                "BATCH_TOO_LARGE",
                format!("Batch of {} exceeds the limit of {}", inputs.len(), self.max_batch_size),
                details! { "size" => inputs.len(), "maxBatchSize" => self.max_batch_size },
            ));
        }

        let mut report = BulkReport::default();
        let mut created_identities = Vec::new();

        for input in &inputs {
            let email = input.normalized_email();

            if input.kind() != kind {
                report.results.push(BulkItemOutcome {
                    email,
                    success: false,
                    external_id: None,
                    error: Some(ProvisioningError::validation_with_details(
                        "KIND_MISMATCH",
                        format!("Expected a {} principal, got {}", kind, input.kind()),
                        details! { "expected" => kind.as_str(), "actual" => input.kind().as_str() },
                    )),
                });
                continue;
            }

            let attempt = self.service.create_tracked(input).await;
            if let Some(ref external_id) = attempt.created_identity {
                created_identities.push(external_id.clone());
            }

            report.results.push(match attempt.result {
                Ok(profile) => BulkItemOutcome {
                    email,
                    success: true,
                    external_id: Some(profile.external_id),
                    error: None,
                },
                Err(e) => BulkItemOutcome {
                    email,
                    success: false,
                    external_id: attempt.created_identity,
                    error: Some(e),
                },
            });
        }

        if report.failed() > 0 {
            self.compensate(kind, &created_identities, &mut report).await;
        }

        info!(
            kind = %kind,
            total = report.total(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            rolled_back = report.rolled_back.len(),
            "Bulk provisioning finished"
        );

        Ok(report)
    }

    async fn compensate(&self, kind: PrincipalKind, created: &[String], report: &mut BulkReport) {
        warn!(
            kind = %kind,
            failed = report.failed(),
            identities = created.len(),
            "Batch had failures, removing every identity it created"
        );

        for external_id in created {
            match self.service.remove_identity(external_id).await {
                IdentityRemoval::Failed { message } => {
                    report.compensation_failures.push(CompensationFailure {
                        external_id: external_id.clone(),
                        message,
                    });
                }
                _ => report.rolled_back.push(external_id.clone()),
            }
        }
    }
}
