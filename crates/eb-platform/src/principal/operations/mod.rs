//! Principal Operations
//!
//! Provisioning use cases that keep the identity directory and the profile
//! store paired.

pub mod service;
pub mod create;
pub mod update;
pub mod delete;
pub mod bulk;
pub mod consistency;

pub use service::{IdentityRemoval, ProvisioningService, ProvisioningSettings};
pub use delete::{DeleteReport, ProfileKey};
pub use bulk::{BulkItemOutcome, BulkProvisioner, BulkReport, BulkSummary, CompensationFailure};
pub use consistency::{ConsistencyChecker, ConsistencyReport, EmailMismatch, KindConsistency, OrphanedProfile};
