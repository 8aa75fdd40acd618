//! Exambase Platform
//!
//! Provisioning of principals (staff, students, generic users) across two
//! systems that must stay paired:
//! - the identity directory, which owns authentication (Keycloak)
//! - the profile store, which owns domain attributes (MongoDB)
//!
//! Create, update and delete keep both sides consistent, compensating when
//! one side succeeds and the other fails. Bulk creation applies the same
//! protocol to a batch with group-level compensation.
//!
//! ## Module Organization
//!
//! - `identity` - Identity directory contract and adapters
//! - `principal` - Profiles, inputs, provisioning operations and REST endpoints
//! - `shared` - Errors and index setup

pub mod identity;
pub mod principal;
pub mod shared;

// Note: details! macro is automatically exported at crate root via #[macro_export]
pub use shared::error::{ErrorKind, LookupSide, Origin, ProvisioningError};
pub use shared::indexes::initialize_indexes;

pub use identity::{
    AccountUpdate, IdentityAccount, IdentityDirectory, IdentityError, InMemoryDirectory, KeycloakConfig,
    KeycloakDirectory,
};

pub use principal::{
    principals_router, InMemoryProfileStore, MongoProfileRepository, PrincipalInput, PrincipalKind,
    PrincipalPatch, DetailsPatch, Profile, ProfileDetails, ProfileStore, ProvisioningState,
    StudentStatus,
};
pub use principal::operations::{
    BulkProvisioner, BulkReport, ConsistencyChecker, ConsistencyReport, DeleteReport, IdentityRemoval,
    ProfileKey, ProvisioningService, ProvisioningSettings,
};
