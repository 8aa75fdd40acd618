//! Principal Aggregate
//!
//! Staff, students and generic users. Each principal is an identity account
//! paired with a profile document.

pub mod entity;
pub mod input;
pub mod repository;
pub mod memory_repository;
pub mod operations;
pub mod api;

// Re-export main types
pub use entity::{PrincipalKind, Profile, ProfileDetails, StudentStatus};
pub use input::{DetailsPatch, PrincipalInput, PrincipalPatch, StaffInput, StudentInput, UserInput};
pub use repository::{MongoProfileRepository, ProfileFilter, ProfileStore, ProfileStoreError, ProfileUpdate};
pub use memory_repository::InMemoryProfileStore;
pub use api::{principals_router, ProvisioningState};
