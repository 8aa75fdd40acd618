//! In-memory profile store
//!
//! Process-local [`ProfileStore`] that emulates the unique indexes of the
//! MongoDB repository. Used in dev mode and tests. Individual writes can be
//! made to fail for a given email.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::principal::entity::{PrincipalKind, Profile};
use crate::principal::repository::{ProfileFilter, ProfileStore, ProfileStoreError, ProfileUpdate};

#[derive(Default)]
struct StoreState {
    profiles: HashMap<PrincipalKind, Vec<Profile>>,
    fail_inserts: HashSet<String>,
    duplicate_inserts: HashSet<String>,
    fail_updates: HashSet<String>,
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    state: Mutex<StoreState>,
    insert_attempts: AtomicUsize,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert of a profile with this email fail.
    pub fn fail_insert_for(&self, email: impl Into<String>) {
        self.state.lock().fail_inserts.insert(email.into());
    }

    /// Reject inserts of this email as a unique index violation, as when a
    /// concurrent writer inserted the same email first.
    pub fn reject_insert_as_duplicate(&self, email: impl Into<String>) {
        self.state.lock().duplicate_inserts.insert(email.into());
    }

    /// Make every update of the profile currently holding this email fail.
    pub fn fail_update_for(&self, email: impl Into<String>) {
        self.state.lock().fail_updates.insert(email.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_inserts.clear();
        state.duplicate_inserts.clear();
        state.fail_updates.clear();
    }

    /// Number of insert calls received, successful or not.
    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn count(&self, kind: PrincipalKind) -> usize {
        self.state.lock().profiles.get(&kind).map(Vec::len).unwrap_or(0)
    }
}

/// Check the unique indexes for `candidate`, ignoring the document with `skip_id`.
fn check_unique(
    existing: &[Profile],
    candidate: &Profile,
    skip_id: Option<&str>,
) -> Result<(), ProfileStoreError> {
    for other in existing.iter().filter(|p| Some(p.id.as_str()) != skip_id) {
        if other.id == candidate.id {
            return Err(ProfileStoreError::DuplicateKey {
                field: "_id".to_string(),
                value: candidate.id.clone(),
            });
        }
        if other.email == candidate.email {
            return Err(ProfileStoreError::DuplicateKey {
                field: "email".to_string(),
                value: candidate.email.clone(),
            });
        }
        if other.external_id == candidate.external_id {
            return Err(ProfileStoreError::DuplicateKey {
                field: "externalId".to_string(),
                value: candidate.external_id.clone(),
            });
        }
        if let (Some(a), Some(b)) = (other.registration_number(), candidate.registration_number()) {
            if a == b {
                return Err(ProfileStoreError::DuplicateKey {
                    field: "registrationNumber".to_string(),
                    value: b.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn insert(&self, profile: &Profile) -> Result<Profile, ProfileStoreError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();

        if state.fail_inserts.contains(&profile.email) {
            return Err(ProfileStoreError::Unavailable {
                message: format!("insert rejected for {}", profile.email),
            });
        }
        if state.duplicate_inserts.contains(&profile.email) {
            return Err(ProfileStoreError::DuplicateKey {
                field: "email".to_string(),
                value: profile.email.clone(),
            });
        }

        let profiles = state.profiles.entry(profile.kind()).or_default();
        check_unique(profiles, profile, None)?;
        profiles.push(profile.clone());
        Ok(profile.clone())
    }

    async fn find_one(
        &self,
        kind: PrincipalKind,
        filter: &ProfileFilter,
    ) -> Result<Option<Profile>, ProfileStoreError> {
        let state = self.state.lock();
        Ok(state
            .profiles
            .get(&kind)
            .and_then(|profiles| profiles.iter().find(|p| filter.matches(p)).cloned()))
    }

    async fn update_one(
        &self,
        kind: PrincipalKind,
        filter: &ProfileFilter,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, ProfileStoreError> {
        let mut state = self.state.lock();
        let StoreState { profiles, fail_updates, .. } = &mut *state;
        let Some(profiles) = profiles.get_mut(&kind) else {
            return Ok(None);
        };
        let Some(index) = profiles.iter().position(|p| filter.matches(p)) else {
            return Ok(None);
        };

        if fail_updates.contains(&profiles[index].email) {
            return Err(ProfileStoreError::Unavailable {
                message: format!("update rejected for {}", profiles[index].email),
            });
        }

        let mut updated = profiles[index].clone();
        update.apply(&mut updated, Utc::now());
        check_unique(profiles, &updated, Some(updated.id.as_str()))?;
        profiles[index] = updated.clone();
        Ok(Some(updated))
    }

    async fn delete_one(
        &self,
        kind: PrincipalKind,
        filter: &ProfileFilter,
    ) -> Result<u64, ProfileStoreError> {
        let mut state = self.state.lock();
        let Some(profiles) = state.profiles.get_mut(&kind) else {
            return Ok(0);
        };
        match profiles.iter().position(|p| filter.matches(p)) {
            Some(index) => {
                profiles.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_all(&self, kind: PrincipalKind) -> Result<Vec<Profile>, ProfileStoreError> {
        Ok(self.state.lock().profiles.get(&kind).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::entity::{ProfileDetails, StudentStatus};

    fn student(ext: &str, email: &str, reg: &str) -> Profile {
        Profile::new(
            ext,
            email,
            "S",
            "abcdef",
            ProfileDetails::Student {
                program: "P".to_string(),
                registration_number: reg.to_string(),
                status: StudentStatus::Active,
            },
        )
    }

    #[tokio::test]
    async fn test_unique_email_per_kind() {
        let store = InMemoryProfileStore::new();
        store.insert(&student("e1", "a@x.com", "R1")).await.unwrap();

        let err = store.insert(&student("e2", "a@x.com", "R2")).await.unwrap_err();
        assert!(matches!(err, ProfileStoreError::DuplicateKey { ref field, .. } if field == "email"));

        // Same email under another kind is a different collection.
        let staff = Profile::new("e3", "a@x.com", "A", "abcdef", ProfileDetails::Staff { department: "CS".into() });
        assert!(store.insert(&staff).await.is_ok());
    }

    #[tokio::test]
    async fn test_unique_registration_number() {
        let store = InMemoryProfileStore::new();
        store.insert(&student("e1", "a@x.com", "CS101")).await.unwrap();
        let err = store.insert(&student("e2", "b@x.com", "CS101")).await.unwrap_err();
        assert!(matches!(err, ProfileStoreError::DuplicateKey { ref field, .. } if field == "registrationNumber"));
    }

    #[tokio::test]
    async fn test_update_respects_uniqueness() {
        let store = InMemoryProfileStore::new();
        store.insert(&student("e1", "a@x.com", "R1")).await.unwrap();
        store.insert(&student("e2", "b@x.com", "R2")).await.unwrap();

        let update = ProfileUpdate { email: Some("a@x.com".into()), ..Default::default() };
        let result = store
            .update_one(PrincipalKind::Student, &ProfileFilter::Email("b@x.com".into()), &update)
            .await;
        assert!(matches!(result, Err(ProfileStoreError::DuplicateKey { .. })));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryProfileStore::new();
        store.fail_insert_for("a@x.com");
        assert!(store.insert(&student("e1", "a@x.com", "R1")).await.is_err());
        assert_eq!(store.insert_attempts(), 1);
        assert_eq!(store.count(PrincipalKind::Student), 0);

        store.clear_failures();
        store.reject_insert_as_duplicate("a@x.com");
        let err = store.insert(&student("e1", "a@x.com", "R1")).await.unwrap_err();
        assert!(matches!(err, ProfileStoreError::DuplicateKey { ref field, .. } if field == "email"));

        store.clear_failures();
        store.insert(&student("e1", "a@x.com", "R1")).await.unwrap();
        store.fail_update_for("a@x.com");
        let update = ProfileUpdate { name: Some("New".into()), ..Default::default() };
        assert!(store
            .update_one(PrincipalKind::Student, &ProfileFilter::Email("a@x.com".into()), &update)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_reports_count() {
        let store = InMemoryProfileStore::new();
        let profile = student("e1", "a@x.com", "R1");
        store.insert(&profile).await.unwrap();

        let filter = ProfileFilter::Id(profile.id.clone());
        assert_eq!(store.delete_one(PrincipalKind::Student, &filter).await.unwrap(), 1);
        assert_eq!(store.delete_one(PrincipalKind::Student, &filter).await.unwrap(), 0);
    }
}
