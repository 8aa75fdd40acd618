//! Profile Store
//!
//! Data access for profile documents, one collection per principal kind.
//! Uniqueness of `email` (per kind), `externalId` and student
//! `registrationNumber` is enforced by unique indexes, see
//! [`crate::shared::indexes`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    error::{ErrorKind, WriteFailure},
    options::ReturnDocument,
    Collection, Database,
};
use thiserror::Error;
use tracing::debug;

use crate::principal::entity::{PrincipalKind, Profile, ProfileDetails};

/// MongoDB duplicate key server error code
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB `DocumentValidationFailure` server error code
const DOCUMENT_VALIDATION_CODE: i32 = 121;

#[derive(Error, Debug)]
pub enum ProfileStoreError {
    #[error("Duplicate profile: {field}={value}")]
    DuplicateKey { field: String, value: String },

    #[error("Profile rejected: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bson::ser::Error),

    #[error("Profile store unavailable: {message}")]
    Unavailable { message: String },
}

/// Single-field profile lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileFilter {
    Id(String),
    ExternalId(String),
    Email(String),
    RegistrationNumber(String),
}

impl ProfileFilter {
    pub fn to_document(&self) -> Document {
        match self {
            Self::Id(id) => doc! { "_id": id },
            Self::ExternalId(id) => doc! { "externalId": id },
            Self::Email(email) => doc! { "email": email },
            Self::RegistrationNumber(reg) => doc! { "details.registrationNumber": reg },
        }
    }

    pub fn matches(&self, profile: &Profile) -> bool {
        match self {
            Self::Id(id) => &profile.id == id,
            Self::ExternalId(id) => &profile.external_id == id,
            Self::Email(email) => &profile.email == email,
            Self::RegistrationNumber(reg) => profile.registration_number() == Some(reg.as_str()),
        }
    }
}

/// Partial update applied atomically to one profile document.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub secret: Option<String>,
    pub details: Option<ProfileDetails>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.name.is_none() && self.secret.is_none() && self.details.is_none()
    }

    pub fn apply(&self, profile: &mut Profile, now: DateTime<Utc>) {
        if let Some(ref email) = self.email {
            profile.email = email.clone();
        }
        if let Some(ref name) = self.name {
            profile.name = name.clone();
        }
        if let Some(ref secret) = self.secret {
            profile.secret = secret.clone();
        }
        if let Some(ref details) = self.details {
            profile.details = details.clone();
        }
        profile.updated_at = now;
    }

    fn to_set_document(&self, now: DateTime<Utc>) -> Result<Document, ProfileStoreError> {
        let mut set = doc! { "updatedAt": bson::DateTime::from_chrono(now) };
        if let Some(ref email) = self.email {
            set.insert("email", email);
        }
        if let Some(ref name) = self.name {
            set.insert("name", name);
        }
        if let Some(ref secret) = self.secret {
            set.insert("secret", secret);
        }
        if let Some(ref details) = self.details {
            set.insert("details", bson::to_bson(details)?);
        }
        Ok(doc! { "$set": set })
    }
}

/// Profile store contract, parameterized by principal kind.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn insert(&self, profile: &Profile) -> Result<Profile, ProfileStoreError>;

    async fn find_one(
        &self,
        kind: PrincipalKind,
        filter: &ProfileFilter,
    ) -> Result<Option<Profile>, ProfileStoreError>;

    /// Returns the updated document, or `None` when nothing matched.
    async fn update_one(
        &self,
        kind: PrincipalKind,
        filter: &ProfileFilter,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, ProfileStoreError>;

    /// Returns the number of deleted documents.
    async fn delete_one(
        &self,
        kind: PrincipalKind,
        filter: &ProfileFilter,
    ) -> Result<u64, ProfileStoreError>;

    async fn find_all(&self, kind: PrincipalKind) -> Result<Vec<Profile>, ProfileStoreError>;
}

/// MongoDB profile repository
pub struct MongoProfileRepository {
    staff: Collection<Profile>,
    students: Collection<Profile>,
    users: Collection<Profile>,
}

impl MongoProfileRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            staff: db.collection(PrincipalKind::Staff.collection_name()),
            students: db.collection(PrincipalKind::Student.collection_name()),
            users: db.collection(PrincipalKind::User.collection_name()),
        }
    }

    fn collection(&self, kind: PrincipalKind) -> &Collection<Profile> {
        match kind {
            PrincipalKind::Staff => &self.staff,
            PrincipalKind::Student => &self.students,
            PrincipalKind::User => &self.users,
        }
    }
}

/// Translate a server duplicate-key failure into [`ProfileStoreError::DuplicateKey`].
fn map_write_error(err: mongodb::error::Error, profile_hint: Option<&Profile>) -> ProfileStoreError {
    let server_error = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => Some((we.code, we.message.clone())),
        ErrorKind::Command(ce) => Some((ce.code, ce.message.clone())),
        _ => None,
    };

    server_error
        .and_then(|(code, message)| classify_server_error(code, &message, profile_hint))
        .unwrap_or(ProfileStoreError::Database(err))
}

/// Map server error codes the store reports on its own; `None` keeps the raw error.
fn classify_server_error(code: i32, message: &str, profile_hint: Option<&Profile>) -> Option<ProfileStoreError> {
    match code {
        DUPLICATE_KEY_CODE => {
            let field = duplicate_field(message);
            let value = profile_hint
                .map(|p| match field.as_str() {
                    "registrationNumber" => p.registration_number().unwrap_or_default().to_string(),
                    "externalId" => p.external_id.clone(),
                    "_id" => p.id.clone(),
                    _ => p.email.clone(),
                })
                .unwrap_or_default();
            Some(ProfileStoreError::DuplicateKey { field, value })
        }
        DOCUMENT_VALIDATION_CODE => Some(ProfileStoreError::Validation {
            message: message.to_string(),
        }),
        _ => None,
    }
}

/// Extract the field name from an `E11000 ... index: details.registrationNumber_1 dup key` message.
fn duplicate_field(message: &str) -> String {
    let index = message
        .split("index: ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("");

    let field = index.strip_suffix("_1").unwrap_or(index);
    let field = field.rsplit('.').next().unwrap_or(field);
    if field.is_empty() {
        "email".to_string()
    } else {
        field.to_string()
    }
}

#[async_trait]
impl ProfileStore for MongoProfileRepository {
    async fn insert(&self, profile: &Profile) -> Result<Profile, ProfileStoreError> {
        self.collection(profile.kind())
            .insert_one(profile)
            .await
            .map_err(|e| map_write_error(e, Some(profile)))?;
        debug!(kind = %profile.kind(), id = %profile.id, "Inserted profile");
        Ok(profile.clone())
    }

    async fn find_one(
        &self,
        kind: PrincipalKind,
        filter: &ProfileFilter,
    ) -> Result<Option<Profile>, ProfileStoreError> {
        Ok(self.collection(kind).find_one(filter.to_document()).await?)
    }

    async fn update_one(
        &self,
        kind: PrincipalKind,
        filter: &ProfileFilter,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, ProfileStoreError> {
        let set = update.to_set_document(Utc::now())?;
        let updated = self
            .collection(kind)
            .find_one_and_update(filter.to_document(), set)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| map_write_error(e, None))?;
        Ok(updated)
    }

    async fn delete_one(
        &self,
        kind: PrincipalKind,
        filter: &ProfileFilter,
    ) -> Result<u64, ProfileStoreError> {
        let result = self.collection(kind).delete_one(filter.to_document()).await?;
        Ok(result.deleted_count)
    }

    async fn find_all(&self, kind: PrincipalKind) -> Result<Vec<Profile>, ProfileStoreError> {
        let cursor = self.collection(kind).find(doc! {}).await?;
        Ok(cursor.try_collect().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_field_parsing() {
        let msg = "E11000 duplicate key error collection: exambase.students index: details.registrationNumber_1 dup key: { details.registrationNumber: \"CS101\" }";
        assert_eq!(duplicate_field(msg), "registrationNumber");

        let msg = "E11000 duplicate key error collection: exambase.staff index: email_1 dup key: { email: \"a@x.com\" }";
        assert_eq!(duplicate_field(msg), "email");

        assert_eq!(duplicate_field("E11000 duplicate key error"), "email");
    }

    #[test]
    fn test_classify_server_error() {
        let profile = Profile::new("e1", "a@x.com", "A", "abcdef", ProfileDetails::Staff { department: "CS".into() });

        let dup = classify_server_error(
            DUPLICATE_KEY_CODE,
            "E11000 duplicate key error collection: exambase.staff index: externalId_1 dup key",
            Some(&profile),
        );
        assert!(matches!(
            dup,
            Some(ProfileStoreError::DuplicateKey { ref field, ref value }) if field == "externalId" && value == "e1"
        ));

        let invalid = classify_server_error(DOCUMENT_VALIDATION_CODE, "Document failed validation", None);
        assert!(matches!(invalid, Some(ProfileStoreError::Validation { .. })));

        assert!(classify_server_error(50, "operation exceeded time limit", None).is_none());
    }

    #[test]
    fn test_filter_documents() {
        assert_eq!(ProfileFilter::Id("abc".into()).to_document(), doc! { "_id": "abc" });
        assert_eq!(
            ProfileFilter::RegistrationNumber("CS101".into()).to_document(),
            doc! { "details.registrationNumber": "CS101" }
        );
    }

    #[test]
    fn test_update_set_document() {
        let update = ProfileUpdate {
            email: Some("b@x.com".to_string()),
            details: Some(ProfileDetails::Staff { department: "Math".to_string() }),
            ..Default::default()
        };
        let set = update.to_set_document(Utc::now()).unwrap();
        let fields = set.get_document("$set").unwrap();
        assert_eq!(fields.get_str("email").unwrap(), "b@x.com");
        assert!(fields.get_datetime("updatedAt").is_ok());
        assert_eq!(fields.get_document("details").unwrap().get_str("kind").unwrap(), "STAFF");
        assert!(!fields.contains_key("name"));
    }
}
