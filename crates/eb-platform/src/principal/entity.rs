//! Principal Entities
//!
//! A principal is a person who can authenticate: staff, student or generic
//! user. Every principal is a pair of records, an identity account in the
//! identity directory and a profile document in the kind's profile
//! collection, joined by `externalId`.

use std::fmt;
use std::str::FromStr;

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::details;
use crate::shared::error::ProvisioningError;

/// Principal kind; selects the profile collection and the kind-specific attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalKind {
    Staff,
    Student,
    User,
}

impl PrincipalKind {
    pub const ALL: [PrincipalKind; 3] = [Self::Staff, Self::Student, Self::User];

    /// Profile store collection holding this kind.
    pub fn collection_name(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Student => "students",
            Self::User => "users",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "STAFF",
            Self::Student => "STUDENT",
            Self::User => "USER",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalKind {
    type Err = ProvisioningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staff" => Ok(Self::Staff),
            "student" | "students" => Ok(Self::Student),
            "user" | "users" => Ok(Self::User),
            _ => Err(ProvisioningError::validation_with_details(
                "INVALID_KIND",
                format!("Unknown principal kind: {}", s),
                details! { "kind" => s },
            )),
        }
    }
}

/// Student enrolment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudentStatus {
    Active,
    Hold,
}

impl FromStr for StudentStatus {
    type Err = ProvisioningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "hold" => Ok(Self::Hold),
            _ => Err(ProvisioningError::validation_with_details(
                "INVALID_STATUS",
                "Status must be one of: Active, Hold",
                details! { "status" => s },
            )),
        }
    }
}

/// Kind-specific profile attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileDetails {
    Staff {
        department: String,
    },
    Student {
        program: String,
        #[serde(rename = "registrationNumber")]
        registration_number: String,
        status: StudentStatus,
    },
    User,
}

impl ProfileDetails {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Self::Staff { .. } => PrincipalKind::Staff,
            Self::Student { .. } => PrincipalKind::Student,
            Self::User => PrincipalKind::User,
        }
    }

    pub fn registration_number(&self) -> Option<&str> {
        match self {
            Self::Student { registration_number, .. } => Some(registration_number),
            _ => None,
        }
    }
}

/// Profile document stored in the kind's collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Profile store id (ObjectId hex)
    #[serde(rename = "_id")]
    pub id: String,

    /// Identity directory key; immutable once assigned
    pub external_id: String,

    /// Canonical (trimmed, lower-case) email
    pub email: String,

    pub name: String,

    /// Plaintext credential kept for exports only. Never used to authenticate.
    pub secret: String,

    pub details: ProfileDetails,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(
        external_id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        secret: impl Into<String>,
        details: ProfileDetails,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: bson::oid::ObjectId::new().to_hex(),
            external_id: external_id.into(),
            email: email.into(),
            name: name.into(),
            secret: secret.into(),
            details,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> PrincipalKind {
        self.details.kind()
    }

    pub fn registration_number(&self) -> Option<&str> {
        self.details.registration_number()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("staff".parse::<PrincipalKind>().unwrap(), PrincipalKind::Staff);
        assert_eq!("STUDENT".parse::<PrincipalKind>().unwrap(), PrincipalKind::Student);
        assert_eq!("users".parse::<PrincipalKind>().unwrap(), PrincipalKind::User);
        assert_eq!("robot".parse::<PrincipalKind>().unwrap_err().code(), "INVALID_KIND");
    }

    #[test]
    fn test_collection_names_are_distinct() {
        let names: std::collections::HashSet<_> =
            PrincipalKind::ALL.iter().map(|k| k.collection_name()).collect();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Active".parse::<StudentStatus>().unwrap(), StudentStatus::Active);
        assert_eq!(" hold ".parse::<StudentStatus>().unwrap(), StudentStatus::Hold);
        assert_eq!("Graduated".parse::<StudentStatus>().unwrap_err().code(), "INVALID_STATUS");
    }

    #[test]
    fn test_student_details_serialization() {
        let details = ProfileDetails::Student {
            program: "BSc CS".to_string(),
            registration_number: "CS101".to_string(),
            status: StudentStatus::Hold,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["kind"], "STUDENT");
        assert_eq!(json["registrationNumber"], "CS101");
        assert_eq!(json["status"], "Hold");
    }

    #[test]
    fn test_profile_bson_round_trip() {
        let profile = Profile::new(
            "ext-1",
            "a@x.com",
            "A",
            "abcdef",
            ProfileDetails::Staff { department: "CS".to_string() },
        );
        let doc = bson::to_document(&profile).unwrap();
        assert_eq!(doc.get_str("_id").unwrap(), profile.id);
        assert_eq!(doc.get_str("externalId").unwrap(), "ext-1");
        assert!(doc.get_datetime("createdAt").is_ok());

        let back: Profile = bson::from_document(doc).unwrap();
        assert_eq!(back.kind(), PrincipalKind::Staff);
        assert_eq!(back.email, "a@x.com");
    }
}
