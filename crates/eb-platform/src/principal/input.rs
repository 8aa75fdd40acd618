//! Principal Inputs
//!
//! Request shapes for provisioning, one variant per kind, plus the
//! validation that turns them into normalized values. Nothing here talks to
//! the identity directory or the profile store.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::details;
use crate::principal::entity::{PrincipalKind, ProfileDetails, StudentStatus};
use crate::shared::error::ProvisioningError;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
    })
}

fn registration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap())
}

/// Canonical email form used for every lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Canonical registration number form.
pub fn normalize_registration_number(value: &str) -> String {
    value.trim().to_uppercase()
}

fn require(field: &str, value: &str) -> Result<String, ProvisioningError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProvisioningError::validation_with_details(
            "FIELD_REQUIRED",
            format!("Field '{}' is required", field),
            details! { "field" => field },
        ));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn validate_email(raw: &str) -> Result<String, ProvisioningError> {
    require("email", raw)?;
    let email = normalize_email(raw);
    if !email_pattern().is_match(&email) {
        return Err(ProvisioningError::validation_with_details(
            "INVALID_EMAIL_FORMAT",
            "Invalid email address format",
            details! { "email" => raw },
        ));
    }
    Ok(email)
}

pub(crate) fn validate_secret(secret: &str, min_length: usize) -> Result<(), ProvisioningError> {
    require("secret", secret)?;
    if secret.chars().count() < min_length {
        return Err(ProvisioningError::validation_with_details(
            "SECRET_TOO_SHORT",
            format!("Secret must be at least {} characters", min_length),
            details! { "minLength" => min_length },
        ));
    }
    Ok(())
}

pub(crate) fn validate_registration_number(raw: &str) -> Result<String, ProvisioningError> {
    let value = require("registrationNumber", raw)?;
    if !registration_pattern().is_match(&value) {
        return Err(ProvisioningError::validation_with_details(
            "INVALID_REGISTRATION_NUMBER",
            "Registration number must be alphanumeric",
            details! { "registrationNumber" => raw },
        ));
    }
    Ok(normalize_registration_number(&value))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StaffInput {
    pub name: String,
    pub email: String,
    pub secret: String,
    pub department: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StudentInput {
    pub name: String,
    pub email: String,
    pub secret: String,
    pub program: String,
    pub registration_number: String,
    /// Active or Hold
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserInput {
    pub name: String,
    pub email: String,
    pub secret: String,
}

/// Creation request, discriminated by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalInput {
    #[serde(alias = "staff")]
    Staff(StaffInput),
    #[serde(alias = "student")]
    Student(StudentInput),
    #[serde(alias = "user")]
    User(UserInput),
}

/// A creation request that passed validation, with normalized values.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub name: String,
    pub email: String,
    pub secret: String,
    pub details: ProfileDetails,
}

impl NewPrincipal {
    pub fn kind(&self) -> PrincipalKind {
        self.details.kind()
    }
}

impl PrincipalInput {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Self::Staff(_) => PrincipalKind::Staff,
            Self::Student(_) => PrincipalKind::Student,
            Self::User(_) => PrincipalKind::User,
        }
    }

    /// The email as submitted, in canonical form. Used to label bulk results
    /// even when the input fails validation.
    pub fn normalized_email(&self) -> String {
        let raw = match self {
            Self::Staff(i) => &i.email,
            Self::Student(i) => &i.email,
            Self::User(i) => &i.email,
        };
        normalize_email(raw)
    }

    pub fn validate(&self, min_secret_length: usize) -> Result<NewPrincipal, ProvisioningError> {
        let (name, email, secret) = match self {
            Self::Staff(i) => (&i.name, &i.email, &i.secret),
            Self::Student(i) => (&i.name, &i.email, &i.secret),
            Self::User(i) => (&i.name, &i.email, &i.secret),
        };

        let name = require("name", name)?;
        let email = validate_email(email)?;
        validate_secret(secret, min_secret_length)?;

        let details = match self {
            Self::Staff(i) => ProfileDetails::Staff {
                department: require("department", &i.department)?,
            },
            Self::Student(i) => ProfileDetails::Student {
                program: require("program", &i.program)?,
                registration_number: validate_registration_number(&i.registration_number)?,
                status: StudentStatus::from_str(&require("status", &i.status)?)?,
            },
            Self::User(_) => ProfileDetails::User,
        };

        Ok(NewPrincipal {
            name,
            email,
            secret: secret.clone(),
            details,
        })
    }
}

/// Update request for a principal located by its current email.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrincipalPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Profile-only attributes with no identity-side counterpart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetailsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Validated change to kind-specific attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailsChange {
    pub department: Option<String>,
    pub program: Option<String>,
    pub registration_number: Option<String>,
    pub status: Option<StudentStatus>,
}

impl DetailsChange {
    pub fn is_empty(&self) -> bool {
        self.department.is_none()
            && self.program.is_none()
            && self.registration_number.is_none()
            && self.status.is_none()
    }

    /// Apply to existing details. Fields that do not belong to the kind are rejected.
    pub fn apply(&self, current: &ProfileDetails) -> Result<ProfileDetails, ProvisioningError> {
        let not_applicable = |field: &str| {
            ProvisioningError::validation_with_details(
                "FIELD_NOT_APPLICABLE",
                format!("Field '{}' does not apply to {} principals", field, current.kind()),
                details! { "field" => field, "kind" => current.kind().as_str() },
            )
        };

        match current {
            ProfileDetails::Staff { department } => {
                if self.program.is_some() {
                    return Err(not_applicable("program"));
                }
                if self.registration_number.is_some() {
                    return Err(not_applicable("registrationNumber"));
                }
                if self.status.is_some() {
                    return Err(not_applicable("status"));
                }
                Ok(ProfileDetails::Staff {
                    department: self.department.clone().unwrap_or_else(|| department.clone()),
                })
            }
            ProfileDetails::Student { program, registration_number, status } => {
                if self.department.is_some() {
                    return Err(not_applicable("department"));
                }
                Ok(ProfileDetails::Student {
                    program: self.program.clone().unwrap_or_else(|| program.clone()),
                    registration_number: self
                        .registration_number
                        .clone()
                        .unwrap_or_else(|| registration_number.clone()),
                    status: self.status.unwrap_or(*status),
                })
            }
            ProfileDetails::User => {
                if self.department.is_some() {
                    return Err(not_applicable("department"));
                }
                if self.program.is_some() {
                    return Err(not_applicable("program"));
                }
                if self.registration_number.is_some() {
                    return Err(not_applicable("registrationNumber"));
                }
                if self.status.is_some() {
                    return Err(not_applicable("status"));
                }
                Ok(ProfileDetails::User)
            }
        }
    }
}

/// A validated [`PrincipalPatch`].
#[derive(Debug, Clone, Default)]
pub struct ValidatedPatch {
    pub new_email: Option<String>,
    pub new_secret: Option<String>,
    pub name: Option<String>,
    pub details: DetailsChange,
}

impl ValidatedPatch {
    pub fn is_empty(&self) -> bool {
        self.new_email.is_none()
            && self.new_secret.is_none()
            && self.name.is_none()
            && self.details.is_empty()
    }
}

fn validate_details_fields(
    department: Option<&String>,
    program: Option<&String>,
    registration_number: Option<&String>,
    status: Option<&String>,
) -> Result<DetailsChange, ProvisioningError> {
    Ok(DetailsChange {
        department: department.map(|d| require("department", d)).transpose()?,
        program: program.map(|p| require("program", p)).transpose()?,
        registration_number: registration_number
            .map(|r| validate_registration_number(r))
            .transpose()?,
        status: status.map(|s| StudentStatus::from_str(s)).transpose()?,
    })
}

impl PrincipalPatch {
    pub fn validate(&self, min_secret_length: usize) -> Result<ValidatedPatch, ProvisioningError> {
        let new_email = self.new_email.as_deref().map(validate_email).transpose()?;
        if let Some(ref secret) = self.new_secret {
            validate_secret(secret, min_secret_length)?;
        }
        let name = self.name.as_deref().map(|n| require("name", n)).transpose()?;
        let details = validate_details_fields(
            self.department.as_ref(),
            self.program.as_ref(),
            self.registration_number.as_ref(),
            self.status.as_ref(),
        )?;

        let patch = ValidatedPatch {
            new_email,
            new_secret: self.new_secret.clone(),
            name,
            details,
        };
        if patch.is_empty() {
            return Err(ProvisioningError::validation(
                "NO_UPDATES",
                "At least one field must be provided for update",
            ));
        }
        Ok(patch)
    }
}

impl DetailsPatch {
    pub fn validate(&self) -> Result<DetailsChange, ProvisioningError> {
        let change = validate_details_fields(
            self.department.as_ref(),
            self.program.as_ref(),
            None,
            self.status.as_ref(),
        )?;
        if change.is_empty() {
            return Err(ProvisioningError::validation(
                "NO_UPDATES",
                "At least one field must be provided for update",
            ));
        }
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(reg: &str, status: &str) -> PrincipalInput {
        PrincipalInput::Student(StudentInput {
            name: "Ada".to_string(),
            email: " Ada@Example.COM ".to_string(),
            secret: "abcdef".to_string(),
            program: "BSc CS".to_string(),
            registration_number: reg.to_string(),
            status: status.to_string(),
        })
    }

    #[test]
    fn test_email_pattern() {
        assert!(email_pattern().is_match("user@example.com"));
        assert!(email_pattern().is_match("user.name@example.co.uk"));
        assert!(email_pattern().is_match("user+tag@example.com"));
        assert!(!email_pattern().is_match("invalid"));
        assert!(!email_pattern().is_match("@example.com"));
        assert!(!email_pattern().is_match("user@"));
    }

    #[test]
    fn test_student_normalization() {
        let new = student(" cs101 ", "hold").validate(6).unwrap();
        assert_eq!(new.email, "ada@example.com");
        assert_eq!(new.kind(), PrincipalKind::Student);
        assert_eq!(new.details.registration_number(), Some("CS101"));
        assert!(matches!(new.details, ProfileDetails::Student { status: StudentStatus::Hold, .. }));
    }

    #[test]
    fn test_rejects_bad_registration_number() {
        let err = student("CS-101", "Active").validate(6).unwrap_err();
        assert_eq!(err.code(), "INVALID_REGISTRATION_NUMBER");
    }

    #[test]
    fn test_rejects_bad_status() {
        let err = student("CS101", "Suspended").validate(6).unwrap_err();
        assert_eq!(err.code(), "INVALID_STATUS");
    }

    #[test]
    fn test_rejects_short_secret() {
        let input = PrincipalInput::User(UserInput {
            name: "U".to_string(),
            email: "u@x.com".to_string(),
            secret: "abc".to_string(),
        });
        assert_eq!(input.validate(6).unwrap_err().code(), "SECRET_TOO_SHORT");
    }

    #[test]
    fn test_missing_field_reports_field_name() {
        let input = PrincipalInput::Staff(StaffInput {
            name: "A".to_string(),
            email: "a@x.com".to_string(),
            secret: "abcdef".to_string(),
            department: "   ".to_string(),
        });
        let err = input.validate(6).unwrap_err();
        assert_eq!(err.code(), "FIELD_REQUIRED");
        assert_eq!(err.details().get("field"), Some(&serde_json::json!("department")));
    }

    #[test]
    fn test_input_deserializes_with_lowercase_kind_and_missing_fields() {
        let input: PrincipalInput = serde_json::from_value(serde_json::json!({
            "kind": "staff",
            "name": "A",
            "email": "A@X.com"
        }))
        .unwrap();
        assert_eq!(input.kind(), PrincipalKind::Staff);
        assert_eq!(input.normalized_email(), "a@x.com");
        assert_eq!(input.validate(6).unwrap_err().code(), "FIELD_REQUIRED");
    }

    #[test]
    fn test_empty_patch_rejected() {
        let err = PrincipalPatch::default().validate(6).unwrap_err();
        assert_eq!(err.code(), "NO_UPDATES");
    }

    #[test]
    fn test_patch_normalizes_new_email() {
        let patch = PrincipalPatch {
            new_email: Some(" B@X.com".to_string()),
            ..Default::default()
        };
        assert_eq!(patch.validate(6).unwrap().new_email.as_deref(), Some("b@x.com"));
    }

    #[test]
    fn test_details_change_rejects_foreign_fields() {
        let change = DetailsChange {
            department: Some("Math".to_string()),
            ..Default::default()
        };
        let current = ProfileDetails::Student {
            program: "P".to_string(),
            registration_number: "R1".to_string(),
            status: StudentStatus::Active,
        };
        assert_eq!(change.apply(&current).unwrap_err().code(), "FIELD_NOT_APPLICABLE");

        let staff = ProfileDetails::Staff { department: "CS".to_string() };
        assert_eq!(
            change.apply(&staff).unwrap(),
            ProfileDetails::Staff { department: "Math".to_string() }
        );
    }
}
