//! Provisioning Errors
//!
//! Categorized error types for provisioning failures. Each category maps to
//! one HTTP status so the API layer can translate errors uniformly:
//!
//! - `Validation` -> 400 Bad Request
//! - `Conflict` -> 409 Conflict
//! - `NotFound` -> 404 Not Found (tagged with the side that was missing)
//! - `Dependency` -> 502 Bad Gateway (tagged with the failing collaborator)
//!
//! ```ignore
//! use eb_platform::{details, ProvisioningError};
//!
//! ProvisioningError::conflict_with_details(
//!     "EMAIL_EXISTS",
//!     "A profile with this email already exists",
//!     details! { "email" => email, "kind" => kind },
//! );
//! ```

use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::IdentityError;
use crate::principal::repository::ProfileStoreError;

/// Macro for creating error detail maps.
///
/// ```ignore
/// let details = details! {
///     "email" => "user@example.com",
///     "kind" => "STUDENT"
/// };
/// ```
#[macro_export]
macro_rules! details {
    () => {
        std::collections::HashMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(
            map.insert($key.to_string(), serde_json::json!($value));
        )+
        map
    }};
}

/// Which record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupSide {
    Profile,
    Identity,
}

/// Which collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    Identity,
    Profile,
}

/// Machine-checkable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Dependency,
}

pub type Details = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProvisioningError {
    /// Malformed input. Always raised before any external call.
    #[error("[{code}] {message}")]
    Validation {
        code: String,
        message: String,
        #[serde(default)]
        details: Details,
    },

    /// Email or registration number already in use on either side.
    #[error("[{code}] {message}")]
    Conflict {
        code: String,
        message: String,
        #[serde(default)]
        details: Details,
    },

    #[error("[{code}] {message}")]
    NotFound {
        side: LookupSide,
        code: String,
        message: String,
        #[serde(default)]
        details: Details,
    },

    /// Identity directory or profile store failed for any other reason.
    #[error("[{code}] {message}")]
    Dependency {
        origin: Origin,
        code: String,
        message: String,
        #[serde(default)]
        details: Details,
    },
}

impl ProvisioningError {
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::validation_with_details(code, message, HashMap::new())
    }

    pub fn validation_with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Details,
    ) -> Self {
        Self::Validation {
            code: code.into(),
            message: message.into(),
            details,
        }
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::conflict_with_details(code, message, HashMap::new())
    }

    pub fn conflict_with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Details,
    ) -> Self {
        Self::Conflict {
            code: code.into(),
            message: message.into(),
            details,
        }
    }

    pub fn profile_not_found(message: impl Into<String>, details: Details) -> Self {
        Self::NotFound {
            side: LookupSide::Profile,
            code: "PROFILE_NOT_FOUND".to_string(),
            message: message.into(),
            details,
        }
    }

    pub fn identity_not_found(message: impl Into<String>, details: Details) -> Self {
        Self::NotFound {
            side: LookupSide::Identity,
            code: "IDENTITY_NOT_FOUND".to_string(),
            message: message.into(),
            details,
        }
    }

    pub fn identity_unavailable(message: impl Into<String>) -> Self {
        Self::Dependency {
            origin: Origin::Identity,
            code: "IDENTITY_DIRECTORY_ERROR".to_string(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn profile_unavailable(message: impl Into<String>) -> Self {
        Self::Dependency {
            origin: Origin::Profile,
            code: "PROFILE_STORE_ERROR".to_string(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Attach one more detail entry, keeping the category and code.
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details_mut().insert(key.into(), value);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Dependency { .. } => ErrorKind::Dependency,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Validation { code, .. }
            | Self::Conflict { code, .. }
            | Self::NotFound { code, .. }
            | Self::Dependency { code, .. } => code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::Conflict { message, .. }
            | Self::NotFound { message, .. }
            | Self::Dependency { message, .. } => message,
        }
    }

    pub fn details(&self) -> &Details {
        match self {
            Self::Validation { details, .. }
            | Self::Conflict { details, .. }
            | Self::NotFound { details, .. }
            | Self::Dependency { details, .. } => details,
        }
    }

    fn details_mut(&mut self) -> &mut Details {
        match self {
            Self::Validation { details, .. }
            | Self::Conflict { details, .. }
            | Self::NotFound { details, .. }
            | Self::Dependency { details, .. } => details,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Conflict { .. } => 409,
            Self::NotFound { .. } => 404,
            Self::Dependency { .. } => 502,
        }
    }
}

impl From<IdentityError> for ProvisioningError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::EmailExists { email } => Self::conflict_with_details(
                "IDENTITY_EXISTS",
                format!("An identity account for '{}' already exists", email),
                details! { "email" => email, "side" => "identity" },
            ),
            IdentityError::WeakSecret { message } => Self::validation_with_details(
                "WEAK_SECRET",
                "Secret was rejected by the identity directory",
                details! { "reason" => message },
            ),
            IdentityError::InvalidEmail { email } => Self::validation_with_details(
                "INVALID_EMAIL_FORMAT",
                "Email was rejected by the identity directory",
                details! { "email" => email },
            ),
            IdentityError::NotFound { external_id } => Self::identity_not_found(
                format!("Identity account '{}' not found", external_id),
                details! { "externalId" => external_id },
            ),
            other => Self::identity_unavailable(other.to_string()),
        }
    }
}

impl From<ProfileStoreError> for ProvisioningError {
    fn from(err: ProfileStoreError) -> Self {
        match err {
            ProfileStoreError::DuplicateKey { field, value } => {
                let code = match field.as_str() {
                    "email" => "EMAIL_EXISTS",
                    "registrationNumber" => "REGISTRATION_NUMBER_EXISTS",
                    _ => "DUPLICATE_KEY",
                };
                Self::conflict_with_details(
                    code,
                    format!("A profile with {} '{}' already exists", field, value),
                    details! { "field" => field, "value" => value, "side" => "profile" },
                )
            }
            ProfileStoreError::Validation { message } => {
                Self::validation("PROFILE_REJECTED", message)
            }
            other => Self::profile_unavailable(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub details: Details,
}

impl IntoResponse for ProvisioningError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = ErrorResponse {
            error: self.kind(),
            code: self.code().to_string(),
            message: self.message().to_string(),
            details: self.details().clone(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = ProvisioningError::validation("EMAIL_REQUIRED", "Email is required");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code(), "EMAIL_REQUIRED");
        assert_eq!(err.message(), "Email is required");
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.to_string(), "[EMAIL_REQUIRED] Email is required");
    }

    #[test]
    fn test_not_found_sides_are_distinct() {
        let profile = ProvisioningError::profile_not_found("gone", details!());
        let identity = ProvisioningError::identity_not_found("gone", details!());
        assert_ne!(profile.code(), identity.code());
        assert!(matches!(profile, ProvisioningError::NotFound { side: LookupSide::Profile, .. }));
        assert!(matches!(identity, ProvisioningError::NotFound { side: LookupSide::Identity, .. }));
    }

    #[test]
    fn test_with_detail_keeps_kind() {
        let err = ProvisioningError::conflict("EMAIL_EXISTS", "taken")
            .with_detail("compensationError", serde_json::json!("directory offline"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            err.details().get("compensationError"),
            Some(&serde_json::json!("directory offline"))
        );
    }

    #[test]
    fn test_identity_error_mapping() {
        let err: ProvisioningError = IdentityError::EmailExists { email: "a@x.com".into() }.into();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err: ProvisioningError = IdentityError::WeakSecret { message: "too short".into() }.into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: ProvisioningError = IdentityError::Provider { message: "503".into() }.into();
        assert!(matches!(err, ProvisioningError::Dependency { origin: Origin::Identity, .. }));
    }

    #[test]
    fn test_profile_store_error_mapping() {
        let err: ProvisioningError = ProfileStoreError::DuplicateKey {
            field: "registrationNumber".into(),
            value: "CS101".into(),
        }
        .into();
        assert_eq!(err.code(), "REGISTRATION_NUMBER_EXISTS");

        let err: ProvisioningError = ProfileStoreError::Unavailable { message: "down".into() }.into();
        assert!(matches!(err, ProvisioningError::Dependency { origin: Origin::Profile, .. }));
        assert_eq!(err.http_status_code(), 502);
    }

    #[test]
    fn test_serialization_is_tagged() {
        let err = ProvisioningError::identity_unavailable("timeout");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "Dependency");
        assert_eq!(json["origin"], "IDENTITY");
    }

    #[test]
    fn test_details_macro_multiple() {
        let details: Details = details! {
            "email" => "user@example.com",
            "count" => 3,
        };
        assert_eq!(details.get("email"), Some(&serde_json::json!("user@example.com")));
        assert_eq!(details.get("count"), Some(&serde_json::json!(3)));
    }
}
