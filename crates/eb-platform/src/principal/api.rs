//! Principals API
//!
//! Thin HTTP surface over the provisioning service. Every handler parses the
//! path kind, delegates, and lets [`ProvisioningError`] pick the status code.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::details;
use crate::principal::entity::{PrincipalKind, Profile, ProfileDetails};
use crate::principal::input::{DetailsPatch, PrincipalInput, PrincipalPatch};
use crate::principal::operations::{
    BulkProvisioner, BulkReport, BulkSummary, ConsistencyChecker, ConsistencyReport, DeleteReport,
    ProfileKey, ProvisioningService,
};
use crate::shared::error::ProvisioningError;

/// Profile as returned over HTTP; the secret never leaves the service.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: String,
    pub external_id: String,
    pub email: String,
    pub name: String,
    #[serde(flatten)]
    pub details: ProfileDetails,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Profile> for ProfileView {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            external_id: p.external_id,
            email: p.email,
            name: p.name,
            details: p.details,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub summary: BulkSummary,
    #[serde(flatten)]
    pub report: BulkReport,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    /// `id`, `externalId` or `email`; defaults to `id`
    pub by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub identity_provider: &'static str,
}

/// Provisioning service state
#[derive(Clone)]
pub struct ProvisioningState {
    pub service: Arc<ProvisioningService>,
    pub bulk: Arc<BulkProvisioner>,
    pub consistency: Arc<ConsistencyChecker>,
}

impl ProvisioningState {
    pub fn new(service: Arc<ProvisioningService>, max_batch_size: usize) -> Self {
        let bulk = Arc::new(BulkProvisioner::new(service.clone(), max_batch_size));
        let consistency = Arc::new(ConsistencyChecker::new(
            service.identity().clone(),
            service.profiles().clone(),
        ));
        Self {
            service,
            bulk,
            consistency,
        }
    }
}

fn invalid_body(error: serde_json::Error) -> ProvisioningError {
    ProvisioningError::validation_with_details(
        "INVALID_BODY",
        format!("Request body could not be read: {}", error),
        details! { "reason" => error.to_string() },
    )
}

/// Parse a creation body for `kind`. The body's own `kind` may be omitted;
/// when present it must agree with the path.
fn input_for(kind: PrincipalKind, mut body: Value) -> Result<PrincipalInput, ProvisioningError> {
    if let Value::Object(ref mut map) = body {
        map.entry("kind").or_insert_with(|| Value::from(kind.as_str()));
    }
    let input: PrincipalInput = serde_json::from_value(body).map_err(invalid_body)?;
    if input.kind() != kind {
        return Err(ProvisioningError::validation_with_details(
            "KIND_MISMATCH",
            format!("Expected a {} principal, got {}", kind, input.kind()),
            details! { "expected" => kind.as_str(), "actual" => input.kind().as_str() },
        ));
    }
    Ok(input)
}

/// Create one principal
pub async fn create_principal(
    State(state): State<ProvisioningState>,
    Path(kind): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ProfileView>), ProvisioningError> {
    let kind = PrincipalKind::from_str(&kind)?;
    let input = input_for(kind, body)?;
    let profile = state.service.create(&input).await?;
    Ok((StatusCode::CREATED, Json(profile.into())))
}

/// Create many principals of one kind
pub async fn create_principals(
    State(state): State<ProvisioningState>,
    Path(kind): Path<String>,
    Json(body): Json<Vec<Value>>,
) -> Result<Json<BulkResponse>, ProvisioningError> {
    let kind = PrincipalKind::from_str(&kind)?;
    // Untagged items take the path kind; mismatched ones fail per item.
    let inputs = body
        .into_iter()
        .map(|mut item| {
            if let Value::Object(ref mut map) = item {
                map.entry("kind").or_insert_with(|| Value::from(kind.as_str()));
            }
            serde_json::from_value::<PrincipalInput>(item).map_err(invalid_body)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let report = state.bulk.create_many(kind, inputs).await?;
    Ok(Json(BulkResponse {
        summary: report.summary(),
        report,
    }))
}

/// Update identity and profile of the principal with this email
pub async fn update_principal(
    State(state): State<ProvisioningState>,
    Path((kind, email)): Path<(String, String)>,
    Json(patch): Json<PrincipalPatch>,
) -> Result<Json<ProfileView>, ProvisioningError> {
    let kind = PrincipalKind::from_str(&kind)?;
    let profile = state.service.update(kind, &email, &patch).await?;
    Ok(Json(profile.into()))
}

/// Update profile-only attributes
pub async fn update_principal_details(
    State(state): State<ProvisioningState>,
    Path((kind, email)): Path<(String, String)>,
    Json(patch): Json<DetailsPatch>,
) -> Result<Json<ProfileView>, ProvisioningError> {
    let kind = PrincipalKind::from_str(&kind)?;
    let profile = state.service.update_details(kind, &email, &patch).await?;
    Ok(Json(profile.into()))
}

pub async fn delete_principal(
    State(state): State<ProvisioningState>,
    Path((kind, key)): Path<(String, String)>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteReport>, ProvisioningError> {
    let kind = PrincipalKind::from_str(&kind)?;
    let key = ProfileKey::parse(query.by.as_deref().unwrap_or("id"), &key)?;
    let report = state.service.delete(kind, &key).await?;
    Ok(Json(report))
}

/// Drift report across every kind
pub async fn consistency_report(
    State(state): State<ProvisioningState>,
) -> Result<Json<ConsistencyReport>, ProvisioningError> {
    Ok(Json(state.consistency.check_all().await?))
}

pub async fn health(State(state): State<ProvisioningState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP",
        identity_provider: state.service.identity().provider_type(),
    })
}

/// Routes relative to the mount point, e.g. `/api/principals`.
pub fn principals_router(state: ProvisioningState) -> Router {
    Router::new()
        .route("/consistency", get(consistency_report))
        .route("/health", get(health))
        .route("/{kind}", post(create_principal))
        .route("/{kind}/bulk", post(create_principals))
        .route("/{kind}/{key}", put(update_principal).delete(delete_principal))
        .route("/{kind}/{key}/details", patch(update_principal_details))
        .with_state(state)
}
