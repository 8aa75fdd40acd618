//! KeycloakDirectory Tests
//!
//! Tests for:
//! - Admin token acquisition and caching
//! - Account creation and status mapping
//! - Lookup by email
//! - Update with password reset
//! - Deletion and not-found handling
//! - Paginated listing

use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use eb_platform::{AccountUpdate, IdentityDirectory, IdentityError, KeycloakConfig, KeycloakDirectory};

const USERS: &str = "/admin/realms/exambase/users";

async fn setup() -> (MockServer, KeycloakDirectory) {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/realms/exambase/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "admin-token",
            "expires_in": 300,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let directory = KeycloakDirectory::new(
        KeycloakConfig::new(server.uri(), "exambase").with_client_credentials("exambase-admin", "s3cret"),
    )
    .unwrap();
    (server, directory)
}

#[tokio::test]
async fn test_create_reads_id_from_location() {
    let (server, directory) = setup().await;

    Mock::given(method("POST"))
        .and(path(USERS))
        .and(header("authorization", "Bearer admin-token"))
        .and(body_partial_json(serde_json::json!({
            "email": "ann@x.com",
            "username": "ann@x.com",
            "firstName": "Ann",
            "enabled": true,
            "credentials": [{ "type": "password", "value": "abcdef", "temporary": false }]
        })))
        .respond_with(
            ResponseTemplate::new(201).insert_header("Location", format!("{}{}/kc-123", server.uri(), USERS)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let account = directory.create_account("ann@x.com", "abcdef", "Ann").await.unwrap();

    assert_eq!(account.external_id, "kc-123");
    assert_eq!(account.email, "ann@x.com");
}

#[tokio::test]
async fn test_token_is_cached_between_calls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/realms/exambase/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "admin-token",
            "expires_in": 300
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(USERS))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let directory = KeycloakDirectory::new(
        KeycloakConfig::new(server.uri(), "exambase").with_client_credentials("exambase-admin", "s3cret"),
    )
    .unwrap();

    assert!(directory.lookup_by_email("a@x.com").await.unwrap().is_none());
    assert!(directory.lookup_by_email("b@x.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_conflict_maps_to_email_exists() {
    let (server, directory) = setup().await;

    Mock::given(method("POST"))
        .and(path(USERS))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(serde_json::json!({ "errorMessage": "User exists with same email" })),
        )
        .mount(&server)
        .await;

    let err = directory.create_account("ann@x.com", "abcdef", "Ann").await.unwrap_err();
    assert!(matches!(err, IdentityError::EmailExists { .. }));
}

#[tokio::test]
async fn test_create_password_policy_maps_to_weak_secret() {
    let (server, directory) = setup().await;

    Mock::given(method("POST"))
        .and(path(USERS))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalidPasswordMinLengthMessage",
            "error_description": "Invalid password: minimum length 8."
        })))
        .mount(&server)
        .await;

    let err = directory.create_account("ann@x.com", "abc", "Ann").await.unwrap_err();
    assert!(matches!(err, IdentityError::WeakSecret { .. }));
}

#[tokio::test]
async fn test_server_error_is_provider_error() {
    let (server, directory) = setup().await;

    Mock::given(method("POST"))
        .and(path(USERS))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = directory.create_account("ann@x.com", "abcdef", "Ann").await.unwrap_err();
    assert!(matches!(err, IdentityError::Provider { .. }));
}

#[tokio::test]
async fn test_lookup_by_email_exact() {
    let (server, directory) = setup().await;

    Mock::given(method("GET"))
        .and(path(USERS))
        .and(query_param("email", "ann@x.com"))
        .and(query_param("exact", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
            "id": "kc-1",
            "username": "ann@x.com",
            "email": "ann@x.com",
            "firstName": "Ann",
            "enabled": true,
            "attributes": { "displayName": ["Ann Smith"] }
        }])))
        .mount(&server)
        .await;

    let account = directory.lookup_by_email("ann@x.com").await.unwrap().unwrap();
    assert_eq!(account.external_id, "kc-1");
    assert_eq!(account.display_name, "Ann Smith");
}

#[tokio::test]
async fn test_update_with_password_reset() {
    let (server, directory) = setup().await;

    Mock::given(method("PUT"))
        .and(path(format!("{}/kc-1", USERS)))
        .and(body_partial_json(serde_json::json!({ "email": "new@x.com", "username": "new@x.com" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(format!("{}/kc-1/reset-password", USERS)))
        .and(body_partial_json(serde_json::json!({ "type": "password", "value": "ghijkl" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let update = AccountUpdate {
        email: Some("new@x.com".into()),
        secret: Some("ghijkl".into()),
        ..Default::default()
    };
    directory.update_account("kc-1", &update).await.unwrap();
}

#[tokio::test]
async fn test_secret_only_update_skips_profile_put() {
    let (server, directory) = setup().await;

    Mock::given(method("PUT"))
        .and(path(format!("{}/kc-1", USERS)))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(format!("{}/kc-1/reset-password", USERS)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let update = AccountUpdate {
        secret: Some("ghijkl".into()),
        ..Default::default()
    };
    directory.update_account("kc-1", &update).await.unwrap();
}

#[tokio::test]
async fn test_update_email_conflict() {
    let (server, directory) = setup().await;

    Mock::given(method("PUT"))
        .and(path(format!("{}/kc-1", USERS)))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let update = AccountUpdate {
        email: Some("taken@x.com".into()),
        ..Default::default()
    };
    let err = directory.update_account("kc-1", &update).await.unwrap_err();
    assert!(matches!(err, IdentityError::EmailExists { ref email } if email == "taken@x.com"));
}

#[tokio::test]
async fn test_delete_not_found() {
    let (server, directory) = setup().await;

    Mock::given(method("DELETE"))
        .and(path(format!("{}/kc-gone", USERS)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(format!("{}/kc-1", USERS)))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    directory.delete_account("kc-1").await.unwrap();
    let err = directory.delete_account("kc-gone").await.unwrap_err();
    assert!(matches!(err, IdentityError::NotFound { .. }));
}

#[tokio::test]
async fn test_list_accounts_paginates() {
    let (server, directory) = setup().await;

    let first_page: Vec<serde_json::Value> = (0..100)
        .map(|i| serde_json::json!({ "id": format!("kc-{}", i), "email": format!("u{}@x.com", i) }))
        .collect();

    Mock::given(method("GET"))
        .and(path(USERS))
        .and(query_param("first", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::Value::Array(first_page)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(USERS))
        .and(query_param("first", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": "kc-100", "email": "u100@x.com" }
        ])))
        .mount(&server)
        .await;

    let accounts = directory.list_accounts().await.unwrap();
    assert_eq!(accounts.len(), 101);
    assert_eq!(accounts[100].external_id, "kc-100");
}
