//! Keycloak Directory Adapter
//!
//! Talks to the Keycloak admin REST API of a single realm.
//! Supports:
//! - Client-credentials token acquisition with caching
//! - Account creation with an initial password credential
//! - Lookup by exact email
//! - Profile updates and password resets
//! - Deletion and paginated listing
//!
//! The account display name is written both to `firstName` and to the
//! `displayName` user attribute.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{AccountUpdate, IdentityAccount, IdentityDirectory, IdentityError};

const PAGE_SIZE: usize = 100;
/// Refresh the admin token this long before it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);
const DISPLAY_NAME_ATTRIBUTE: &str = "displayName";

/// Configuration for the Keycloak adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeycloakConfig {
    /// Keycloak server URL (e.g., "https://keycloak.example.com")
    pub server_url: String,
    /// Realm holding the accounts
    pub realm: String,
    /// Service-account client used for admin calls
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl KeycloakConfig {
    pub fn new(server_url: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            realm: realm.into(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_client_credentials(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    pub fn token_url(&self) -> String {
        format!("{}/realms/{}/protocol/openid-connect/token", self.base_url(), self.realm)
    }

    pub fn users_url(&self) -> String {
        format!("{}/admin/realms/{}/users", self.base_url(), self.realm)
    }

    pub fn user_url(&self, external_id: &str) -> String {
        format!("{}/{}", self.users_url(), external_id)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

/// Keycloak `UserRepresentation`, limited to the fields provisioning uses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRepresentation {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes: Option<HashMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    credentials: Option<Vec<CredentialRepresentation>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialRepresentation {
    #[serde(rename = "type")]
    credential_type: String,
    value: String,
    temporary: bool,
}

impl CredentialRepresentation {
    fn password(secret: &str) -> Self {
        Self {
            credential_type: "password".to_string(),
            value: secret.to_string(),
            temporary: false,
        }
    }
}

impl UserRepresentation {
    fn display_name(&self) -> String {
        self.attributes
            .as_ref()
            .and_then(|attrs| attrs.get(DISPLAY_NAME_ATTRIBUTE))
            .and_then(|values| values.first().cloned())
            .or_else(|| self.first_name.clone())
            .unwrap_or_default()
    }

    fn into_account(self) -> Option<IdentityAccount> {
        let display_name = self.display_name();
        Some(IdentityAccount {
            external_id: self.id?,
            email: self.email.or(self.username).unwrap_or_default(),
            display_name,
            disabled: !self.enabled.unwrap_or(true),
        })
    }
}

fn display_name_attributes(display_name: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([(DISPLAY_NAME_ATTRIBUTE.to_string(), vec![display_name.to_string()])])
}

/// Map a 400 response body to the most specific error Keycloak signals.
fn classify_bad_request(email: &str, body: &str) -> IdentityError {
    let lowered = body.to_lowercase();
    if lowered.contains("password") {
        IdentityError::WeakSecret { message: body.to_string() }
    } else if lowered.contains("email") {
        IdentityError::InvalidEmail { email: email.to_string() }
    } else {
        IdentityError::Provider {
            message: format!("Keycloak rejected the request: {}", body),
        }
    }
}

async fn unexpected(action: &str, response: Response) -> IdentityError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    IdentityError::Provider {
        message: format!("Keycloak {} failed with {}: {}", action, status, body),
    }
}

/// Keycloak identity directory
pub struct KeycloakDirectory {
    config: KeycloakConfig,
    http_client: reqwest::Client,
    token: RwLock<Option<CachedToken>>,
}

impl KeycloakDirectory {
    pub fn new(config: KeycloakConfig) -> Result<Self, IdentityError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            http_client,
            token: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &KeycloakConfig {
        &self.config
    }

    /// Admin bearer token, fetched with client credentials and cached until
    /// shortly before expiry.
    async fn access_token(&self) -> Result<String, IdentityError> {
        {
            let cached = self.token.read().await;
            if let Some(ref token) = *cached {
                if token.is_fresh() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut cached = self.token.write().await;
        if let Some(ref token) = *cached {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        debug!(realm = %self.config.realm, "Requesting Keycloak admin token");

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self
            .http_client
            .post(self.config.token_url())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(unexpected("token request", response).await);
        }

        let token: TokenResponse = response.json().await?;
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(access_token)
    }

    async fn fetch_account_id_by_email(&self, email: &str) -> Result<String, IdentityError> {
        self.lookup_by_email(email)
            .await?
            .map(|account| account.external_id)
            .ok_or_else(|| IdentityError::Provider {
                message: format!("Keycloak created {} but the account could not be read back", email),
            })
    }

    async fn reset_password(&self, external_id: &str, secret: &str) -> Result<(), IdentityError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .put(format!("{}/reset-password", self.config.user_url(external_id)))
            .bearer_auth(token)
            .json(&CredentialRepresentation::password(secret))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(IdentityError::NotFound {
                external_id: external_id.to_string(),
            }),
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(IdentityError::WeakSecret { message: body })
            }
            _ => Err(unexpected("password reset", response).await),
        }
    }
}

#[async_trait]
impl IdentityDirectory for KeycloakDirectory {
    fn provider_type(&self) -> &'static str {
        "keycloak"
    }

    async fn create_account(
        &self,
        email: &str,
        secret: &str,
        display_name: &str,
    ) -> Result<IdentityAccount, IdentityError> {
        let token = self.access_token().await?;
        let body = UserRepresentation {
            username: Some(email.to_string()),
            email: Some(email.to_string()),
            first_name: Some(display_name.to_string()),
            enabled: Some(true),
            email_verified: Some(true),
            attributes: Some(display_name_attributes(display_name)),
            credentials: Some(vec![CredentialRepresentation::password(secret)]),
            ..Default::default()
        };

        let response = self
            .http_client
            .post(self.config.users_url())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let external_id = match response.status() {
            StatusCode::CREATED => {
                let from_location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|location| location.rsplit('/').next())
                    .filter(|id| !id.is_empty())
                    .map(str::to_string);
                match from_location {
                    Some(id) => id,
                    None => self.fetch_account_id_by_email(email).await?,
                }
            }
            StatusCode::CONFLICT => {
                return Err(IdentityError::EmailExists { email: email.to_string() });
            }
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_bad_request(email, &body));
            }
            _ => return Err(unexpected("account creation", response).await),
        };

        info!(external_id = %external_id, realm = %self.config.realm, "Created Keycloak account");

        Ok(IdentityAccount {
            external_id,
            email: email.to_string(),
            display_name: display_name.to_string(),
            disabled: false,
        })
    }

    async fn lookup_by_email(&self, email: &str) -> Result<Option<IdentityAccount>, IdentityError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .get(self.config.users_url())
            .bearer_auth(token)
            .query(&[("email", email), ("exact", "true")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(unexpected("account lookup", response).await);
        }

        let users: Vec<UserRepresentation> = response.json().await?;
        Ok(users
            .into_iter()
            .filter(|user| {
                user.email
                    .as_deref()
                    .map(|e| e.eq_ignore_ascii_case(email))
                    .unwrap_or(false)
            })
            .find_map(UserRepresentation::into_account))
    }

    async fn update_account(&self, external_id: &str, update: &AccountUpdate) -> Result<(), IdentityError> {
        let changes_profile = update.email.is_some() || update.display_name.is_some() || update.disabled.is_some();

        if changes_profile {
            let token = self.access_token().await?;
            // The username mirrors the email and must follow it.
            let body = UserRepresentation {
                username: update.email.clone(),
                email: update.email.clone(),
                first_name: update.display_name.clone(),
                attributes: update.display_name.as_deref().map(display_name_attributes),
                enabled: update.disabled.map(|disabled| !disabled),
                ..Default::default()
            };

            let response = self
                .http_client
                .put(self.config.user_url(external_id))
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?;

            match response.status() {
                status if status.is_success() => {}
                StatusCode::NOT_FOUND => {
                    return Err(IdentityError::NotFound {
                        external_id: external_id.to_string(),
                    });
                }
                StatusCode::CONFLICT => {
                    return Err(IdentityError::EmailExists {
                        email: update.email.clone().unwrap_or_default(),
                    });
                }
                StatusCode::BAD_REQUEST => {
                    let body = response.text().await.unwrap_or_default();
                    let email = update.email.as_deref().unwrap_or_default();
                    return Err(classify_bad_request(email, &body));
                }
                _ => return Err(unexpected("account update", response).await),
            }
        }

        if let Some(ref secret) = update.secret {
            self.reset_password(external_id, secret).await?;
        }

        debug!(external_id = %external_id, "Updated Keycloak account");
        Ok(())
    }

    async fn delete_account(&self, external_id: &str) -> Result<(), IdentityError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .delete(self.config.user_url(external_id))
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!(external_id = %external_id, "Deleted Keycloak account");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(IdentityError::NotFound {
                external_id: external_id.to_string(),
            }),
            _ => Err(unexpected("account deletion", response).await),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<IdentityAccount>, IdentityError> {
        let mut accounts = Vec::new();
        let mut first = 0usize;

        loop {
            let token = self.access_token().await?;
            let response = self
                .http_client
                .get(self.config.users_url())
                .bearer_auth(token)
                .query(&[("first", first.to_string()), ("max", PAGE_SIZE.to_string())])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(unexpected("account listing", response).await);
            }

            let page: Vec<UserRepresentation> = response.json().await?;
            let page_len = page.len();
            accounts.extend(page.into_iter().filter_map(|user| {
                let account = user.into_account();
                if account.is_none() {
                    warn!("Skipping Keycloak user without id");
                }
                account
            }));

            if page_len < PAGE_SIZE {
                break;
            }
            first += page_len;
        }

        Ok(accounts)
    }
}
