//! REST client for the external OAuth identity provider.
//!
//! The data plane issues per-user access tokens for a named credential
//! provider; the control plane manages provider lifecycle. Both planes are
//! opaque collaborators: this client shapes requests, parses the JSON
//! surface the service consumes, and wraps failures without retrying.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::types::{AuthFlow, AuthorizationRequest};

const EXCERPT_MAX_CHARS: usize = 240;

#[derive(Debug, Error)]
/// Errors surfaced by identity provider calls.
pub enum IdentityError {
    #[error("identity transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity provider returned status {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("invalid identity response: {0}")]
    InvalidResponse(String),
}

impl IdentityError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of a data-plane credential request.
pub enum CredentialGrant {
    Issued { access_token: String },
    AuthorizationRequired { authorization_url: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// One provider row from the control-plane listing.
pub struct ProviderSummary {
    pub name: String,
    pub credential_provider_arn: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Control-plane creation payload. The client secret itself is never
/// returned in plaintext after creation, only its reference.
pub struct CreatedProvider {
    pub credential_provider_arn: String,
    pub callback_url: String,
    pub client_secret_arn: String,
}

#[async_trait]
/// Data-plane seam consumed by the token resolver.
pub trait IdentityApi: Send + Sync {
    async fn get_credential(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<CredentialGrant, IdentityError>;
}

#[derive(Debug, Clone)]
/// Connection settings for the identity provider.
pub struct IdentityClientConfig {
    pub api_base: String,
    pub workload_name: String,
    pub request_timeout_ms: u64,
}

impl IdentityClientConfig {
    /// Derives the regional endpoint when no override is configured.
    pub fn api_base_for_region(region: &str) -> String {
        format!("https://bedrock-agentcore.{region}.amazonaws.com")
    }
}

#[derive(Debug, Clone)]
/// Reqwest-backed identity provider client.
pub struct IdentityClient {
    http: reqwest::Client,
    api_base: String,
    workload_name: String,
}

impl IdentityClient {
    pub fn new(config: IdentityClientConfig) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            workload_name: config.workload_name,
        })
    }

    fn providers_url(&self) -> String {
        format!("{}/oauth2/credential-providers", self.api_base)
    }

    fn provider_url(&self, name: &str) -> String {
        format!("{}/oauth2/credential-providers/{name}", self.api_base)
    }

    /// Lists registered OAuth credential providers.
    pub async fn list_providers(&self) -> Result<Vec<ProviderSummary>, IdentityError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Listing {
            #[serde(default)]
            credential_providers: Vec<ProviderSummary>,
        }

        let response = self.http.get(self.providers_url()).send().await?;
        let listing: Listing = read_json("list credential providers", response).await?;
        Ok(listing.credential_providers)
    }

    /// Registers a GitHub OAuth credential provider. The returned callback
    /// URL must be registered manually in the GitHub OAuth app settings.
    pub async fn create_provider(
        &self,
        name: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<CreatedProvider, IdentityError> {
        let payload = json!({
            "name": name,
            "credentialProviderVendor": "GithubOauth2",
            "clientId": client_id,
            "clientSecret": client_secret,
        });
        let response = self
            .http
            .post(self.providers_url())
            .json(&payload)
            .send()
            .await?;
        read_json("create credential provider", response).await
    }

    /// Deletes a credential provider by name.
    pub async fn delete_provider(&self, name: &str) -> Result<(), IdentityError> {
        let response = self.http.delete(self.provider_url(name)).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(IdentityError::Status {
            operation: "delete credential provider",
            status: status.as_u16(),
            body: truncate_excerpt(&body),
        })
    }
}

#[async_trait]
impl IdentityApi for IdentityClient {
    async fn get_credential(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<CredentialGrant, IdentityError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct GrantResponse {
            #[serde(default)]
            access_token: Option<String>,
            #[serde(default)]
            requires_authorization: bool,
            #[serde(default)]
            authorization_url: Option<String>,
        }

        let flow = match request.flow {
            AuthFlow::UserFederation => "USER_FEDERATION",
        };
        let payload = json!({
            "scopes": request.scopes,
            "authFlow": flow,
            "workloadName": self.workload_name,
        });
        let response = self
            .http
            .post(format!(
                "{}/access-token",
                self.provider_url(&request.provider_name)
            ))
            .json(&payload)
            .send()
            .await?;
        let grant: GrantResponse = read_json("get credential", response).await?;

        if grant.requires_authorization {
            let authorization_url = grant.authorization_url.ok_or_else(|| {
                IdentityError::InvalidResponse(
                    "authorization required but no authorization URL returned".to_string(),
                )
            })?;
            return Ok(CredentialGrant::AuthorizationRequired { authorization_url });
        }

        match grant.access_token {
            Some(access_token) if !access_token.trim().is_empty() => {
                Ok(CredentialGrant::Issued { access_token })
            }
            _ => Err(IdentityError::InvalidResponse(
                "credential response carried neither a token nor an authorization URL".to_string(),
            )),
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T, IdentityError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(IdentityError::Status {
            operation,
            status: status.as_u16(),
            body: truncate_excerpt(&body),
        });
    }
    serde_json::from_str(&body)
        .map_err(|error| IdentityError::InvalidResponse(format!("{operation}: {error}")))
}

fn truncate_excerpt(body: &str) -> String {
    if body.chars().count() <= EXCERPT_MAX_CHARS {
        return body.to_string();
    }
    let truncated: String = body.chars().take(EXCERPT_MAX_CHARS).collect();
    format!("{truncated}…")
}
