//! Credential data model and error taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity_client::IdentityError;

/// Bearer secret with redacted formatting. Plaintext is only reachable
/// through explicit [`BearerToken::expose`] call sites.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(Self(secret))
    }

    /// Returns plaintext secret bytes for explicit use sites.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Where a credential came from.
pub enum CredentialOrigin {
    Static,
    OAuth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A resolved bearer credential and its origin tag. Never mutated after
/// creation; discarded only on process exit.
pub struct Credential {
    pub token: BearerToken,
    pub origin: CredentialOrigin,
}

impl Credential {
    pub fn statically_configured(token: BearerToken) -> Self {
        Self {
            token,
            origin: CredentialOrigin::Static,
        }
    }

    pub fn oauth(token: BearerToken) -> Self {
        Self {
            token,
            origin: CredentialOrigin::OAuth,
        }
    }

    pub fn bearer(&self) -> &str {
        self.token.expose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// OAuth flow kind. Only the on-behalf-of-user flow exists today.
pub enum AuthFlow {
    #[serde(rename = "USER_FEDERATION")]
    UserFederation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Identifies the capability being requested from the identity provider.
pub struct AuthorizationRequest {
    pub provider_name: String,
    pub scopes: Vec<String>,
    pub flow: AuthFlow,
}

impl AuthorizationRequest {
    pub fn user_federation(provider_name: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            scopes,
            flow: AuthFlow::UserFederation,
        }
    }
}

#[derive(Debug, Error)]
/// Errors surfaced by credential resolution.
pub enum AuthError {
    #[error(
        "no GitHub credential available. Set the static GitHub token in the \
         environment or complete the OAuth authorization flow"
    )]
    MissingCredentials,
    #[error("user authorization required: {authorization_url}")]
    AuthorizationPending { authorization_url: String },
    #[error("bearer token must not be empty")]
    EmptyToken,
    #[error("invalid credential material: {0}")]
    InvalidCredential(String),
    #[error("authentication failed: {0}")]
    Identity(#[from] IdentityError),
}
