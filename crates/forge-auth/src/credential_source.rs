//! Credential sources: static configuration and the OAuth token resolver.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::identity_client::{CredentialGrant, IdentityApi};
use crate::types::{AuthError, AuthorizationRequest, BearerToken, Credential};

/// One-shot callback that surfaces an authorization URL to a waiting user.
pub type OAuthUrlNotifier = Arc<dyn Fn(&str) + Send + Sync>;

#[async_trait]
/// Trait contract for credential sources.
pub trait CredentialSource: Send + Sync {
    async fn get_token(&self) -> Result<Credential, AuthError>;
    fn is_authenticated(&self) -> bool;
}

/// Credential source backed by a token injected at startup. Never contacts
/// the identity provider and never blocks on user interaction.
pub struct StaticCredentialSource {
    credential: Credential,
}

impl StaticCredentialSource {
    pub fn new(token: BearerToken) -> Self {
        Self {
            credential: Credential::statically_configured(token),
        }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn get_token(&self) -> Result<Credential, AuthError> {
        Ok(self.credential.clone())
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct OAuthState {
    token: Option<BearerToken>,
    pending_authorization_url: Option<String>,
}

/// Credential source backed by the identity provider's three-legged flow.
///
/// The issued token is cached for the lifetime of the process; no expiry or
/// freshness check is performed. Initiation is serialized behind an async
/// mutex so racing callers produce one provider call and one notifier
/// invocation per authorization cycle.
pub struct OAuthCredentialSource {
    identity: Arc<dyn IdentityApi>,
    request: AuthorizationRequest,
    notifier: Option<OAuthUrlNotifier>,
    flight: tokio::sync::Mutex<()>,
    state: Mutex<OAuthState>,
}

impl OAuthCredentialSource {
    pub fn new(identity: Arc<dyn IdentityApi>, request: AuthorizationRequest) -> Self {
        Self {
            identity,
            request,
            notifier: None,
            flight: tokio::sync::Mutex::new(()),
            state: Mutex::new(OAuthState::default()),
        }
    }

    pub fn with_notifier(mut self, notifier: OAuthUrlNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Outstanding authorization URL, if a flow is pending.
    pub fn pending_authorization_url(&self) -> Option<String> {
        self.guard().pending_authorization_url.clone()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, OAuthState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn cached_credential(&self) -> Option<Credential> {
        self.guard().token.clone().map(Credential::oauth)
    }

    fn notify(&self, authorization_url: &str) {
        if let Some(notifier) = &self.notifier {
            notifier(authorization_url);
        }
    }
}

#[async_trait]
impl CredentialSource for OAuthCredentialSource {
    async fn get_token(&self) -> Result<Credential, AuthError> {
        if let Some(credential) = self.cached_credential() {
            return Ok(credential);
        }

        let _flight = self.flight.lock().await;
        // A racing caller may have finished the flow while we waited.
        if let Some(credential) = self.cached_credential() {
            return Ok(credential);
        }

        info!(provider = %self.request.provider_name, "requesting access token");
        match self.identity.get_credential(&self.request).await {
            Ok(CredentialGrant::Issued { access_token }) => {
                let token = BearerToken::new(access_token)?;
                let mut state = self.guard();
                state.token = Some(token.clone());
                state.pending_authorization_url = None;
                drop(state);
                info!(provider = %self.request.provider_name, "access token received");
                Ok(Credential::oauth(token))
            }
            Ok(CredentialGrant::AuthorizationRequired { authorization_url }) => {
                let newly_pending = {
                    let mut state = self.guard();
                    let changed = state.pending_authorization_url.as_deref()
                        != Some(authorization_url.as_str());
                    state.pending_authorization_url = Some(authorization_url.clone());
                    changed
                };
                if newly_pending {
                    info!(
                        provider = %self.request.provider_name,
                        url = %authorization_url,
                        "user authorization required"
                    );
                    self.notify(&authorization_url);
                }
                Err(AuthError::AuthorizationPending { authorization_url })
            }
            Err(error) => {
                warn!(
                    provider = %self.request.provider_name,
                    error = %error,
                    "credential request failed"
                );
                Err(AuthError::Identity(error))
            }
        }
    }

    fn is_authenticated(&self) -> bool {
        self.guard().token.is_some()
    }
}
