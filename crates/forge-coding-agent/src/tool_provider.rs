//! Hybrid GitHub tool registration: static token or OAuth resolution.

use std::sync::Arc;

use async_trait::async_trait;
use forge_agent_core::Agent;
use forge_auth::{
    resolve_capability_token, AuthError, BearerToken, CredentialSource, OAuthCredentialSource,
};
use forge_gateway::GatewayToolProvider;
use forge_github::{register_github_tools, GithubApiClient, GithubClientConfig};
use tracing::debug;

/// Registers the GitHub capability tools after resolving a credential.
///
/// Source selection follows the dispatch rule: a statically configured
/// token wins unconditionally; otherwise the OAuth source is consulted and
/// its pending/failed states propagate to the caller untouched.
pub struct HybridGithubToolProvider {
    static_token: Option<BearerToken>,
    oauth: Option<Arc<OAuthCredentialSource>>,
    github_api_base: String,
    request_timeout_ms: u64,
}

impl HybridGithubToolProvider {
    pub fn new(
        static_token: Option<BearerToken>,
        oauth: Option<Arc<OAuthCredentialSource>>,
        github_api_base: impl Into<String>,
        request_timeout_ms: u64,
    ) -> Self {
        Self {
            static_token,
            oauth,
            github_api_base: github_api_base.into(),
            request_timeout_ms,
        }
    }
}

#[async_trait]
impl GatewayToolProvider for HybridGithubToolProvider {
    async fn register(&self, agent: &mut Agent) -> Result<(), AuthError> {
        let oauth_token = match (&self.static_token, &self.oauth) {
            // Static configuration wins; the identity provider is never
            // contacted in that mode.
            (Some(_), _) | (None, None) => None,
            (None, Some(source)) => Some(source.get_token().await?.token),
        };

        let credential =
            resolve_capability_token(self.static_token.as_ref(), oauth_token.as_ref())?;
        debug!(origin = ?credential.origin, "github credential resolved");

        let client = GithubApiClient::new(GithubClientConfig {
            api_base: self.github_api_base.clone(),
            token: credential.token,
            request_timeout_ms: self.request_timeout_ms,
        })
        .map_err(|error| AuthError::InvalidCredential(error.to_string()))?;

        register_github_tools(agent, Arc::new(client));
        Ok(())
    }
}
