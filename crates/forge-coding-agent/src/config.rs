//! Typed application configuration, built once at startup from the CLI.

use anyhow::{bail, Result};
use forge_ai::BedrockConfig;
use forge_auth::{AuthorizationRequest, BearerToken, IdentityClientConfig};

use crate::cli_args::Cli;

/// Everything the runtime needs, resolved from flags and environment.
/// Constructed once and passed by reference; no global state.
#[derive(Debug)]
pub struct AppConfig {
    pub model: String,
    pub model_api_base: String,
    pub model_api_key: Option<String>,
    pub github_token: Option<BearerToken>,
    pub github_api_base: String,
    pub identity_api_base: String,
    pub provider_name: String,
    pub oauth_scopes: Vec<String>,
    pub workload_name: String,
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
    pub bind: String,
    pub max_turns: usize,
    pub request_timeout_ms: u64,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let github_token = match cli.github_token.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(
                BearerToken::new(raw).map_err(|error| anyhow::anyhow!(error.to_string()))?,
            ),
            _ => None,
        };

        let model_api_base = cli
            .model_api_base
            .clone()
            .unwrap_or_else(|| BedrockConfig::api_base_for_region(&cli.region));
        let identity_api_base = cli
            .identity_api_base
            .clone()
            .unwrap_or_else(|| IdentityClientConfig::api_base_for_region(&cli.region));

        if cli.provider_name.trim().is_empty() {
            bail!("OAuth provider name must not be empty");
        }

        Ok(Self {
            model: cli.model.clone(),
            model_api_base,
            model_api_key: cli
                .model_api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(ToOwned::to_owned),
            github_token,
            github_api_base: cli.github_api_base.clone(),
            identity_api_base,
            provider_name: cli.provider_name.clone(),
            oauth_scopes: cli.oauth_scopes.clone(),
            workload_name: cli.workload_name.clone(),
            github_client_id: cli.github_client_id.clone(),
            github_client_secret: cli.github_client_secret.clone(),
            bind: cli.bind.clone(),
            max_turns: cli.max_turns,
            request_timeout_ms: cli.request_timeout_ms,
        })
    }

    pub fn authorization_request(&self) -> AuthorizationRequest {
        AuthorizationRequest::user_federation(&self.provider_name, self.oauth_scopes.clone())
    }

    pub fn identity_client_config(&self) -> IdentityClientConfig {
        IdentityClientConfig {
            api_base: self.identity_api_base.clone(),
            workload_name: self.workload_name.clone(),
            request_timeout_ms: self.request_timeout_ms,
        }
    }
}
