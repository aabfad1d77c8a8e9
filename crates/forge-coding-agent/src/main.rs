mod bootstrap_helpers;
mod cli_args;
mod config;
mod prompts;
mod tool_provider;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use forge_ai::{BedrockConfig, BedrockModelClient};
use forge_auth::{
    setup_oauth_provider, IdentityClient, OAuthCredentialSource, OAuthUrlNotifier,
};
use forge_gateway::{run_gateway_server, GatewayServerConfig};
use tracing::info;

use bootstrap_helpers::init_tracing;
use cli_args::{Cli, Command, ProviderCommand};
use config::AppConfig;
use tool_provider::HybridGithubToolProvider;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}

async fn run_cli(cli: Cli) -> Result<()> {
    let config = AppConfig::from_cli(&cli)?;
    match cli.command {
        Command::Serve => run_serve(&config).await,
        Command::Provider { command } => run_provider_command(&config, command).await,
    }
}

async fn run_serve(config: &AppConfig) -> Result<()> {
    let Some(model_api_key) = config.model_api_key.clone() else {
        bail!("model API key is required to serve. Set FORGE_MODEL_API_KEY or --model-api-key");
    };

    let model_client = BedrockModelClient::new(BedrockConfig {
        api_base: config.model_api_base.clone(),
        api_key: model_api_key,
        request_timeout_ms: config.request_timeout_ms,
    })
    .context("failed to construct model client")?;

    let oauth = if config.github_token.is_some() {
        info!("static GitHub token configured, OAuth flow disabled");
        None
    } else {
        let identity = IdentityClient::new(config.identity_client_config())
            .context("failed to construct identity client")?;
        let notifier: OAuthUrlNotifier = Arc::new(|url: &str| {
            info!(url = %url, "GitHub authorization required");
        });
        Some(Arc::new(
            OAuthCredentialSource::new(Arc::new(identity), config.authorization_request())
                .with_notifier(notifier),
        ))
    };

    let tool_provider = HybridGithubToolProvider::new(
        config.github_token.clone(),
        oauth,
        config.github_api_base.clone(),
        config.request_timeout_ms,
    );

    run_gateway_server(GatewayServerConfig {
        client: Arc::new(model_client),
        model: config.model.clone(),
        system_prompt: prompts::CODING_AGENT_SYSTEM_PROMPT.to_string(),
        max_turns: config.max_turns,
        tool_provider: Arc::new(tool_provider),
        bind: config.bind.clone(),
    })
    .await
}

async fn run_provider_command(config: &AppConfig, command: ProviderCommand) -> Result<()> {
    let client = IdentityClient::new(config.identity_client_config())
        .context("failed to construct identity client")?;

    match command {
        ProviderCommand::Setup => {
            let Some(client_id) = config.github_client_id.as_deref() else {
                bail!("provider setup requires GITHUB_CLIENT_ID or --github-client-id");
            };
            let Some(client_secret) = config.github_client_secret.as_deref() else {
                bail!("provider setup requires GITHUB_CLIENT_SECRET or --github-client-secret");
            };
            let report = setup_oauth_provider(
                &client,
                &config.provider_name,
                client_id,
                client_secret,
            )
            .await
            .context("provider setup failed")?;

            println!("Created OAuth provider: {}", report.provider_arn);
            println!("  provider name: {}", config.provider_name);
            println!("  client secret reference: {}", report.client_secret_arn);
            println!();
            println!("Register this callback URL in your GitHub OAuth app:");
            println!("  {}", report.callback_url);
            println!();
            println!("Steps:");
            println!("  1. Open https://github.com/settings/developers");
            println!("  2. Select your OAuth app");
            println!("  3. Set 'Authorization callback URL' to the URL above");
            println!("  4. Save changes");
            Ok(())
        }
        ProviderCommand::List => {
            let providers = client
                .list_providers()
                .await
                .context("failed to list credential providers")?;
            if providers.is_empty() {
                println!("no credential providers registered");
                return Ok(());
            }
            for provider in providers {
                println!("{}\t{}", provider.name, provider.credential_provider_arn);
            }
            Ok(())
        }
        ProviderCommand::Delete => {
            client
                .delete_provider(&config.provider_name)
                .await
                .with_context(|| {
                    format!("failed to delete provider '{}'", config.provider_name)
                })?;
            println!("deleted provider '{}'", config.provider_name);
            Ok(())
        }
    }
}
