use clap::{Parser, Subcommand};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "forge-coding-agent",
    about = "AI coding assistant with GitHub tools behind hybrid OAuth",
    version
)]
/// Command-line surface of the service.
pub struct Cli {
    #[arg(
        long,
        env = "FORGE_AWS_REGION",
        default_value = "ap-southeast-2",
        help = "Region used to derive model and identity endpoints"
    )]
    pub region: String,

    #[arg(
        long,
        env = "FORGE_MODEL_ID",
        default_value = "anthropic.claude-sonnet-4-5",
        help = "Model identifier passed to the runtime endpoint"
    )]
    pub model: String,

    #[arg(
        long,
        env = "FORGE_MODEL_API_BASE",
        help = "Override for the model runtime base URL (defaults to the regional endpoint)"
    )]
    pub model_api_base: Option<String>,

    #[arg(
        long,
        env = "FORGE_MODEL_API_KEY",
        help = "Bearer key for the model runtime endpoint",
        hide_env_values = true
    )]
    pub model_api_key: Option<String>,

    #[arg(
        long,
        env = "GITHUB_TOKEN",
        help = "Static GitHub token for local development; bypasses OAuth and always wins",
        hide_env_values = true
    )]
    pub github_token: Option<String>,

    #[arg(
        long,
        env = "FORGE_GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub REST base URL"
    )]
    pub github_api_base: String,

    #[arg(
        long,
        env = "FORGE_IDENTITY_API_BASE",
        help = "Override for the identity provider base URL (defaults to the regional endpoint)"
    )]
    pub identity_api_base: Option<String>,

    #[arg(
        long,
        env = "FORGE_OAUTH_PROVIDER_NAME",
        default_value = "github-provider",
        help = "Name of the OAuth credential provider"
    )]
    pub provider_name: String,

    #[arg(
        long,
        env = "FORGE_OAUTH_SCOPES",
        value_delimiter = ',',
        default_values_t = vec!["repo".to_string(), "read:user".to_string()],
        help = "GitHub OAuth scopes requested during the three-legged flow"
    )]
    pub oauth_scopes: Vec<String>,

    #[arg(
        long,
        env = "FORGE_OAUTH_WORKLOAD_NAME",
        default_value = "coding-agent-workload",
        help = "Workload name reported to the identity provider"
    )]
    pub workload_name: String,

    #[arg(
        long,
        env = "GITHUB_CLIENT_ID",
        help = "GitHub OAuth app client id (provider setup only)",
        hide_env_values = true
    )]
    pub github_client_id: Option<String>,

    #[arg(
        long,
        env = "GITHUB_CLIENT_SECRET",
        help = "GitHub OAuth app client secret (provider setup only)",
        hide_env_values = true
    )]
    pub github_client_secret: Option<String>,

    #[arg(
        long,
        env = "FORGE_BIND",
        default_value = "0.0.0.0:8000",
        help = "Gateway bind address"
    )]
    pub bind: String,

    #[arg(
        long,
        env = "FORGE_MAX_TURNS",
        default_value_t = 8,
        value_parser = parse_positive_usize,
        help = "Maximum model turns per chat exchange"
    )]
    pub max_turns: usize,

    #[arg(
        long,
        env = "FORGE_REQUEST_TIMEOUT_MS",
        default_value_t = 120_000,
        value_parser = parse_positive_u64,
        help = "Timeout for outbound HTTP requests in milliseconds"
    )]
    pub request_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
/// Top-level commands.
pub enum Command {
    /// Run the streaming chat gateway.
    Serve,
    /// Manage the OAuth credential provider.
    Provider {
        #[command(subcommand)]
        command: ProviderCommand,
    },
}

#[derive(Debug, Subcommand)]
/// Provider lifecycle commands.
pub enum ProviderCommand {
    /// Delete any same-named provider, then create it fresh.
    Setup,
    /// List registered credential providers.
    List,
    /// Delete a credential provider by its configured name.
    Delete,
}
