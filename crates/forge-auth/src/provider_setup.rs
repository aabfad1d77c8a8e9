//! Provider lifecycle: idempotent delete-then-create setup.

use tracing::info;

use crate::identity_client::{CreatedProvider, IdentityClient, IdentityError};

#[derive(Debug, Clone, PartialEq, Eq)]
/// What the operator needs after setup: the provider ARN, the callback URL
/// to register in the GitHub OAuth app, and the secret reference.
pub struct ProviderSetupReport {
    pub provider_arn: String,
    pub callback_url: String,
    pub client_secret_arn: String,
}

/// Creates the named GitHub OAuth credential provider, replacing any
/// existing provider of the same name. A not-found outcome during the
/// delete step is tolerated and logged; every other failure propagates.
pub async fn setup_oauth_provider(
    client: &IdentityClient,
    name: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<ProviderSetupReport, IdentityError> {
    let existing = client.list_providers().await?;
    if existing.iter().any(|provider| provider.name == name) {
        info!(provider = name, "deleting existing credential provider");
        match client.delete_provider(name).await {
            Ok(()) => {}
            Err(error) if error.is_not_found() => {
                info!(provider = name, "provider already absent, continuing");
            }
            Err(error) => return Err(error),
        }
    }

    info!(provider = name, "creating credential provider");
    let CreatedProvider {
        credential_provider_arn,
        callback_url,
        client_secret_arn,
    } = client.create_provider(name, client_id, client_secret).await?;

    Ok(ProviderSetupReport {
        provider_arn: credential_provider_arn,
        callback_url,
        client_secret_arn,
    })
}
