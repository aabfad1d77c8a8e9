//! Hybrid credential resolution for GitHub-backed capability operations.
//!
//! Two credential sources exist: a statically configured token (operator
//! mode, strictly dominant) and a three-legged OAuth flow driven through an
//! external identity provider. The resolver caches an issued OAuth token
//! for the lifetime of the process and surfaces pending authorization URLs
//! through a one-shot notifier.

mod credential_source;
mod dispatch;
mod identity_client;
mod provider_setup;
mod types;

pub use credential_source::{
    CredentialSource, OAuthCredentialSource, OAuthUrlNotifier, StaticCredentialSource,
};
pub use dispatch::resolve_capability_token;
pub use identity_client::{
    CredentialGrant, CreatedProvider, IdentityApi, IdentityClient, IdentityClientConfig,
    IdentityError, ProviderSummary,
};
pub use provider_setup::{setup_oauth_provider, ProviderSetupReport};
pub use types::{
    AuthError, AuthFlow, AuthorizationRequest, BearerToken, Credential, CredentialOrigin,
};
