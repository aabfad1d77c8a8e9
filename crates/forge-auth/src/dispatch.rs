//! Hybrid source selection for capability operations.

use crate::types::{AuthError, BearerToken, Credential};

/// Resolves the bearer credential for one capability invocation.
///
/// A statically configured token wins unconditionally, even when an OAuth
/// token was separately supplied; a deployment defining both uses the
/// static one. With neither source available the error names both
/// remedies.
pub fn resolve_capability_token(
    static_token: Option<&BearerToken>,
    supplied: Option<&BearerToken>,
) -> Result<Credential, AuthError> {
    if let Some(token) = static_token {
        return Ok(Credential::statically_configured(token.clone()));
    }
    if let Some(token) = supplied {
        return Ok(Credential::oauth(token.clone()));
    }
    Err(AuthError::MissingCredentials)
}
