//! OIDC (OpenID Connect) configuration for the identity provider.
//!
//! The identity provider is an opaque collaborator: it authenticates users
//! and issues signed session tokens. This configuration tells the server
//! where to discover it and which custom claim carries organization
//! memberships.

use serde::{Deserialize, Serialize};

/// Configuration for the OIDC identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// The OIDC issuer URL. Used for discovery and as the expected `iss`.
    issuer_url: String,
    /// The OAuth2 client ID registered with the provider (expected `aud`).
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: String,
    /// The redirect URI for the hosted login callback.
    redirect_uri: String,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid,email,profile"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// The claim in the session token listing organization memberships.
    /// Default: "org_memberships"
    #[serde(default = "default_memberships_claim")]
    memberships_claim: String,
}

fn default_scopes() -> String {
    "openid,email,profile".to_string()
}

fn default_memberships_claim() -> String {
    "org_memberships".to_string()
}

impl OidcConfig {
    /// Returns the OIDC issuer URL.
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the OAuth2 redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the OAuth2 scopes to request, parsed from comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the name of the claim containing organization memberships.
    #[must_use]
    pub fn memberships_claim(&self) -> &str {
        &self.memberships_claim
    }
}
