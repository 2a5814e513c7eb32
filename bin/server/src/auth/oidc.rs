//! OIDC client and session verification using the openidconnect crate.
//!
//! [`OidcClient`] runs the hosted login flow. [`OidcSessionVerifier`] is the
//! [`IdentitySessionAdapter`] used on every request: it verifies the ID token
//! stored in the session cookie against the provider's published keys and
//! reads organization memberships from a configurable claim.

use async_trait::async_trait;
use base64::Engine;
use medislot_access::{
    ExternalIdentity, IdentitySessionAdapter, Membership, OidcConfig, RequestCredentials,
};
use medislot_core::SubjectId;
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreIdToken, CoreIdTokenVerifier, CoreProviderMetadata,
};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// OIDC client for authenticating users.
pub struct OidcClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    http_client: reqwest::Client,
    config: OidcConfig,
}

/// Data needed to complete the OIDC callback.
///
/// Round-trips through a short-lived cookie between login and callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthState {
    pub csrf_token: String,
    pub pkce_verifier: String,
    pub nonce: String,
}

/// Result of a successful token exchange.
pub struct TokenResult {
    /// The verified subject.
    pub subject: SubjectId,
    /// The raw ID token, stored as the session token.
    pub id_token: String,
}

impl OidcClient {
    /// Creates a new OIDC client by discovering the provider metadata.
    pub async fn discover(config: OidcConfig) -> Result<Self, OidcError> {
        let issuer_url = IssuerUrl::new(config.issuer_url().to_string())
            .map_err(|e| OidcError::Configuration(format!("invalid issuer URL: {}", e)))?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                OidcError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| OidcError::Discovery(format!("failed to discover provider: {}", e)))?;

        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string())
            .map_err(|e| OidcError::Configuration(format!("invalid redirect URI: {}", e)))?;

        let client_id = ClientId::new(config.client_id().to_string());
        let client_secret = ClientSecret::new(config.client_secret().to_string());

        Ok(Self {
            provider_metadata,
            client_id,
            client_secret,
            redirect_url,
            http_client,
            config,
        })
    }

    /// Builds the per-request session verifier from the discovered keys.
    ///
    /// Keys are captured at startup; a provider key rotation needs a restart.
    #[must_use]
    pub fn session_verifier(&self) -> OidcSessionVerifier {
        let verifier = CoreIdTokenVerifier::new_confidential_client(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.provider_metadata.issuer().clone(),
            self.provider_metadata.jwks().clone(),
        );
        OidcSessionVerifier::new(verifier, self.config.memberships_claim())
    }

    /// Generates the authorization URL for redirecting the user.
    pub fn authorization_url(&self) -> (String, AuthState) {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        for scope in self.config.scopes() {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        let state = AuthState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
            nonce: nonce.secret().clone(),
        };

        (auth_url.to_string(), state)
    }

    /// Exchanges the authorization code for a verified ID token.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &AuthState,
    ) -> Result<TokenResult, OidcError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let pkce_verifier = PkceCodeVerifier::new(state.pkce_verifier.clone());

        let token_request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| OidcError::TokenExchange(format!("token endpoint error: {}", e)))?;

        let token_response = token_request
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http_client)
            .await
            .map_err(|e| OidcError::TokenExchange(format!("token exchange failed: {}", e)))?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| OidcError::TokenExchange("no ID token in response".to_string()))?;

        let nonce = Nonce::new(state.nonce.clone());
        let claims = id_token
            .claims(&client.id_token_verifier(), &nonce)
            .map_err(|e| {
                OidcError::TokenValidation(format!("ID token validation failed: {}", e))
            })?;

        Ok(TokenResult {
            subject: SubjectId::new(claims.subject().as_str()),
            id_token: id_token.to_string(),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }
}

/// Verifies session ID tokens and extracts the caller's identity.
pub struct OidcSessionVerifier {
    verifier: CoreIdTokenVerifier<'static>,
    memberships_claim: String,
}

impl OidcSessionVerifier {
    /// Creates a verifier reading memberships from `memberships_claim`.
    pub fn new(verifier: CoreIdTokenVerifier<'static>, memberships_claim: &str) -> Self {
        Self {
            verifier,
            memberships_claim: memberships_claim.to_string(),
        }
    }

    fn verify(&self, raw: &str) -> Result<ExternalIdentity, OidcError> {
        let token = CoreIdToken::from_str(raw)
            .map_err(|e| OidcError::TokenValidation(format!("malformed ID token: {}", e)))?;

        // Session tokens are replayed on every request, so there is no nonce
        // to match; the nonce was checked once at the callback.
        let claims = token
            .claims(&self.verifier, |_: Option<&Nonce>| Ok(()))
            .map_err(|e| OidcError::TokenValidation(format!("ID token rejected: {}", e)))?;

        let subject = SubjectId::new(claims.subject().as_str());
        let memberships = extract_memberships(raw, &self.memberships_claim)?;

        Ok(ExternalIdentity::new(subject).with_memberships(memberships))
    }
}

#[async_trait]
impl IdentitySessionAdapter for OidcSessionVerifier {
    async fn resolve_identity(&self, credentials: &RequestCredentials) -> Option<ExternalIdentity> {
        let raw = credentials.session_token()?;
        match self.verify(raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::debug!(error = %e, "session token did not verify");
                None
            }
        }
    }
}

/// A membership entry as providers encode it: a bare organization id or an
/// object with an id and optional role.
#[derive(Deserialize)]
#[serde(untagged)]
enum MembershipClaim {
    Id(String),
    Detailed {
        #[serde(alias = "organization_id", alias = "org_id")]
        id: String,
        #[serde(default)]
        role: Option<String>,
    },
}

impl From<MembershipClaim> for Membership {
    fn from(claim: MembershipClaim) -> Self {
        match claim {
            MembershipClaim::Id(id) => Membership::new(id),
            MembershipClaim::Detailed { id, role } => Membership {
                organization_id: id,
                role,
            },
        }
    }
}

/// Reads memberships from an already verified JWT.
///
/// Different providers use different claim names, so the claim is read from
/// the raw payload rather than through typed claims. A missing claim means no
/// memberships; entries that fit neither shape are skipped.
fn extract_memberships(id_token: &str, claim: &str) -> Result<Vec<Membership>, OidcError> {
    // JWT is base64url(header).base64url(payload).signature
    let mut parts = id_token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(OidcError::TokenValidation("Invalid JWT format".to_string())),
    };

    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| OidcError::TokenValidation(format!("Failed to decode JWT payload: {}", e)))?;

    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes)
        .map_err(|e| OidcError::TokenValidation(format!("Failed to parse JWT payload: {}", e)))?;

    let memberships = payload
        .get(claim)
        .and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| serde_json::from_value::<MembershipClaim>(entry.clone()).ok())
                .map(Membership::from)
                .collect()
        })
        .unwrap_or_default();

    Ok(memberships)
}

/// OIDC-related errors.
#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    /// Configuration error (invalid URLs, etc.)
    #[error("OIDC configuration error: {0}")]
    Configuration(String),
    /// Failed to discover provider metadata.
    #[error("OIDC discovery error: {0}")]
    Discovery(String),
    /// Token exchange failed.
    #[error("OIDC token exchange error: {0}")]
    TokenExchange(String),
    /// Token validation failed.
    #[error("OIDC token validation error: {0}")]
    TokenValidation(String),
}
