use axum::http::HeaderMap;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};


/// Cookie set by the external login flow
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Authenticated principal attached to a connection for its lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Identity {
    /// Principal used when handshake auth is disabled
    pub fn anonymous() -> Self {
        Self {
            id: "anonymous".to_string(),
            email: "anonymous@localhost".to_string(),
            role: "VIEWER".to_string(),
        }
    }
}

/// Boundary to the external credential issuer.
///
/// Called once per handshake, awaited inside the upgrade middleware. Remote
/// issuers (introspection endpoints, key fetches) do their I/O in the
/// returned future and must not block the runtime thread.
pub trait CredentialValidator: Send + Sync {
    fn validate<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<Identity, AuthError>>;
}

/// One accepted credential in the static validator table
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialEntry {
    pub token: String,
    pub id: String,
    pub email: String,
    pub role: String,
}

/// Handshake authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,
}

fn default_auth_enabled() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_auth_enabled(),
            credentials: Vec::new(),
        }
    }
}

/// Validator backed by a token table loaded at startup
pub struct StaticCredentialValidator {
    /// token -> identity
    tokens: DashMap<String, Identity>,
}

impl StaticCredentialValidator {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    pub fn from_entries(entries: &[CredentialEntry]) -> Self {
        let validator = Self::new();
        for entry in entries {
            validator.insert(
                &entry.token,
                Identity {
                    id: entry.id.clone(),
                    email: entry.email.clone(),
                    role: entry.role.clone(),
                },
            );
        }
        validator
    }

    pub fn insert(&self, token: &str, identity: Identity) {
        self.tokens.insert(token.to_string(), identity);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Default for StaticCredentialValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialValidator for StaticCredentialValidator {
    fn validate<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<Identity, AuthError>> {
        let result = self
            .tokens
            .get(credential)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::InvalidCredential);
        Box::pin(async move { result })
    }
}

/// Locate the handshake credential.
///
/// Order: `Authorization: Bearer`, then the `access_token` cookie, then the
/// `token` query parameter.
pub fn extract_credential(
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<String, TokenError> {
    match extract_bearer_token(headers) {
        Ok(token) => return Ok(token),
        Err(TokenError::Missing) => {}
        Err(e) => return Err(e),
    }

    if let Some(token) = extract_cookie_token(headers) {
        return Ok(token);
    }

    match query_token {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        Some(_) => Err(TokenError::Empty),
        None => Err(TokenError::Missing),
    }
}

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Extract the `access_token` value from the Cookie header(s)
pub fn extract_cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    if parts[0].to_lowercase() != "bearer" {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();

    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum TokenError {
    /// No credential in header, cookie or query
    #[error("Authorization token not provided")]
    Missing,
    /// Not "Bearer <token>"
    #[error("Invalid authorization token format")]
    InvalidFormat,
    #[error("Authorization token is empty")]
    Empty,
}

/// Handshake rejection reasons
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Token(#[from] TokenError),
    #[error("Invalid credential")]
    InvalidCredential,
}
