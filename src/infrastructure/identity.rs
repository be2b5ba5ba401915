//! Bearer-token verification.
//!
//! The service never stores credentials. Tokens are verified by an
//! [`IdentityProvider`]: either a fixed token table for development and
//! tests, or a remote Supabase-compatible identity service.
//!
//! # Environment Variables
//!
//! - `AUTH_MODE`: `disabled` (default) | `static` | `remote`
//! - `AUTH_STATIC_TOKENS`: `token:user-id:role,...` (required when `AUTH_MODE=static`)
//! - `IDENTITY_URL`, `IDENTITY_ANON_KEY`, `IDENTITY_SERVICE_KEY` (required when `AUTH_MODE=remote`)
//! - `IDENTITY_TIMEOUT_MS`: request timeout in milliseconds (default: `5000`)

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::factory::{ConfigurationError, FactoryError, process_environment, read_number, read_variable};

/// Default timeout for identity service requests.
pub const DEFAULT_IDENTITY_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// Authenticated User
// =============================================================================

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(value.to_string()),
        }
    }
}

/// A user whose token has been verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            email: None,
            role,
        }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

// =============================================================================
// Auth Error
// =============================================================================

/// Reasons a request could not be authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` header was sent.
    #[error("Missing bearer token")]
    MissingToken,

    /// The identity provider rejected the token.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The identity provider could not be reached or answered unexpectedly.
    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Identity Provider
// =============================================================================

/// Verifies bearer tokens.
pub trait IdentityProvider: Send + Sync {
    /// Returns the user the token belongs to.
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<AuthenticatedUser, AuthError>>;
}

/// Identity provider backed by a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenIdentityProvider {
    tokens: HashMap<String, AuthenticatedUser>,
}

impl StaticTokenIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the provider with `token` resolving to `user`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }

    /// Parses a comma-separated list of `token:user-id:role` entries.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidStaticToken` for a malformed entry.
    pub fn parse(entries: &str) -> Result<Self, ConfigurationError> {
        entries
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .try_fold(Self::new(), |provider, entry| {
                let invalid = || ConfigurationError::InvalidStaticToken(entry.to_string());
                match entry.split(':').collect::<Vec<_>>().as_slice() {
                    [token, id, role] if !token.is_empty() && !id.is_empty() => {
                        let role = role.parse::<Role>().map_err(|_| invalid())?;
                        Ok(provider.with_token(*token, AuthenticatedUser::new(*id, role)))
                    }
                    _ => Err(invalid()),
                }
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityProvider for StaticTokenIdentityProvider {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<AuthenticatedUser, AuthError>> {
        let result = self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken);
        futures::future::ready(result).boxed()
    }
}

// =============================================================================
// Remote Identity Provider
// =============================================================================

/// Connection settings for a remote identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentityConfig {
    /// Base URL, without a trailing slash.
    pub url: String,
    /// Public key sent as `apikey` when verifying user tokens.
    pub anon_key: String,
    /// Privileged key used to read user profiles.
    pub service_key: String,
    /// Timeout applied to every request.
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct IdentityUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileRole {
    #[serde(default)]
    role: Option<String>,
}

/// Identity provider backed by a Supabase-compatible HTTP service.
///
/// The token is verified with `GET {url}/auth/v1/user`; the role is read from
/// the `profiles` table. A user without a profile row has the `user` role.
#[derive(Debug, Clone)]
pub struct RemoteIdentityProvider {
    client: reqwest::Client,
    config: RemoteIdentityConfig,
}

impl RemoteIdentityProvider {
    /// Creates a provider with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError::IdentityClient` if the HTTP client cannot be built.
    pub fn new(config: RemoteIdentityConfig) -> Result<Self, FactoryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| FactoryError::IdentityClient(error.to_string()))?;
        Ok(Self { client, config })
    }

    async fn fetch_user(&self, token: &str) -> Result<IdentityUser, AuthError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.config.url))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::InvalidToken);
        }
        if !status.is_success() {
            return Err(AuthError::Unavailable(format!("user lookup returned {status}")));
        }

        response.json().await.map_err(unavailable)
    }

    async fn fetch_role(&self, user_id: &str) -> Result<Role, AuthError> {
        let response = self
            .client
            .get(format!("{}/rest/v1/profiles", self.config.url))
            .query(&[("id", format!("eq.{user_id}")), ("select", "role".to_string())])
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Unavailable(format!("profile lookup returned {status}")));
        }

        let profiles: Vec<ProfileRole> = response.json().await.map_err(unavailable)?;
        Ok(profiles
            .into_iter()
            .next()
            .and_then(|profile| profile.role)
            .and_then(|role| role.parse().ok())
            .unwrap_or_default())
    }
}

fn unavailable(error: reqwest::Error) -> AuthError {
    AuthError::Unavailable(error.to_string())
}

impl IdentityProvider for RemoteIdentityProvider {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<AuthenticatedUser, AuthError>> {
        async move {
            let user = self.fetch_user(token).await?;
            let role = self.fetch_role(&user.id).await?;
            Ok(AuthenticatedUser {
                id: user.id,
                email: user.email,
                role,
            })
        }
        .boxed()
    }
}

// =============================================================================
// Auth Configuration
// =============================================================================

/// How requests are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// No authentication; every route is public.
    #[default]
    Disabled,
    /// Tokens from `AUTH_STATIC_TOKENS`.
    Static,
    /// Tokens verified by a remote identity service.
    Remote,
}

impl FromStr for AuthMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            "static" => Ok(Self::Static),
            "remote" | "supabase" => Ok(Self::Remote),
            _ => Err(ConfigurationError::InvalidAuthMode(value.to_string())),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Default)]
pub enum AuthConfig {
    #[default]
    Disabled,
    Static(StaticTokenIdentityProvider),
    Remote(RemoteIdentityConfig),
}

impl AuthConfig {
    /// Creates the settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the mode is unknown or a variable it
    /// requires is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(process_environment)
    }

    /// Creates the settings from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`AuthConfig::from_env`].
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigurationError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mode = read_variable(&lookup, "AUTH_MODE")
            .map_or(Ok(AuthMode::default()), |value| value.parse::<AuthMode>())?;

        match mode {
            AuthMode::Disabled => Ok(Self::Disabled),
            AuthMode::Static => {
                let entries = read_variable(&lookup, "AUTH_STATIC_TOKENS").ok_or(
                    ConfigurationError::MissingVariable {
                        variable: "AUTH_STATIC_TOKENS",
                        mode: "AUTH_MODE=static",
                    },
                )?;
                Ok(Self::Static(StaticTokenIdentityProvider::parse(&entries)?))
            }
            AuthMode::Remote => {
                let required = |variable: &'static str| {
                    read_variable(&lookup, variable).ok_or(ConfigurationError::MissingVariable {
                        variable,
                        mode: "AUTH_MODE=remote",
                    })
                };
                let url = required("IDENTITY_URL")?.trim_end_matches('/').to_string();
                let anon_key = required("IDENTITY_ANON_KEY")?;
                let service_key = required("IDENTITY_SERVICE_KEY")?;
                let timeout_ms = read_number(&lookup, "IDENTITY_TIMEOUT_MS", DEFAULT_IDENTITY_TIMEOUT_MS)?;

                Ok(Self::Remote(RemoteIdentityConfig {
                    url,
                    anon_key,
                    service_key,
                    timeout: Duration::from_millis(timeout_ms),
                }))
            }
        }
    }

    #[must_use]
    pub const fn mode(&self) -> AuthMode {
        match self {
            Self::Disabled => AuthMode::Disabled,
            Self::Static(_) => AuthMode::Static,
            Self::Remote(_) => AuthMode::Remote,
        }
    }

    /// Builds the identity provider, or `None` when authentication is disabled.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError::IdentityClient` if the remote client cannot be built.
    pub fn identity_provider(self) -> Result<Option<Arc<dyn IdentityProvider>>, FactoryError> {
        let provider: Option<Arc<dyn IdentityProvider>> = match self {
            Self::Disabled => None,
            Self::Static(provider) => Some(Arc::new(provider)),
            Self::Remote(config) => Some(Arc::new(RemoteIdentityProvider::new(config)?)),
        };
        Ok(provider)
    }
}

// =============================================================================
// Tests
// =============================================================================
