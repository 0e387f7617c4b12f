//! Authenticator implementation
//!
//! Authenticators decorate a prepared request once, before the first
//! attempt, so every retry carries identical credentials.

use super::types::{AuthConfig, Location};
use crate::error::{Error, Result};
use crate::http::PreparedRequest;
use async_trait::async_trait;
use base64::Engine;

/// Adds credentials to outgoing requests
#[async_trait]
pub trait Authenticator: Send + Sync + std::fmt::Debug {
    /// Decorate the request with credentials
    async fn apply(&self, request: &mut PreparedRequest) -> Result<()>;
}

#[async_trait]
impl Authenticator for AuthConfig {
    async fn apply(&self, request: &mut PreparedRequest) -> Result<()> {
        match self {
            AuthConfig::None => {}

            AuthConfig::ApiKey {
                location,
                name,
                prefix,
                value,
            } => {
                if value.is_empty() {
                    return Err(Error::auth(format!("API key for '{name}' is empty")));
                }
                let val = format!("{}{}", prefix.as_deref().unwrap_or(""), value);
                match location {
                    Location::Header => {
                        request.headers.insert(name.clone(), val);
                    }
                    Location::Query => {
                        request.query.insert(name.clone(), val);
                    }
                }
            }

            AuthConfig::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                request
                    .headers
                    .insert("Authorization".to_string(), format!("Basic {encoded}"));
            }

            AuthConfig::Bearer { token } => {
                if token.is_empty() {
                    return Err(Error::auth("Bearer token is empty"));
                }
                request
                    .headers
                    .insert("Authorization".to_string(), format!("Bearer {token}"));
            }
        }
        Ok(())
    }
}
