//! Auth configuration types
//!
//! [`AuthDefinition`] is the manifest form; [`AuthConfig`] is the runtime
//! configuration after template interpolation has been applied.

use crate::error::{Error, Result};
use crate::http::{InjectInto, RequestOption};
use crate::template::{InterpolatedString, TemplateContext};
use crate::types::JsonValue;
use serde::{Deserialize, Serialize};

/// Location for API key placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// Place in HTTP header
    #[default]
    Header,
    /// Place in query parameter
    Query,
}

/// Authentication configuration (after template interpolation)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthConfig {
    /// No authentication required
    #[default]
    None,

    /// API Key authentication (header or query)
    ApiKey {
        /// Where to place the API key
        location: Location,
        /// Header or query parameter name
        name: String,
        /// Prefix to add before the value (e.g., "Token ")
        prefix: Option<String>,
        /// The API key value
        value: String,
    },

    /// HTTP Basic authentication
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },

    /// Bearer token authentication
    Bearer {
        /// The bearer token
        token: String,
    },
}

// ============================================================================
// Auth Definition
// ============================================================================

/// Authenticator declared in a manifest
///
/// Values are templates over `config`; they are resolved once when the
/// source is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthDefinition {
    /// No authentication
    #[default]
    #[serde(alias = "NoAuth", alias = "none")]
    NoAuth,
    /// API key in a header or query parameter
    #[serde(alias = "ApiKeyAuthenticator")]
    ApiKey {
        /// Key value
        api_token: InterpolatedString,
        /// Header name (shorthand for `inject_into` a header)
        #[serde(default)]
        header: Option<String>,
        /// Where to inject the key
        #[serde(default)]
        inject_into: Option<RequestOption>,
        /// Prefix added before the key
        #[serde(default)]
        prefix: Option<String>,
    },
    /// `Authorization: Bearer <token>`
    #[serde(alias = "BearerAuthenticator")]
    Bearer {
        /// Token value
        api_token: InterpolatedString,
    },
    /// HTTP Basic authentication
    #[serde(alias = "BasicHttpAuthenticator")]
    Basic {
        /// Username
        username: InterpolatedString,
        /// Password
        #[serde(default)]
        password: InterpolatedString,
    },
}

impl AuthDefinition {
    /// Resolve the templates against the connector configuration
    pub fn resolve(&self, config: &JsonValue) -> Result<AuthConfig> {
        let ctx = TemplateContext::with_config(config.clone());
        match self {
            AuthDefinition::NoAuth => Ok(AuthConfig::None),
            AuthDefinition::ApiKey {
                api_token,
                header,
                inject_into,
                prefix,
            } => {
                let (location, name) = match (inject_into, header) {
                    (Some(option), _) => match option.inject_into {
                        InjectInto::Header => (Location::Header, option.field_name.clone()),
                        InjectInto::RequestParameter => (Location::Query, option.field_name.clone()),
                        other => {
                            return Err(Error::config(format!(
                                "API key cannot be injected into {other:?}"
                            )))
                        }
                    },
                    (None, Some(header)) => (Location::Header, header.clone()),
                    (None, None) => {
                        return Err(Error::config(
                            "API key authenticator needs `header` or `inject_into`",
                        ))
                    }
                };
                if name.is_empty() {
                    return Err(Error::config("API key field name cannot be empty"));
                }
                Ok(AuthConfig::ApiKey {
                    location,
                    name,
                    prefix: prefix.clone(),
                    value: api_token.render(&ctx)?,
                })
            }
            AuthDefinition::Bearer { api_token } => Ok(AuthConfig::Bearer {
                token: api_token.render(&ctx)?,
            }),
            AuthDefinition::Basic { username, password } => Ok(AuthConfig::Basic {
                username: username.render(&ctx)?,
                password: password.render(&ctx)?,
            }),
        }
    }
}
