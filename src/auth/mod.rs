//! Authentication module
//!
//! Supports: API Key, Basic, Bearer
//!
//! Custom schemes implement [`Authenticator`] and are handed to the source
//! builder in place of the manifest-declared one.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{AuthConfig, AuthDefinition, Location};
