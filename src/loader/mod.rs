//! Manifest loader
//!
//! Reads declarative connector manifests and turns them into a runnable
//! [`DeclarativeSource`](crate::engine::DeclarativeSource).
//!
//! # Overview
//!
//! - `$ref` pointers (`#/definitions/...`) are resolved before parsing;
//!   keys next to a `$ref` override the referenced mapping
//! - `$parameters` flow from a stream into its components, with `name`
//!   set to the stream name
//! - Validation rejects duplicate stream names, unknown check or parent
//!   streams, and parent cycles
//! - [`build_source`] resolves authenticators against the connector config

mod factory;
mod parser;
mod types;

pub use factory::{build_source, build_stream, load_source};
pub use parser::{load_manifest, load_manifest_from_str, resolve_manifest};
pub use types::{
    CheckDefinition, ConcurrencyLevel, DatetimeBound, HttpDefinition, IncrementalSync, Manifest,
    PrimaryKey, RequesterManifest, RetrieverManifest, SpecDefinition, StreamDefinition,
};
