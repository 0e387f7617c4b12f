//! Schema loading module
//!
//! Supports: inline schemas, JSON files, empty schemas
//!
//! Each stream's loader runs once per stream during discovery.

mod loader;

pub use loader::{SchemaLoader, JSON_SCHEMA_DRAFT};
