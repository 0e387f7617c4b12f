//! Record extraction module
//!
//! Pulls records out of decoded response mappings. Extraction is pure: no
//! network access and no state writes.
//!
//! # Paths
//!
//! - `[]` - the mapping itself (an array is flattened)
//! - `["data", "items"]` - nested fields
//! - `["accounts", "*", "users"]` - fan out over every element
//! - `["results", "0"]` - array index (negative counts from the end)
//! - `["$.data[*]"]` - JSONPath

mod extractor;
mod selector;

pub use extractor::DpathExtractor;
pub use selector::{AddedField, RecordFilter, RecordSelector, RecordTransformation};
