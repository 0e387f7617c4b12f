//! Response decoder module
//!
//! Supports: JSON, JSON Lines, no-op
//!
//! # Overview
//!
//! A decoder turns one materialized response body into a sequence of JSON
//! mappings. The sequence is lazy and single-pass: to iterate again, decode
//! the response again. Record extraction happens afterwards, per mapping.

mod decoders;

pub use decoders::{DecodedRecords, Decoder};
