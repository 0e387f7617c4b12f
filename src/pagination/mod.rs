//! Pagination module
//!
//! Supports: Page Increment, Offset Increment, Cursor (response body or
//! headers), Link Header, No Pagination
//!
//! # Overview
//!
//! A [`PaginatorDefinition`] is parsed once per stream and never changes.
//! Each partition creates its own [`Paginator`] which walks the pages of
//! that partition and is dropped with it. Exhaustion is `None`, never an
//! error.

mod paginator;
mod strategies;
mod types;

pub use paginator::Paginator;
pub use strategies::PaginationStrategy;
pub use types::{PageToken, PaginatorDefinition};

#[cfg(test)]
mod tests;
