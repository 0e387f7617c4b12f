//! Pagination types
//!
//! Tokens and the immutable paginator definition shared by every partition.

use super::strategies::PaginationStrategy;
use crate::http::RequestOption;
use crate::types::JsonValue;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Token identifying the next page
#[derive(Debug, Clone, PartialEq)]
pub enum PageToken {
    /// Page number
    Page(u64),
    /// Record offset
    Offset(u64),
    /// Opaque cursor read from the response
    Cursor(JsonValue),
    /// Absolute URL of the next page
    NextUrl(String),
}

impl PageToken {
    /// Value injected into the request and exposed to templates
    pub fn value(&self) -> JsonValue {
        match self {
            PageToken::Page(n) | PageToken::Offset(n) => json!(n),
            PageToken::Cursor(v) => v.clone(),
            PageToken::NextUrl(url) => JsonValue::String(url.clone()),
        }
    }

    /// Template root `next_page_token` for a possibly absent token
    pub fn context(token: Option<&PageToken>) -> JsonValue {
        match token {
            Some(token) => json!({ "next_page_token": token.value() }),
            None => JsonValue::Null,
        }
    }
}

/// Declared pagination of a stream
///
/// Immutable; a stateful [`Paginator`](super::Paginator) is created from it
/// for every partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginatorDefinition {
    /// How the next token is computed
    #[serde(default, alias = "pagination_strategy")]
    pub strategy: PaginationStrategy,
    /// Where the token goes on the request
    #[serde(default)]
    pub page_token_option: Option<RequestOption>,
    /// Where the page size goes on the request
    #[serde(default)]
    pub page_size_option: Option<RequestOption>,
}

impl PaginatorDefinition {
    /// Definition over a strategy with no injection
    pub fn new(strategy: PaginationStrategy) -> Self {
        Self {
            strategy,
            page_token_option: None,
            page_size_option: None,
        }
    }

    /// Inject the token with this option
    #[must_use]
    pub fn with_page_token_option(mut self, option: RequestOption) -> Self {
        self.page_token_option = Some(option);
        self
    }

    /// Inject the page size with this option
    #[must_use]
    pub fn with_page_size_option(mut self, option: RequestOption) -> Self {
        self.page_size_option = Some(option);
        self
    }
}
