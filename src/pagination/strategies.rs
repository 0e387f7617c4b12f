//! Pagination strategies
//!
//! Each strategy decides how the next page token is derived from the last
//! response and when pagination ends.

use crate::template::InterpolatedString;
use serde::{Deserialize, Serialize};

fn default_start_page() -> u64 {
    1
}

fn default_link_header() -> String {
    "Link".to_string()
}

fn default_rel() -> String {
    "next".to_string()
}

/// How the next page token is computed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginationStrategy {
    /// Page numbers counting up from `start_from_page`
    ///
    /// Stops on the first empty page; a short page does not stop.
    #[serde(alias = "PageIncrement")]
    PageIncrement {
        /// First page number, usually 0 or 1
        #[serde(default = "default_start_page")]
        start_from_page: u64,
        /// Page size injected with the page size option
        #[serde(default)]
        page_size: Option<u64>,
        /// Also send the first page number on the first request
        #[serde(default)]
        inject_on_first_request: bool,
    },

    /// Cursor read from the response body or headers
    ///
    /// `cursor_value` sees `response`, `headers`, `last_record` and
    /// `last_page_size`. An absent, null or empty value stops.
    #[serde(alias = "CursorPagination", alias = "CursorFromBody")]
    CursorFromBody {
        /// Template producing the next cursor
        cursor_value: InterpolatedString,
        /// Optional condition; truthy stops
        #[serde(default)]
        stop_condition: Option<InterpolatedString>,
        /// Page size injected with the page size option
        #[serde(default)]
        page_size: Option<u64>,
    },

    /// Next URL from a `Link` header relation
    #[serde(alias = "HeaderLink", alias = "link_header")]
    HeaderLink {
        /// Header carrying the links
        #[serde(default = "default_link_header")]
        header: String,
        /// Relation to follow
        #[serde(default = "default_rel")]
        rel: String,
    },

    /// Record offsets in steps of `page_size`
    ///
    /// Stops on a short or empty page.
    #[serde(alias = "OffsetIncrement")]
    OffsetIncrement {
        /// Records per page
        page_size: u64,
        /// Also send offset 0 on the first request
        #[serde(default)]
        inject_on_first_request: bool,
    },

    /// Single request
    #[default]
    #[serde(alias = "NoPagination")]
    NoPagination,
}

impl PaginationStrategy {
    /// Page increment from a start page
    pub fn page_increment(start_from_page: u64) -> Self {
        Self::PageIncrement {
            start_from_page,
            page_size: None,
            inject_on_first_request: false,
        }
    }

    /// Cursor read by a template
    pub fn cursor(cursor_value: &str) -> crate::error::Result<Self> {
        Ok(Self::CursorFromBody {
            cursor_value: InterpolatedString::new(cursor_value)?,
            stop_condition: None,
            page_size: None,
        })
    }

    /// Follow `rel="next"` in the `Link` header
    pub fn link_header() -> Self {
        Self::HeaderLink {
            header: default_link_header(),
            rel: default_rel(),
        }
    }

    /// Offsets in steps of `page_size`
    pub fn offset(page_size: u64) -> Self {
        Self::OffsetIncrement {
            page_size,
            inject_on_first_request: false,
        }
    }

    /// Declared page size, if any
    pub fn page_size(&self) -> Option<u64> {
        match self {
            Self::PageIncrement { page_size, .. } | Self::CursorFromBody { page_size, .. } => {
                *page_size
            }
            Self::OffsetIncrement { page_size, .. } => Some(*page_size),
            Self::HeaderLink { .. } | Self::NoPagination => None,
        }
    }
}

/// Parse a Link header and extract the URL for the given rel
///
/// Format: `<https://api.example.com/items?page=2>; rel="next", <...>; rel="prev"`.
/// A relation may list several space-separated values.
pub(crate) fn parse_link_header(header: &str, target_rel: &str) -> Option<String> {
    for part in split_link_entries(header) {
        let part = part.trim();
        let Some(rest) = part.strip_prefix('<') else {
            continue;
        };
        let Some((url, params)) = rest.split_once('>') else {
            continue;
        };

        let rel = params
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("rel="))
            .map(|r| r.trim_matches('"').trim_matches('\''))
            .next();

        if let Some(r) = rel {
            if r.split_whitespace().any(|r| r == target_rel) {
                return Some(url.to_string());
            }
        }
    }

    None
}

/// Split a Link header on the commas between entries; commas inside `<...>` belong to the URL
fn split_link_entries(header: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut in_url = false;
    let mut from = 0;
    for (idx, c) in header.char_indices() {
        match c {
            '<' => in_url = true,
            '>' => in_url = false,
            ',' if !in_url => {
                entries.push(&header[from..idx]);
                from = idx + 1;
            }
            _ => {}
        }
    }
    entries.push(&header[from..]);
    entries
}
