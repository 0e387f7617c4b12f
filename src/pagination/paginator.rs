//! Per-partition paginator state

use super::strategies::{parse_link_header, PaginationStrategy};
use super::types::{PageToken, PaginatorDefinition};
use crate::error::{Error, Result};
use crate::http::{HttpResponse, InjectInto, RequestOptions};
use crate::template::TemplateContext;
use crate::types::{value_to_string, JsonValue};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

impl PaginatorDefinition {
    /// Create the paginator for one partition
    pub fn create(self: &Arc<Self>, config: Arc<JsonValue>) -> Paginator {
        let (page, offset) = match self.strategy {
            PaginationStrategy::PageIncrement {
                start_from_page, ..
            } => (start_from_page, 0),
            _ => (0, 0),
        };
        Paginator {
            definition: Arc::clone(self),
            config,
            page,
            offset,
            pages_read: 0,
        }
    }
}

/// Stateful paginator for one partition's page loop
///
/// Created fresh for every partition; there is no way to rewind it.
#[derive(Debug)]
pub struct Paginator {
    definition: Arc<PaginatorDefinition>,
    config: Arc<JsonValue>,
    page: u64,
    offset: u64,
    pages_read: u64,
}

impl Paginator {
    /// Token for the first request, if the strategy injects one
    pub fn initial_token(&self) -> Option<PageToken> {
        match self.definition.strategy {
            PaginationStrategy::PageIncrement {
                inject_on_first_request: true,
                ..
            } => Some(PageToken::Page(self.page)),
            PaginationStrategy::OffsetIncrement {
                inject_on_first_request: true,
                ..
            } => Some(PageToken::Offset(self.offset)),
            _ => None,
        }
    }

    /// Pages processed so far
    pub fn pages_read(&self) -> u64 {
        self.pages_read
    }

    /// Compute the token of the next page, or `None` when pagination is done
    pub fn next_page_token(
        &mut self,
        response: &HttpResponse,
        records_count: usize,
        last_record: Option<&JsonValue>,
    ) -> Result<Option<PageToken>> {
        self.pages_read += 1;
        let count = records_count as u64;

        let token = match self.definition.strategy {
            PaginationStrategy::NoPagination => None,
            PaginationStrategy::PageIncrement { .. } => {
                if records_count == 0 {
                    None
                } else {
                    self.page += 1;
                    Some(PageToken::Page(self.page))
                }
            }
            PaginationStrategy::OffsetIncrement { page_size, .. } => {
                if records_count == 0 || count < page_size {
                    None
                } else {
                    self.offset += count;
                    Some(PageToken::Offset(self.offset))
                }
            }
            PaginationStrategy::HeaderLink { ref header, ref rel } => response
                .header(header)
                .and_then(|links| parse_link_header(links, rel))
                .map(PageToken::NextUrl),
            PaginationStrategy::CursorFromBody {
                ref cursor_value,
                ref stop_condition,
                ..
            } => {
                let mut ctx = TemplateContext::with_config((*self.config).clone());
                ctx.set_response(response.json_or_null(), response.headers_value())
                    .set_record(last_record.cloned().unwrap_or(JsonValue::Null))
                    .set_vars(json!({
                        "last_record": last_record,
                        "last_page_size": records_count,
                    }));

                let stop = match stop_condition {
                    Some(condition) => condition.eval_bool(&ctx)?,
                    None => false,
                };
                if stop {
                    None
                } else {
                    match cursor_value.eval(&ctx) {
                        Ok(JsonValue::Null) | Err(Error::UndefinedVariable { .. }) => None,
                        Ok(JsonValue::String(s)) if s.is_empty() => None,
                        Ok(value) => Some(PageToken::Cursor(value)),
                        Err(e) => return Err(e),
                    }
                }
            }
        };

        debug!(
            page = self.pages_read,
            records = records_count,
            next = ?token,
            "Computed next page token"
        );
        Ok(token)
    }

    /// Request options for a page token and the declared page size
    pub fn request_options(&self, token: Option<&PageToken>) -> RequestOptions {
        let mut options = RequestOptions::new();

        if let (Some(option), Some(size)) = (
            &self.definition.page_size_option,
            self.definition.strategy.page_size(),
        ) {
            options.inject(option, &json!(size));
        }

        match token {
            Some(PageToken::NextUrl(url)) => options.path = Some(url.clone()),
            Some(token) => {
                if let Some(ref option) = self.definition.page_token_option {
                    match option.inject_into {
                        InjectInto::Path => options.path = Some(value_to_string(&token.value())),
                        _ => options.inject(option, &token.value()),
                    }
                }
            }
            None => {}
        }
        options
    }
}
