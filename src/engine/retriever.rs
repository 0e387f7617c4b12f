//! Per-partition page loop
//!
//! Requests one page at a time: merge request options, send, decode,
//! select records, then ask the paginator for the next token.

use crate::decode::Decoder;
use crate::error::Result;
use crate::extract::RecordSelector;
use crate::http::{HttpRuntime, RequestOptions, Requester, RequesterDefinition};
use crate::pagination::{PageToken, Paginator, PaginatorDefinition};
use crate::partition::StreamSlice;
use crate::template::TemplateContext;
use crate::types::{JsonValue, Record};
use std::sync::Arc;
use tracing::{debug, trace};

/// How the records of a stream are fetched
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverDefinition {
    /// Declared request
    pub requester: Arc<RequesterDefinition>,
    /// Extraction and filtering
    pub record_selector: RecordSelector,
    /// Pagination
    pub paginator: Arc<PaginatorDefinition>,
    /// Response format
    pub decoder: Decoder,
}

impl RetrieverDefinition {
    /// Retriever around a requester, with identity extraction and no pagination
    pub fn new(requester: RequesterDefinition) -> Self {
        Self {
            requester: Arc::new(requester),
            record_selector: RecordSelector::default(),
            paginator: Arc::new(PaginatorDefinition::default()),
            decoder: Decoder::default(),
        }
    }

    /// Set the record selector
    #[must_use]
    pub fn with_selector(mut self, selector: RecordSelector) -> Self {
        self.record_selector = selector;
        self
    }

    /// Set the paginator
    #[must_use]
    pub fn with_paginator(mut self, paginator: PaginatorDefinition) -> Self {
        self.paginator = Arc::new(paginator);
        self
    }

    /// Set the decoder
    #[must_use]
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }
}

/// Reads the pages of one partition in order
#[derive(Debug)]
pub struct PartitionReader {
    stream: Arc<str>,
    retriever: Arc<RetrieverDefinition>,
    slice: Arc<StreamSlice>,
    requester: Requester,
    paginator: Paginator,
    slice_options: RequestOptions,
    config: Arc<JsonValue>,
    stream_state: JsonValue,
    parameters: JsonValue,
    token: Option<PageToken>,
    done: bool,
}

impl PartitionReader {
    /// Create the reader of a slice
    ///
    /// `stream_state` is the snapshot taken when the partitions were
    /// computed; it does not change while the partition is read.
    pub fn new(
        stream: Arc<str>,
        retriever: Arc<RetrieverDefinition>,
        slice: Arc<StreamSlice>,
        slice_options: RequestOptions,
        stream_state: JsonValue,
        parameters: JsonValue,
        runtime: HttpRuntime,
    ) -> Self {
        let config = Arc::clone(&runtime.config);
        let requester = Requester::new(
            Arc::clone(&stream),
            Arc::clone(&retriever.requester),
            runtime,
        );
        let paginator = retriever.paginator.create(Arc::clone(&config));
        let token = paginator.initial_token();
        Self {
            stream,
            retriever,
            slice,
            requester,
            paginator,
            slice_options,
            config,
            stream_state,
            parameters,
            token,
            done: false,
        }
    }

    /// The slice being read
    pub fn slice(&self) -> &Arc<StreamSlice> {
        &self.slice
    }

    /// Pages read so far
    pub fn pages_read(&self) -> u64 {
        self.paginator.pages_read()
    }

    /// Read the next page
    ///
    /// Returns `None` once pagination is exhausted. An ignored response
    /// yields an empty page and ends the partition.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Record>>> {
        if self.done {
            return Ok(None);
        }

        let mut options = self.slice_options.clone();
        options.merge(self.paginator.request_options(self.token.as_ref()));
        let page_token = PageToken::context(self.token.as_ref());

        let response = self
            .requester
            .execute(&self.slice, &options, &page_token, &self.stream_state)
            .await?;
        let Some(response) = response else {
            self.done = true;
            return Ok(Some(Vec::new()));
        };

        let mut ctx = TemplateContext::with_config((*self.config).clone());
        ctx.set_state(self.stream_state.clone())
            .set_slice(self.slice.partition_value(), self.slice.cursor_value())
            .set_page_token(page_token)
            .set_parameters(self.parameters.clone());

        let documents = self.retriever.decoder.decode(&response)?;
        let data = self.retriever.record_selector.select(documents, &ctx)?;
        trace!(stream = %self.stream, records = data.len(), "Selected records");

        self.token = self
            .paginator
            .next_page_token(&response, data.len(), data.last())?;
        if self.token.is_none() {
            self.done = true;
        }
        debug!(
            stream = %self.stream,
            partition = %self.slice.key(),
            page = self.paginator.pages_read(),
            records = data.len(),
            more = !self.done,
            "Read page"
        );

        Ok(Some(
            data.into_iter()
                .map(|record| Record::new(Arc::clone(&self.stream), record, Arc::clone(&self.slice)))
                .collect(),
        ))
    }
}
