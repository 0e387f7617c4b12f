//! Per-partition requester
//!
//! Resolves the declared request for a slice and page, sends it, classifies
//! the outcome, and retries with backoff until the error handler settles on
//! success, ignore, or failure.

use super::client::HttpClient;
use super::request::{PreparedRequest, RequestBody, RequestOptions};
use super::response::HttpResponse;
use crate::auth::Authenticator;
use crate::error::{Error, Result};
use crate::partition::StreamSlice;
use crate::retry::{ErrorHandler, Outcome, ResponseAction, Sleeper};
use crate::template::{render_value, InterpolatedString, TemplateContext};
use crate::types::{value_to_string, JsonObject, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Declared HTTP request of a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequesterDefinition {
    /// Base URL
    pub url_base: InterpolatedString,
    /// Path appended to the base URL
    #[serde(default)]
    pub path: InterpolatedString,
    /// HTTP method
    #[serde(default)]
    pub http_method: Method,
    /// Header templates
    #[serde(default)]
    pub request_headers: BTreeMap<String, InterpolatedString>,
    /// Query parameter templates
    #[serde(default)]
    pub request_parameters: BTreeMap<String, InterpolatedString>,
    /// JSON body; every string inside is a template
    #[serde(default)]
    pub request_body_json: Option<Value>,
    /// Form body templates
    #[serde(default)]
    pub request_body_data: BTreeMap<String, InterpolatedString>,
    /// Response classification and retry policy
    #[serde(default)]
    pub error_handler: ErrorHandler,
    /// Manifest `$parameters`, exposed to templates as `parameters`
    #[serde(default, rename = "$parameters", skip_serializing_if = "JsonObject::is_empty")]
    pub parameters: JsonObject,
}

impl RequesterDefinition {
    /// Definition for a GET against `url_base` + `path`
    pub fn get(url_base: &str, path: &str) -> Result<Self> {
        Ok(Self {
            url_base: InterpolatedString::new(url_base)?,
            path: InterpolatedString::new(path)?,
            http_method: Method::GET,
            request_headers: BTreeMap::new(),
            request_parameters: BTreeMap::new(),
            request_body_json: None,
            request_body_data: BTreeMap::new(),
            error_handler: ErrorHandler::default(),
            parameters: JsonObject::new(),
        })
    }

    /// Add a query parameter template
    pub fn with_parameter(mut self, name: &str, template: &str) -> Result<Self> {
        self.request_parameters
            .insert(name.to_string(), InterpolatedString::new(template)?);
        Ok(self)
    }

    /// Add a header template
    pub fn with_header(mut self, name: &str, template: &str) -> Result<Self> {
        self.request_headers
            .insert(name.to_string(), InterpolatedString::new(template)?);
        Ok(self)
    }

    /// Replace the error handler
    #[must_use]
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }
}

/// Services shared by every requester of a source
#[derive(Debug, Clone)]
pub struct HttpRuntime {
    /// Shared HTTP client
    pub client: Arc<HttpClient>,
    /// Credentials
    pub authenticator: Arc<dyn Authenticator>,
    /// Connector configuration
    pub config: Arc<Value>,
    /// Backoff sleeper
    pub sleeper: Arc<dyn Sleeper>,
    /// Global cancellation
    pub cancel: CancellationToken,
}

/// Requester bound to one stream; created per partition
#[derive(Debug)]
pub struct Requester {
    stream: Arc<str>,
    definition: Arc<RequesterDefinition>,
    runtime: HttpRuntime,
    last_response: Option<HttpResponse>,
    last_attempts: u32,
}

impl Requester {
    /// Create a requester
    pub fn new(stream: Arc<str>, definition: Arc<RequesterDefinition>, runtime: HttpRuntime) -> Self {
        Self {
            stream,
            definition,
            runtime,
            last_response: None,
            last_attempts: 0,
        }
    }

    /// The last response received, including ignored ones
    pub fn last_response(&self) -> Option<&HttpResponse> {
        self.last_response.as_ref()
    }

    /// Attempts spent on the last logical request
    pub fn last_attempts(&self) -> u32 {
        self.last_attempts
    }

    /// Resolve the outgoing request for a slice and page
    pub async fn prepare(
        &self,
        slice: &StreamSlice,
        options: &RequestOptions,
        next_page_token: &Value,
        stream_state: &Value,
    ) -> Result<PreparedRequest> {
        let mut ctx = TemplateContext::with_config((*self.runtime.config).clone());
        ctx.set_state(stream_state.clone())
            .set_slice(slice.partition_value(), slice.cursor_value())
            .set_page_token(next_page_token.clone())
            .set_parameters(Value::Object(self.definition.parameters.clone()));

        let mut query = BTreeMap::new();
        for (name, template) in &self.definition.request_parameters {
            let value = value_to_string(&template.eval(&ctx)?);
            if !value.is_empty() {
                query.insert(name.clone(), value);
            }
        }

        let url = match options.path {
            Some(ref next) if next.starts_with("http://") || next.starts_with("https://") => {
                let mut next_url = Url::parse(next)?;
                query.extend(
                    next_url
                        .query_pairs()
                        .map(|(k, v)| (k.into_owned(), v.into_owned())),
                );
                next_url.set_query(None);
                next_url.to_string()
            }
            Some(ref path) => join_url(&self.definition.url_base.render(&ctx)?, path),
            None => join_url(
                &self.definition.url_base.render(&ctx)?,
                &self.definition.path.render(&ctx)?,
            ),
        };

        let mut request = PreparedRequest::new(self.definition.http_method, url);
        request.query = query;

        for (name, template) in &self.definition.request_headers {
            let value = template.render(&ctx)?;
            if !value.is_empty() {
                request.headers.insert(name.clone(), value);
            }
        }

        if let Some(ref body) = self.definition.request_body_json {
            request.body = Some(RequestBody::Json(render_value(body, &ctx)?));
        } else if !self.definition.request_body_data.is_empty() {
            let mut form = BTreeMap::new();
            for (name, template) in &self.definition.request_body_data {
                form.insert(name.clone(), template.render(&ctx)?);
            }
            request.body = Some(RequestBody::Form(form));
        }

        let mut injected = options.clone();
        injected.path = None;
        request.apply_options(&injected)?;
        self.runtime.authenticator.apply(&mut request).await?;
        Ok(request)
    }

    /// Send the request for a slice and page, retrying as the error handler directs
    ///
    /// Returns `Ok(None)` when the response is ignored.
    pub async fn execute(
        &mut self,
        slice: &StreamSlice,
        options: &RequestOptions,
        next_page_token: &Value,
        stream_state: &Value,
    ) -> Result<Option<HttpResponse>> {
        let request = self
            .prepare(slice, options, next_page_token, stream_state)
            .await?;
        let handler = &self.definition.error_handler;
        let cancel = &self.runtime.cancel;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempt += 1;
            self.last_attempts = attempt;

            let result = self.runtime.client.send(&request, cancel).await;
            let resolution = match &result {
                Ok(response) => handler.classify(&Outcome::Response(response), &self.runtime.config),
                Err(error) => handler.classify(&Outcome::Error(error), &self.runtime.config),
            };
            let last_status = match &result {
                Ok(response) => Some(response.status),
                Err(error) => error.status(),
            };

            match (resolution.action, result) {
                (ResponseAction::Success, Ok(response)) => {
                    self.last_response = Some(response.clone());
                    return Ok(Some(response));
                }
                (ResponseAction::Ignore, result) => {
                    info!(
                        stream = %self.stream,
                        partition = %slice.key(),
                        status = ?last_status,
                        reason = resolution.message.as_deref().unwrap_or(""),
                        "Ignoring response"
                    );
                    self.last_response = result.ok();
                    return Ok(None);
                }
                (ResponseAction::Fail | ResponseAction::Success, Err(error)) => {
                    return Err(error.with_attempts(attempt))
                }
                (ResponseAction::Fail, Ok(response)) => {
                    self.last_response = Some(response.clone());
                    return Err(Error::http_status(
                        response.status,
                        resolution
                            .message
                            .unwrap_or_else(|| response.text()),
                    )
                    .with_attempts(attempt));
                }
                (ResponseAction::Retry, result) => {
                    let response = result.ok();
                    if attempt > handler.max_retries {
                        self.last_response = response;
                        return Err(Error::MaxRetriesExceeded {
                            stream: self.stream.to_string(),
                            partition: slice.key().to_string(),
                            attempts: attempt,
                            last_status,
                        });
                    }
                    let delay = handler
                        .backoff(response.as_ref(), attempt - 1)
                        .map_err(|e| Error::partition(self.stream.as_ref(), e.to_string()))?;
                    warn!(
                        stream = %self.stream,
                        partition = %slice.key(),
                        attempt,
                        max_attempts = handler.max_retries + 1,
                        status = ?last_status,
                        delay_ms = delay.as_millis() as u64,
                        reason = resolution.message.as_deref().unwrap_or(""),
                        "Retrying request"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(Error::Cancelled),
                        () = self.runtime.sleeper.sleep(delay) => {}
                    }
                    debug!(stream = %self.stream, attempt = attempt + 1, "Re-sending request");
                }
            }
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
