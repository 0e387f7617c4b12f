//! Outgoing request types
//!
//! A [`PreparedRequest`] is fully resolved before the first attempt and
//! re-sent unchanged on every retry. All maps are ordered so two requests
//! built from the same inputs compare equal.

use crate::error::{Error, Result};
use crate::types::{value_to_string, JsonObject, JsonValue, Method};
use std::collections::BTreeMap;
use url::Url;

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON body
    Json(JsonValue),
    /// URL-encoded form body
    Form(BTreeMap<String, String>),
}

/// A fully resolved HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL without the query parameters below
    pub url: String,
    /// Query parameters
    pub query: BTreeMap<String, String>,
    /// Request headers
    pub headers: BTreeMap<String, String>,
    /// Optional body
    pub body: Option<RequestBody>,
}

impl PreparedRequest {
    /// Create a request for a method and URL
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Full URL including query parameters
    pub fn full_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Merge request options into the request; options win over existing keys
    pub fn apply_options(&mut self, options: &RequestOptions) -> Result<()> {
        self.query.extend(options.params.clone());
        self.headers.extend(options.headers.clone());
        if !options.body_json.is_empty() {
            let mut body = match self.body.take() {
                Some(RequestBody::Json(JsonValue::Object(map))) => map,
                None => JsonObject::new(),
                Some(other) => {
                    return Err(Error::config(format!(
                        "Cannot inject body_json options into a non-object body: {other:?}"
                    )))
                }
            };
            body.extend(options.body_json.clone());
            self.body = Some(RequestBody::Json(JsonValue::Object(body)));
        }
        if !options.body_data.is_empty() {
            let mut form = match self.body.take() {
                Some(RequestBody::Form(form)) => form,
                None => BTreeMap::new(),
                Some(other) => {
                    return Err(Error::config(format!(
                        "Cannot inject body_data options into a JSON body: {other:?}"
                    )))
                }
            };
            form.extend(options.body_data.clone());
            self.body = Some(RequestBody::Form(form));
        }
        Ok(())
    }
}

// ============================================================================
// Request Options
// ============================================================================

/// Where an injected value goes on the outgoing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectInto {
    /// Query string parameter
    #[default]
    RequestParameter,
    /// HTTP header
    Header,
    /// Top-level field of a JSON body
    BodyJson,
    /// Form field of a URL-encoded body
    BodyData,
    /// Replaces the request path (or the whole URL if absolute)
    Path,
}

/// Declares how a value (page token, page size, partition value) is injected
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RequestOption {
    /// Target location
    #[serde(default)]
    pub inject_into: InjectInto,
    /// Field or header name; ignored for `path`
    #[serde(default)]
    pub field_name: String,
}

impl RequestOption {
    /// Create a request option
    pub fn new(inject_into: InjectInto, field_name: impl Into<String>) -> Self {
        Self {
            inject_into,
            field_name: field_name.into(),
        }
    }
}

/// Request fragments contributed by the paginator, partition router and cursor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Query parameters
    pub params: BTreeMap<String, String>,
    /// Headers
    pub headers: BTreeMap<String, String>,
    /// JSON body fields
    pub body_json: JsonObject,
    /// Form body fields
    pub body_data: BTreeMap<String, String>,
    /// Replacement path or absolute URL
    pub path: Option<String>,
}

impl RequestOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a value according to a request option
    pub fn inject(&mut self, option: &RequestOption, value: &JsonValue) {
        match option.inject_into {
            InjectInto::RequestParameter => {
                self.params
                    .insert(option.field_name.clone(), value_to_string(value));
            }
            InjectInto::Header => {
                self.headers
                    .insert(option.field_name.clone(), value_to_string(value));
            }
            InjectInto::BodyJson => {
                self.body_json
                    .insert(option.field_name.clone(), value.clone());
            }
            InjectInto::BodyData => {
                self.body_data
                    .insert(option.field_name.clone(), value_to_string(value));
            }
            InjectInto::Path => self.path = Some(value_to_string(value)),
        }
    }

    /// Merge another set of options; `other` wins on conflicts
    pub fn merge(&mut self, other: RequestOptions) {
        self.params.extend(other.params);
        self.headers.extend(other.headers);
        self.body_json.extend(other.body_json);
        self.body_data.extend(other.body_data);
        if other.path.is_some() {
            self.path = other.path;
        }
    }

    /// True if nothing would be injected
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
            && self.headers.is_empty()
            && self.body_json.is_empty()
            && self.body_data.is_empty()
            && self.path.is_none()
    }
}
