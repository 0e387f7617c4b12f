//! HTTP module
//!
//! Provides the requester, the shared HTTP client, and the request and
//! response types passed between them.
//!
//! # Features
//!
//! - **Deterministic Requests**: Requests are resolved once and re-sent unchanged
//! - **Materialized Responses**: Status, headers and body are read exactly once
//! - **Retries**: Driven by the [`crate::retry`] classifier with interruptible backoff
//! - **Rate Limiting**: Token bucket rate limiter using governor

mod client;
mod rate_limit;
mod request;
mod requester;
mod response;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use request::{InjectInto, PreparedRequest, RequestBody, RequestOption, RequestOptions};
pub use requester::{HttpRuntime, Requester, RequesterDefinition};
pub use response::HttpResponse;
