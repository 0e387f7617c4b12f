//! Response classification and backoff computation

use super::types::{ErrorResolution, Outcome, ResponseAction};
use crate::error::{Error, Result};
use crate::http::HttpResponse;
use crate::template::{InterpolatedString, TemplateContext};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default exponential backoff factor, in seconds
pub const DEFAULT_BACKOFF_FACTOR: f64 = 5.0;

/// Upper bound for the default exponential policy
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(600);

// ============================================================================
// Response Filters
// ============================================================================

/// Maps matching responses to an action
///
/// A filter matches when any of its conditions match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponseFilter {
    /// Action for matching responses
    pub action: ResponseAction,
    /// Status codes that match
    #[serde(default)]
    pub http_codes: Vec<u16>,
    /// Substring of the body that matches
    #[serde(default)]
    pub error_message_contains: Option<String>,
    /// Condition over `response` and `headers`
    #[serde(default)]
    pub predicate: Option<InterpolatedString>,
    /// Message reported when this filter fires
    #[serde(default)]
    pub error_message: Option<InterpolatedString>,
}

impl HttpResponseFilter {
    /// Filter matching a list of status codes
    pub fn for_codes(action: ResponseAction, codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            action,
            http_codes: codes.into_iter().collect(),
            error_message_contains: None,
            predicate: None,
            error_message: None,
        }
    }

    fn matches(&self, response: &HttpResponse, ctx: &TemplateContext) -> Result<bool> {
        if self.http_codes.contains(&response.status) {
            return Ok(true);
        }
        if let Some(ref needle) = self.error_message_contains {
            if response.text().contains(needle.as_str()) {
                return Ok(true);
            }
        }
        match self.predicate {
            Some(ref predicate) => predicate.eval_bool(ctx),
            None => Ok(false),
        }
    }
}

// ============================================================================
// Backoff Strategies
// ============================================================================

/// Computes the delay before a retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay
    #[serde(alias = "ConstantBackoffStrategy")]
    Constant {
        /// Delay in seconds
        backoff_time_in_seconds: f64,
    },
    /// `factor * 2^attempt` seconds, optionally capped
    #[serde(alias = "ExponentialBackoffStrategy")]
    Exponential {
        /// Base factor in seconds
        #[serde(default = "default_factor")]
        factor: f64,
        /// Cap in seconds
        #[serde(default)]
        max_seconds: Option<f64>,
    },
    /// Delay read from a response header such as `Retry-After`
    #[serde(alias = "WaitTimeFromHeader")]
    WaitTimeFromHeader {
        /// Header name
        header: String,
        /// Pattern whose first match (or first group) holds the seconds
        #[serde(default)]
        regex: Option<String>,
        /// Fail instead of waiting longer than this
        #[serde(default)]
        max_waiting_time_in_seconds: Option<f64>,
    },
}

fn default_factor() -> f64 {
    DEFAULT_BACKOFF_FACTOR
}

impl BackoffStrategy {
    /// Delay for a given attempt (0-based), or `None` if this strategy has no opinion
    pub fn backoff(&self, response: Option<&HttpResponse>, attempt: u32) -> Result<Option<Duration>> {
        match self {
            BackoffStrategy::Constant {
                backoff_time_in_seconds,
            } => Ok(Some(seconds(*backoff_time_in_seconds))),
            BackoffStrategy::Exponential {
                factor,
                max_seconds,
            } => {
                let delay = factor * 2f64.powi(attempt.min(30) as i32);
                let delay = max_seconds.map_or(delay, |max| delay.min(max));
                Ok(Some(seconds(delay)))
            }
            BackoffStrategy::WaitTimeFromHeader {
                header,
                regex,
                max_waiting_time_in_seconds,
            } => {
                let Some(raw) = response.and_then(|r| r.header(header)) else {
                    return Ok(None);
                };
                let Some(wait) = parse_wait_time(raw, regex.as_deref())? else {
                    return Ok(None);
                };
                if let Some(max) = max_waiting_time_in_seconds {
                    if wait > *max {
                        return Err(Error::transient(format!(
                            "Header {header} asks to wait {wait}s, more than the allowed {max}s"
                        )));
                    }
                }
                Ok(Some(seconds(wait)))
            }
        }
    }
}

fn parse_wait_time(raw: &str, pattern: Option<&str>) -> Result<Option<f64>> {
    let text = match pattern {
        Some(pattern) => {
            let re = Regex::new(pattern)
                .map_err(|e| Error::config(format!("Invalid backoff regex '{pattern}': {e}")))?;
            match re.captures(raw) {
                Some(caps) => caps
                    .get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string()),
                None => None,
            }
        }
        None => Some(raw.trim().to_string()),
    };
    Ok(text.and_then(|t| t.parse::<f64>().ok()).filter(|w| *w >= 0.0))
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(DEFAULT_MAX_BACKOFF)
}

// ============================================================================
// Error Handler
// ============================================================================

/// Classifies exchange outcomes and computes retry delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorHandler {
    /// Filters checked in order before the default mapping
    #[serde(default)]
    pub response_filters: Vec<HttpResponseFilter>,
    /// Backoff strategies checked in order; the first `Some` wins
    #[serde(default)]
    pub backoff_strategies: Vec<BackoffStrategy>,
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self {
            response_filters: Vec::new(),
            backoff_strategies: Vec::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ErrorHandler {
    /// Create a handler with default mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response filter
    #[must_use]
    pub fn with_filter(mut self, filter: HttpResponseFilter) -> Self {
        self.response_filters.push(filter);
        self
    }

    /// Add a backoff strategy
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategies.push(strategy);
        self
    }

    /// Set max retries
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Classify the outcome of one exchange
    pub fn classify(&self, outcome: &Outcome<'_>, config: &Value) -> ErrorResolution {
        match outcome {
            Outcome::Response(response) => self.classify_response(response, config),
            Outcome::Error(Error::Cancelled) => {
                ErrorResolution::new(ResponseAction::Fail).with_message("cancelled")
            }
            Outcome::Error(error) if error.is_retryable() => {
                ErrorResolution::new(ResponseAction::Retry).with_message(error.to_string())
            }
            Outcome::Error(error) => {
                ErrorResolution::new(ResponseAction::Fail).with_message(error.to_string())
            }
        }
    }

    fn classify_response(&self, response: &HttpResponse, config: &Value) -> ErrorResolution {
        if !self.response_filters.is_empty() {
            let mut ctx = TemplateContext::with_config(config.clone());
            ctx.set_response(response.json_or_null(), response.headers_value());

            for filter in &self.response_filters {
                match filter.matches(response, &ctx) {
                    Ok(true) => {
                        let message = filter
                            .error_message
                            .as_ref()
                            .and_then(|m| m.render(&ctx).ok())
                            .unwrap_or_else(|| "matched response filter".to_string());
                        return ErrorResolution::new(filter.action).with_message(message);
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Response filter predicate failed"),
                }
            }
        }

        default_resolution(response)
    }

    /// Delay before retry `attempt` (0-based)
    ///
    /// Strategies are consulted in order. With no opinion from any of them a
    /// numeric `Retry-After` header is honored, then the default exponential
    /// policy applies, so the delay is never skipped.
    pub fn backoff(&self, response: Option<&HttpResponse>, attempt: u32) -> Result<Duration> {
        for strategy in &self.backoff_strategies {
            if let Some(delay) = strategy.backoff(response, attempt)? {
                return Ok(delay);
            }
        }
        if let Some(wait) = response.and_then(retry_after) {
            return Ok(wait.min(DEFAULT_MAX_BACKOFF));
        }
        Ok(default_backoff(attempt))
    }
}

/// Default mapping: 2xx succeed, 429 and 5xx retry, everything else fails
fn default_resolution(response: &HttpResponse) -> ErrorResolution {
    match response.status {
        200..=299 => ErrorResolution::new(ResponseAction::Success),
        429 => ErrorResolution::new(ResponseAction::Retry)
            .with_message(format!("rate limited ({})", truncate(&response.text()))),
        500..=599 => ErrorResolution::new(ResponseAction::Retry)
            .with_message(truncate(&response.text())),
        _ => ErrorResolution::new(ResponseAction::Fail).with_message(truncate(&response.text())),
    }
}

/// Seconds from a numeric `Retry-After` header; HTTP dates are not honored
fn retry_after(response: &HttpResponse) -> Option<Duration> {
    let raw = response.header("Retry-After")?;
    parse_wait_time(raw, None).ok().flatten().map(seconds)
}

/// Default exponential backoff: `5s * 2^attempt`, capped
pub fn default_backoff(attempt: u32) -> Duration {
    let delay = DEFAULT_BACKOFF_FACTOR * 2f64.powi(attempt.min(30) as i32);
    seconds(delay).min(DEFAULT_MAX_BACKOFF)
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}
