//! Classification types

use crate::error::Error;
use crate::http::HttpResponse;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with the outcome of one HTTP exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseAction {
    /// Hand the response to the decoder
    Success,
    /// Back off and re-send the same request
    Retry,
    /// Treat the request as terminal without records
    Ignore,
    /// Fail the partition
    Fail,
}

/// Outcome of one exchange, as seen by the classifier
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// A response was received (any status)
    Response(&'a HttpResponse),
    /// No response: network failure, timeout, or cancellation
    Error(&'a Error),
}

impl Outcome<'_> {
    /// HTTP status, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Outcome::Response(response) => Some(response.status),
            Outcome::Error(error) => error.status(),
        }
    }

    /// Response, if one was received
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Outcome::Response(response) => Some(response),
            Outcome::Error(_) => None,
        }
    }
}

/// Classifier verdict for one exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResolution {
    /// Action to take
    pub action: ResponseAction,
    /// Explicit delay before retrying, when a strategy produced one
    pub backoff: Option<Duration>,
    /// Human-readable reason
    pub message: Option<String>,
}

impl ErrorResolution {
    /// Resolution with an action and no message
    pub fn new(action: ResponseAction) -> Self {
        Self {
            action,
            backoff: None,
            message: None,
        }
    }

    /// Attach a message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach a backoff delay
    #[must_use]
    pub fn with_backoff(mut self, backoff: Option<Duration>) -> Self {
        self.backoff = backoff;
        self
    }
}
