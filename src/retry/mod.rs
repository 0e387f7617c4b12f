//! Error and retry classification
//!
//! Maps each HTTP exchange to [`ResponseAction::Success`], `Retry`, `Ignore`
//! or `Fail`, and computes backoff delays.
//!
//! # Default mapping
//!
//! | Outcome | Action |
//! |---------|--------|
//! | 2xx | Success |
//! | 429, 5xx | Retry |
//! | other status | Fail |
//! | timeout / connect / body read error | Retry |
//!
//! Manifest response filters are checked first; the first match wins.
//! Backoff strategies compose in order and fall back to an exponential
//! policy, so a retry never happens without a delay.

mod handler;
mod sleeper;
mod types;

pub use handler::{
    default_backoff, BackoffStrategy, ErrorHandler, HttpResponseFilter, DEFAULT_BACKOFF_FACTOR,
    DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES,
};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};
pub use types::{ErrorResolution, Outcome, ResponseAction};
