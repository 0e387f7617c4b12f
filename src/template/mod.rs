//! Template interpolation for manifest values
//!
//! Handles `{{ expression }}` blocks embedded in strings.
//!
//! # Overview
//!
//! Expressions read from named context roots (`config`, `stream_state`,
//! `stream_slice`, `next_page_token`, `record`, `response`, `parameters`)
//! and support attribute and subscript access, literals, comparisons,
//! `and`/`or`/`not`, a handful of built-in functions (`now_utc()`,
//! `day_delta(n)`, `format_datetime(v, fmt)`, `max(a, b)`, ...) and filters
//! (`| upper`, `| default('x')`, `| urlencode`, ...).
//!
//! ```rust,ignore
//! use solidafy_declarative::template::{render, TemplateContext};
//!
//! let ctx = TemplateContext::with_config(serde_json::json!({"region": "eu"}));
//! assert_eq!(render("https://{{ config.region }}.example.com", &ctx)?, "https://eu.example.com");
//! ```

mod context;
mod eval;
mod expr;
mod interpolate;

pub use context::TemplateContext;
pub use eval::{compare_values, is_truthy};
pub use interpolate::{eval, has_templates, render, render_optional, render_value, InterpolatedString};

#[cfg(test)]
mod tests;
