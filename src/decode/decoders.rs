//! Decoder implementations
//!
//! Each decoder handles a specific response format.

use crate::error::{Error, Result};
use crate::http::HttpResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::Lines;
use tracing::warn;

/// Format of the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decoder {
    /// A JSON document; an array yields one mapping per element
    #[default]
    #[serde(alias = "JsonDecoder")]
    Json,
    /// One JSON document per line
    #[serde(alias = "JsonlDecoder", alias = "jsonl")]
    JsonLines,
    /// Ignores the body and yields one empty mapping
    #[serde(alias = "NoopDecoder")]
    Noop,
}

impl Decoder {
    /// Decode a response body
    ///
    /// Fails only when the body as a whole is unreadable; malformed JSON
    /// Lines are skipped as they are reached.
    pub fn decode<'a>(&self, response: &'a HttpResponse) -> Result<DecodedRecords<'a>> {
        let inner = match self {
            Decoder::Noop => Inner::Values(vec![Value::Object(serde_json::Map::new())].into_iter()),
            Decoder::Json => {
                if response.body.iter().all(u8::is_ascii_whitespace) {
                    Inner::Values(Vec::new().into_iter())
                } else {
                    let value: Value = serde_json::from_slice(&response.body)
                        .map_err(|e| Error::decode(format!("Failed to parse JSON: {e}")))?;
                    match value {
                        Value::Array(items) => Inner::Values(items.into_iter()),
                        Value::Null => Inner::Values(Vec::new().into_iter()),
                        other => Inner::Values(vec![other].into_iter()),
                    }
                }
            }
            Decoder::JsonLines => {
                let text = std::str::from_utf8(&response.body)
                    .map_err(|e| Error::decode(format!("JSON Lines body is not UTF-8: {e}")))?;
                Inner::Lines {
                    lines: text.lines(),
                    line: 0,
                }
            }
        };
        Ok(DecodedRecords { inner })
    }
}

/// Lazy sequence of decoded mappings
#[derive(Debug)]
pub struct DecodedRecords<'a> {
    inner: Inner<'a>,
}

#[derive(Debug)]
enum Inner<'a> {
    Values(std::vec::IntoIter<Value>),
    Lines { lines: Lines<'a>, line: usize },
}

impl Iterator for DecodedRecords<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self.inner {
            Inner::Values(ref mut values) => values.next(),
            Inner::Lines {
                ref mut lines,
                ref mut line,
            } => loop {
                let text = lines.next()?;
                *line += 1;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                match serde_json::from_str(text) {
                    Ok(value) => return Some(value),
                    Err(e) => warn!(line = *line, error = %e, "Skipping malformed JSON line"),
                }
            },
        }
    }
}
