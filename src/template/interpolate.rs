//! Rendering entry points and pre-parsed templates

use super::context::TemplateContext;
use super::eval::{evaluate, is_truthy, Evaluated};
use super::expr::{parse, Expr};
use crate::error::{Error, Result};
use crate::types::value_to_string;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::sync::LazyLock;

/// Regex for matching template blocks: {{ expression }}
static TEMPLATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("template regex is valid"));

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Expr(Expr),
}

fn parse_segments(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut last = 0;
    for cap in TEMPLATE_REGEX.captures_iter(template) {
        let (Some(whole), Some(body)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        if whole.start() > last {
            segments.push(Segment::Text(template[last..whole.start()].to_string()));
        }
        segments.push(Segment::Expr(parse(body.as_str())?));
        last = whole.end();
    }
    if last < template.len() {
        segments.push(Segment::Text(template[last..].to_string()));
    }
    Ok(segments)
}

fn render_segments(segments: &[Segment], ctx: &TemplateContext) -> Result<String> {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Expr(expr) => out.push_str(&value_to_string(&evaluate(expr, ctx)?.require()?)),
        }
    }
    Ok(out)
}

fn eval_segments(segments: &[Segment], ctx: &TemplateContext) -> Result<Value> {
    match segments {
        [Segment::Expr(expr)] => evaluate(expr, ctx)?.require(),
        _ => render_segments(segments, ctx).map(Value::String),
    }
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    if !has_templates(template) {
        return Ok(template.to_string());
    }
    render_segments(&parse_segments(template)?, ctx)
}

/// Evaluate a template, keeping the type when it is a single expression
///
/// `"{{ config.page_size }}"` yields a number, while `"size={{ config.page_size }}"`
/// yields a string.
pub fn eval(template: &str, ctx: &TemplateContext) -> Result<Value> {
    if !has_templates(template) {
        return Ok(Value::String(template.to_string()));
    }
    eval_segments(&parse_segments(template)?, ctx)
}

/// Render a template, leaving undefined or invalid blocks untouched
pub fn render_optional(template: &str, ctx: &TemplateContext) -> String {
    TEMPLATE_REGEX
        .replace_all(template, |cap: &regex::Captures<'_>| {
            let original = cap[0].to_string();
            parse(&cap[1])
                .and_then(|expr| evaluate(&expr, ctx))
                .ok()
                .and_then(|evaluated| match evaluated {
                    Evaluated::Value(v) => Some(value_to_string(&v)),
                    Evaluated::Undefined(_) => None,
                })
                .unwrap_or(original)
        })
        .into_owned()
}

/// Check if a string contains template blocks
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Render all string values in a JSON value
///
/// Strings consisting of a single expression keep the expression's type.
pub fn render_value(value: &Value, ctx: &TemplateContext) -> Result<Value> {
    match value {
        Value::String(s) => eval(s, ctx),
        Value::Object(map) => {
            let mut new_map = serde_json::Map::new();
            for (k, v) in map {
                new_map.insert(render(k, ctx)?, render_value(v, ctx)?);
            }
            Ok(Value::Object(new_map))
        }
        Value::Array(arr) => arr
            .iter()
            .map(|v| render_value(v, ctx))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        _ => Ok(value.clone()),
    }
}

// ============================================================================
// InterpolatedString
// ============================================================================

/// A template string parsed once and evaluated many times
///
/// When a default is set, a missing variable renders the default template
/// instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedString {
    source: String,
    segments: Vec<Segment>,
    default: Option<Box<InterpolatedString>>,
}

impl Default for InterpolatedString {
    fn default() -> Self {
        Self {
            source: String::new(),
            segments: Vec::new(),
            default: None,
        }
    }
}

impl InterpolatedString {
    /// Parse a template
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let source = template.into();
        let segments = parse_segments(&source)?;
        Ok(Self {
            source,
            segments,
            default: None,
        })
    }

    /// Set the default used when a variable is undefined
    pub fn with_default(mut self, default: impl Into<String>) -> Result<Self> {
        self.default = Some(Box::new(Self::new(default)?));
        Ok(self)
    }

    /// Original template text
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True if the template contains no expressions
    pub fn is_static(&self) -> bool {
        !self.segments.iter().any(|s| matches!(s, Segment::Expr(_)))
    }

    /// Render to a string
    pub fn render(&self, ctx: &TemplateContext) -> Result<String> {
        match (render_segments(&self.segments, ctx), &self.default) {
            (Err(Error::UndefinedVariable { .. }), Some(default)) => default.render(ctx),
            (result, _) => result,
        }
    }

    /// Evaluate, keeping the type of single-expression templates
    pub fn eval(&self, ctx: &TemplateContext) -> Result<Value> {
        match (eval_segments(&self.segments, ctx), &self.default) {
            (Err(Error::UndefinedVariable { .. }), Some(default)) => default.eval(ctx),
            (result, _) => result,
        }
    }

    /// Evaluate as a condition; undefined variables are false
    pub fn eval_bool(&self, ctx: &TemplateContext) -> Result<bool> {
        match &self.segments[..] {
            [Segment::Expr(expr)] => Ok(is_truthy(&evaluate(expr, ctx)?.into_value())),
            _ => match self.eval(ctx) {
                Ok(v) => Ok(condition_truthy(&v)),
                Err(Error::UndefinedVariable { .. }) => Ok(false),
                Err(e) => Err(e),
            },
        }
    }
}

fn condition_truthy(value: &Value) -> bool {
    match value {
        Value::String(s) => !matches!(s.trim(), "" | "false" | "False" | "0" | "None" | "null"),
        other => is_truthy(other),
    }
}

impl Serialize for InterpolatedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for InterpolatedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let source = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        InterpolatedString::new(source).map_err(serde::de::Error::custom)
    }
}
