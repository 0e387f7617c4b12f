//! Expression evaluation, built-in functions and filters

use super::context::TemplateContext;
use super::expr::{BinOp, Expr};
use crate::error::{Error, Result};
use crate::types::{format_with_pattern, parse_datetime, value_to_string};
use chrono::{Duration, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// Result of evaluating an expression
///
/// A missing variable is kept distinct from `null` so that `or` and
/// `default` can supply fallbacks while plain lookups still fail loudly.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    /// Lookup of a variable that does not exist, with its dotted path
    Undefined(String),
    /// A concrete value
    Value(Value),
}

impl Evaluated {
    /// Convert into a value, treating undefined as `null`
    pub fn into_value(self) -> Value {
        match self {
            Evaluated::Undefined(_) => Value::Null,
            Evaluated::Value(v) => v,
        }
    }

    /// Convert into a value, failing on undefined variables
    pub fn require(self) -> Result<Value> {
        match self {
            Evaluated::Undefined(path) => Err(Error::undefined_var(path)),
            Evaluated::Value(v) => Ok(v),
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Evaluated::Undefined(_) => false,
            Evaluated::Value(v) => is_truthy(v),
        }
    }
}

/// Truthiness of a JSON value in template conditions
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Evaluate a parsed expression against a context
pub fn evaluate(expr: &Expr, ctx: &TemplateContext) -> Result<Evaluated> {
    match expr {
        Expr::Literal(v) => Ok(Evaluated::Value(v.clone())),
        Expr::Var(name) => Ok(match ctx.lookup(name) {
            Some(v) => Evaluated::Value(v.clone()),
            None => Evaluated::Undefined(name.clone()),
        }),
        Expr::Attr(base, name) => {
            let base_value = evaluate(base, ctx)?;
            Ok(access(base_value, &Value::String(name.clone()), || expr.path()))
        }
        Expr::Index(base, index) => {
            let base_value = evaluate(base, ctx)?;
            let key = evaluate(index, ctx)?.into_value();
            Ok(access(base_value, &key, || expr.path()))
        }
        Expr::List(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, ctx).map(Evaluated::into_value))
                .collect::<Result<Vec<_>>>()?;
            Ok(Evaluated::Value(Value::Array(values)))
        }
        Expr::Not(inner) => Ok(Evaluated::Value(Value::Bool(
            !evaluate(inner, ctx)?.is_truthy(),
        ))),
        Expr::Neg(inner) => {
            let value = evaluate(inner, ctx)?.require()?;
            arithmetic(BinOp::Sub, &Value::from(0), &value).map(Evaluated::Value)
        }
        Expr::Binary(BinOp::Or, left, right) => {
            let l = evaluate(left, ctx)?;
            if l.is_truthy() {
                Ok(l)
            } else {
                evaluate(right, ctx)
            }
        }
        Expr::Binary(BinOp::And, left, right) => {
            let l = evaluate(left, ctx)?;
            if l.is_truthy() {
                evaluate(right, ctx)
            } else {
                Ok(l)
            }
        }
        Expr::Binary(op, left, right) => {
            let l = evaluate(left, ctx)?.into_value();
            let r = evaluate(right, ctx)?.into_value();
            binary(*op, &l, &r).map(Evaluated::Value)
        }
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|arg| evaluate(arg, ctx).map(Evaluated::into_value))
                .collect::<Result<Vec<_>>>()?;
            call_function(name, &values).map(Evaluated::Value)
        }
        Expr::Filter(inner, name, args) => {
            let value = evaluate(inner, ctx)?;
            let values = args
                .iter()
                .map(|arg| evaluate(arg, ctx).map(Evaluated::into_value))
                .collect::<Result<Vec<_>>>()?;
            apply_filter(name, value, &values)
        }
    }
}

fn access(base: Evaluated, key: &Value, path: impl FnOnce() -> String) -> Evaluated {
    let Evaluated::Value(base) = base else {
        return Evaluated::Undefined(path());
    };
    let found = match (&base, key) {
        (Value::Object(map), Value::String(k)) => map.get(k),
        (Value::Array(items), Value::Number(n)) => n.as_i64().and_then(|idx| {
            let len = items.len() as i64;
            let idx = if idx < 0 { len + idx } else { idx };
            usize::try_from(idx).ok().and_then(|i| items.get(i))
        }),
        (Value::Array(items), Value::String(k)) => {
            k.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    };
    match found {
        Some(v) => Evaluated::Value(v.clone()),
        None => Evaluated::Undefined(path()),
    }
}

// ============================================================================
// Operators
// ============================================================================

/// Compare two values: numbers numerically, strings lexicographically
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn binary(op: BinOp, l: &Value, r: &Value) -> Result<Value> {
    let result = match op {
        BinOp::Eq => Value::Bool(values_equal(l, r)),
        BinOp::Ne => Value::Bool(!values_equal(l, r)),
        BinOp::Lt => Value::Bool(compare_values(l, r) == Some(Ordering::Less)),
        BinOp::Le => Value::Bool(matches!(
            compare_values(l, r),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinOp::Gt => Value::Bool(compare_values(l, r) == Some(Ordering::Greater)),
        BinOp::Ge => Value::Bool(matches!(
            compare_values(l, r),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinOp::In => Value::Bool(match r {
            Value::Array(items) => items.iter().any(|item| values_equal(item, l)),
            Value::Object(map) => map.contains_key(&value_to_string(l)),
            Value::String(s) => s.contains(&value_to_string(l)),
            _ => false,
        }),
        BinOp::Concat => Value::String(format!("{}{}", value_to_string(l), value_to_string(r))),
        BinOp::Add => match (l, r) {
            (Value::String(a), Value::String(b)) => Value::String(format!("{a}{b}")),
            (Value::Array(a), Value::Array(b)) => {
                Value::Array(a.iter().chain(b.iter()).cloned().collect())
            }
            _ => arithmetic(op, l, r)?,
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div => arithmetic(op, l, r)?,
        BinOp::Or | BinOp::And => unreachable!("short-circuit operators are handled by evaluate"),
    };
    Ok(result)
}

fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value> {
    let (Some(a), Some(b)) = (as_number(l), as_number(r)) else {
        return Err(Error::template(format!(
            "Arithmetic on non-numeric values: {l} and {r}"
        )));
    };

    if let (Some(x), Some(y)) = (l.as_i64(), r.as_i64()) {
        match op {
            BinOp::Add => return Ok(Value::from(x.saturating_add(y))),
            BinOp::Sub => return Ok(Value::from(x.saturating_sub(y))),
            BinOp::Mul => return Ok(Value::from(x.saturating_mul(y))),
            _ => {}
        }
    }

    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(Error::template("Division by zero"));
            }
            a / b
        }
        _ => return Err(Error::template(format!("Unsupported operator {op:?}"))),
    };
    Ok(Value::from(result))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

// ============================================================================
// Functions
// ============================================================================

fn arg<'a>(name: &str, args: &'a [Value], idx: usize) -> Result<&'a Value> {
    args.get(idx).ok_or_else(|| {
        Error::template(format!("{name}() is missing argument {}", idx + 1))
    })
}

fn to_datetime(name: &str, value: &Value) -> Result<chrono::DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or_else(|| Error::template(format!("{name}(): invalid timestamp {n}"))),
        Value::String(s) => {
            if let Ok(secs) = s.parse::<i64>() {
                if let Some(dt) = Utc.timestamp_opt(secs, 0).single() {
                    return Ok(dt);
                }
            }
            parse_datetime(s).map_err(|e| Error::template(format!("{name}(): {e}")))
        }
        other => Err(Error::template(format!(
            "{name}(): cannot interpret {other} as a datetime"
        ))),
    }
}

fn render_datetime(dt: chrono::DateTime<Utc>, format: Option<&Value>) -> Value {
    match format.and_then(Value::as_str) {
        Some(pattern) => Value::String(format_with_pattern(dt, pattern)),
        None => Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

/// Call a built-in function
pub fn call_function(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "now_utc" => Ok(render_datetime(Utc::now(), args.first())),
        "today_utc" => Ok(Value::String(Utc::now().format("%Y-%m-%d").to_string())),
        "day_delta" => {
            let days = as_number(arg(name, args, 0)?)
                .ok_or_else(|| Error::template("day_delta() expects a number of days"))?;
            let dt = Utc::now() + Duration::seconds((days * 86_400.0) as i64);
            Ok(render_datetime(dt, args.get(1)))
        }
        "format_datetime" => {
            let dt = to_datetime(name, arg(name, args, 0)?)?;
            let format = arg(name, args, 1)?;
            Ok(render_datetime(dt, Some(format)))
        }
        "timestamp" => {
            let dt = to_datetime(name, arg(name, args, 0)?)?;
            Ok(Value::from(dt.timestamp()))
        }
        "max" | "min" => {
            let candidates: Vec<&Value> = match args {
                [Value::Array(items)] => items.iter().collect(),
                _ => args.iter().collect(),
            };
            let want = if name == "max" {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let mut best: Option<&Value> = None;
            for candidate in candidates.into_iter().filter(|v| !v.is_null()) {
                best = match best {
                    Some(current) if compare_values(candidate, current) != Some(want) => {
                        Some(current)
                    }
                    _ => Some(candidate),
                };
            }
            Ok(best.cloned().unwrap_or(Value::Null))
        }
        "str" => Ok(Value::String(value_to_string(arg(name, args, 0)?))),
        "int" => to_int(arg(name, args, 0)?),
        _ => Err(Error::template(format!("Unknown function: {name}"))),
    }
}

fn to_int(value: &Value) -> Result<Value> {
    match value {
        Value::Number(n) if n.is_i64() => Ok(value.clone()),
        _ => as_number(value)
            .map(|f| Value::from(f.trunc() as i64))
            .ok_or_else(|| Error::template(format!("Cannot convert {value} to int"))),
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Apply a filter to an evaluated value
pub fn apply_filter(name: &str, value: Evaluated, args: &[Value]) -> Result<Evaluated> {
    if name == "default" {
        return Ok(match value {
            Evaluated::Value(v) if !v.is_null() => Evaluated::Value(v),
            _ => Evaluated::Value(args.first().cloned().unwrap_or(Value::Null)),
        });
    }

    let value = value.require()?;
    let result = match name {
        "upper" => Value::String(value_to_string(&value).to_uppercase()),
        "lower" => Value::String(value_to_string(&value).to_lowercase()),
        "trim" => Value::String(value_to_string(&value).trim().to_string()),
        "string" => Value::String(value_to_string(&value)),
        "int" => to_int(&value)?,
        "length" => Value::from(match &value {
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            Value::String(s) => s.chars().count(),
            _ => 0,
        }),
        "urlencode" => Value::String(
            url::form_urlencoded::byte_serialize(value_to_string(&value).as_bytes()).collect(),
        ),
        "tojson" => Value::String(serde_json::to_string(&value)?),
        _ => return Err(Error::template(format!("Unknown filter: {name}"))),
    };
    Ok(Evaluated::Value(result))
}
