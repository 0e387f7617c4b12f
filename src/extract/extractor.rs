//! Record extraction from decoded responses

use crate::error::{Error, Result};
use crate::template::{InterpolatedString, TemplateContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extracts records at a path of a decoded mapping
///
/// Segments are templates. `*` fans out over every element or value, a
/// numeric segment indexes into an array, and a single segment starting
/// with `$` is evaluated as JSONPath.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DpathExtractor {
    /// Path segments; empty means the mapping itself
    #[serde(default)]
    pub field_path: Vec<InterpolatedString>,
}

impl DpathExtractor {
    /// Extractor over literal segments
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            field_path: segments
                .into_iter()
                .map(InterpolatedString::new)
                .collect::<Result<_>>()?,
        })
    }

    /// Extract the records of one decoded mapping
    ///
    /// A missing path yields nothing; arrays at the end of the path are
    /// flattened; scalars are skipped.
    pub fn extract(&self, document: &Value, ctx: &TemplateContext) -> Result<Vec<Value>> {
        let path = self
            .field_path
            .iter()
            .map(|segment| segment.render(ctx))
            .collect::<Result<Vec<_>>>()?;

        if let [single] = path.as_slice() {
            if single.starts_with('$') {
                return extract_with_jsonpath(document, single);
            }
        }

        let mut current = vec![document];
        for segment in &path {
            let mut next = Vec::new();
            for value in current {
                match (value, segment.as_str()) {
                    (Value::Array(items), "*") => next.extend(items.iter()),
                    (Value::Object(map), "*") => next.extend(map.values()),
                    (Value::Object(map), key) => next.extend(map.get(key)),
                    (Value::Array(items), key) => next.extend(array_index(items, key)),
                    _ => {}
                }
            }
            current = next;
        }

        let mut records = Vec::new();
        for value in current {
            collect_records(value, &mut records);
        }
        Ok(records)
    }
}

fn array_index<'a>(items: &'a [Value], key: &str) -> Option<&'a Value> {
    let index: i64 = key.parse().ok()?;
    let len = items.len() as i64;
    let index = if index < 0 { len + index } else { index };
    usize::try_from(index).ok().and_then(|i| items.get(i))
}

fn collect_records(value: &Value, records: &mut Vec<Value>) {
    match value {
        Value::Array(items) => records.extend(items.iter().filter(|v| v.is_object()).cloned()),
        Value::Object(_) => records.push(value.clone()),
        _ => {}
    }
}

/// Extract records using jsonpath-rust
fn extract_with_jsonpath(value: &Value, path: &str) -> Result<Vec<Value>> {
    use jsonpath_rust::JsonPath;

    let jp = JsonPath::try_from(path)
        .map_err(|e| Error::json_path(format!("Invalid JSONPath '{path}': {e}")))?;

    let mut records = Vec::new();
    match jp.find(value) {
        Value::Array(found) => {
            for item in &found {
                collect_records(item, &mut records);
            }
        }
        Value::Null => {}
        other => collect_records(&other, &mut records),
    }
    Ok(records)
}
