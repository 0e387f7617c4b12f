//! Record selection: extraction, filtering and transformations

use super::extractor::DpathExtractor;
use crate::error::Result;
use crate::template::{render_value, InterpolatedString, TemplateContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// Keeps records whose condition is truthy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Condition over `record`, `stream_slice`, `stream_state` and `config`
    pub condition: InterpolatedString,
}

impl RecordFilter {
    /// Filter on a condition template
    pub fn new(condition: &str) -> Result<Self> {
        Ok(Self {
            condition: InterpolatedString::new(condition)?,
        })
    }
}

/// Field added by [`RecordTransformation::AddFields`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedField {
    /// Path of the new field
    pub path: Vec<String>,
    /// Value; strings are templates over `record` and the slice
    pub value: Value,
}

/// Reshapes a selected record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordTransformation {
    /// Set fields, creating intermediate objects
    #[serde(alias = "AddFields")]
    AddFields {
        /// Fields to set
        fields: Vec<AddedField>,
    },
    /// Remove fields by path
    #[serde(alias = "RemoveFields")]
    RemoveFields {
        /// Paths to remove
        field_pointers: Vec<Vec<String>>,
    },
}

impl RecordTransformation {
    fn apply(&self, record: &mut Value, ctx: &TemplateContext) -> Result<()> {
        match self {
            RecordTransformation::AddFields { fields } => {
                for field in fields {
                    let value = render_value(&field.value, ctx)?;
                    set_path(record, &field.path, value);
                }
            }
            RecordTransformation::RemoveFields { field_pointers } => {
                for pointer in field_pointers {
                    remove_path(record, pointer);
                }
            }
        }
        Ok(())
    }
}

fn set_path(record: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = record;
    for key in parents {
        current = match current {
            Value::Object(map) => map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new())),
            _ => return,
        };
    }
    if let Value::Object(map) = current {
        map.insert(last.clone(), value);
    }
}

fn remove_path(record: &mut Value, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = record;
    for key in parents {
        match current.get_mut(key) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Value::Object(map) = current {
        map.remove(last);
    }
}

/// Extractor plus optional filter and transformations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSelector {
    /// Where records live in a decoded mapping
    #[serde(default)]
    pub extractor: DpathExtractor,
    /// Optional record filter
    #[serde(default)]
    pub record_filter: Option<RecordFilter>,
    /// Applied in order to every kept record
    #[serde(default)]
    pub transformations: Vec<RecordTransformation>,
}

impl RecordSelector {
    /// Selector over an extractor
    pub fn new(extractor: DpathExtractor) -> Self {
        Self {
            extractor,
            record_filter: None,
            transformations: Vec::new(),
        }
    }

    /// Add a filter
    #[must_use]
    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.record_filter = Some(filter);
        self
    }

    /// Add a transformation
    #[must_use]
    pub fn with_transformation(mut self, transformation: RecordTransformation) -> Self {
        self.transformations.push(transformation);
        self
    }

    /// Select records from decoded mappings, preserving order
    pub fn select<I>(&self, documents: I, ctx: &TemplateContext) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut record_ctx = ctx.clone();
        let mut selected = Vec::new();

        for document in documents {
            for mut record in self.extractor.extract(&document, ctx)? {
                if self.record_filter.is_some() || !self.transformations.is_empty() {
                    record_ctx.set_record(record.clone());
                }
                if let Some(ref filter) = self.record_filter {
                    if !filter.condition.eval_bool(&record_ctx)? {
                        trace!("Record dropped by filter");
                        continue;
                    }
                }
                for transformation in &self.transformations {
                    transformation.apply(&mut record, &record_ctx)?;
                }
                selected.push(record);
            }
        }
        Ok(selected)
    }
}
