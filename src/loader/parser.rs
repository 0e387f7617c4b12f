//! Manifest parser
//!
//! Manifests are read as YAML (JSON is accepted too) into a JSON tree.
//! `$ref` pointers are resolved against the document, `$parameters` are
//! pushed down from each stream into its components, then the tree is
//! deserialized and validated.

use crate::error::{Error, Result};
use crate::loader::types::{Manifest, StreamDefinition};
use crate::types::{JsonObject, JsonValue};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Keys whose values are components that inherit `$parameters`
const COMPONENT_KEYS: &[&str] = &[
    "retriever",
    "requester",
    "authenticator",
    "error_handler",
    "response_filters",
    "backoff_strategies",
    "record_selector",
    "extractor",
    "record_filter",
    "paginator",
    "pagination_strategy",
    "page_token_option",
    "page_size_option",
    "partition_router",
    "parent_stream_configs",
    "request_option",
    "incremental_sync",
    "start_datetime",
    "end_datetime",
    "start_time_option",
    "end_time_option",
    "schema_loader",
    "transformations",
    "state_migrations",
    "decoder",
];

/// Load a manifest from a YAML or JSON file
///
/// Relative schema file paths resolve against the manifest's directory.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Manifest> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::config(format!("Failed to read manifest '{}': {e}", path.display()))
        }
    })?;
    let mut manifest = load_manifest_from_str(&content)?;
    manifest.base_dir = path.parent().map(Path::to_path_buf);
    Ok(manifest)
}

/// Load a manifest from YAML or JSON text
pub fn load_manifest_from_str(text: &str) -> Result<Manifest> {
    let raw: JsonValue = serde_yaml::from_str(text)
        .map_err(|e| Error::config(format!("Failed to parse manifest: {e}")))?;
    let resolved = resolve_manifest(raw)?;
    let manifest: Manifest = serde_json::from_value(resolved)
        .map_err(|e| Error::config(format!("Invalid manifest: {e}")))?;

    validate_manifest(&manifest)?;
    debug!(
        version = %manifest.version,
        streams = manifest.streams.len(),
        "Loaded manifest"
    );
    Ok(manifest)
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve references and propagate parameters of a raw manifest tree
pub fn resolve_manifest(raw: JsonValue) -> Result<JsonValue> {
    if !raw.is_object() {
        return Err(Error::config("Manifest must be a mapping"));
    }
    let mut resolved = resolve_refs(&raw, &raw, &mut Vec::new())?;

    if let Some(streams) = resolved.get_mut("streams").and_then(JsonValue::as_array_mut) {
        for stream in streams.iter_mut().filter_map(JsonValue::as_object_mut) {
            prepare_stream(stream);
        }
    }
    Ok(resolved)
}

/// Replace every `$ref` with the node it points to
///
/// Keys next to `$ref` override the keys of the referenced mapping.
fn resolve_refs(value: &JsonValue, root: &JsonValue, stack: &mut Vec<String>) -> Result<JsonValue> {
    match value {
        JsonValue::Object(map) => {
            let mut resolved = match map.get("$ref") {
                None => JsonObject::new(),
                Some(JsonValue::String(reference)) => match lookup_ref(reference, root, stack)? {
                    JsonValue::Object(target) => target,
                    other if map.len() == 1 => return Ok(other),
                    _ => {
                        return Err(Error::config(format!(
                            "$ref '{reference}' with sibling keys must point to a mapping"
                        )))
                    }
                },
                Some(other) => {
                    return Err(Error::config(format!("$ref must be a string, got {other}")))
                }
            };
            for (key, child) in map {
                if key != "$ref" {
                    resolved.insert(key.clone(), resolve_refs(child, root, stack)?);
                }
            }
            Ok(JsonValue::Object(resolved))
        }
        JsonValue::Array(items) => items
            .iter()
            .map(|item| resolve_refs(item, root, stack))
            .collect::<Result<Vec<_>>>()
            .map(JsonValue::Array),
        JsonValue::String(s) if s.starts_with("#/") => lookup_ref(s, root, stack),
        other => Ok(other.clone()),
    }
}

/// Resolve `#/definitions/x` or `definitions.x`
fn lookup_ref(reference: &str, root: &JsonValue, stack: &mut Vec<String>) -> Result<JsonValue> {
    let pointer = match reference.strip_prefix('#') {
        Some(pointer) => pointer.to_string(),
        None => format!("/{}", reference.replace('.', "/")),
    };
    if stack.iter().any(|r| r == reference) {
        return Err(Error::config(format!("Circular $ref '{reference}'")));
    }
    let target = root
        .pointer(&pointer)
        .ok_or_else(|| Error::config(format!("Unresolved $ref '{reference}'")))?;

    stack.push(reference.to_string());
    let resolved = resolve_refs(target, root, stack);
    stack.pop();
    resolved
}

fn prepare_stream(stream: &mut JsonObject) {
    let mut parameters = match stream.get("$parameters") {
        Some(JsonValue::Object(own)) => own.clone(),
        _ => JsonObject::new(),
    };
    if let Some(name) = stream.get("name").cloned() {
        parameters.entry("name").or_insert(name);
    }
    stream.insert("$parameters".to_string(), JsonValue::Object(parameters));

    name_parent_streams(stream);
    propagate_parameters(stream, &JsonObject::new());
}

/// Parent configs may embed the whole parent stream; keep only its name
fn name_parent_streams(stream: &mut JsonObject) {
    let Some(configs) = stream
        .get_mut("retriever")
        .and_then(|r| r.get_mut("partition_router"))
        .and_then(|p| p.get_mut("parent_stream_configs"))
        .and_then(JsonValue::as_array_mut)
    else {
        return;
    };
    for config in configs {
        if let Some(name) = config
            .get("stream")
            .and_then(|s| s.get("name"))
            .cloned()
        {
            config["stream"] = name;
        }
    }
}

/// Push parameters down; a component's own parameters win
fn propagate_parameters(node: &mut JsonObject, inherited: &JsonObject) {
    let mut parameters = inherited.clone();
    if let Some(JsonValue::Object(own)) = node.get("$parameters") {
        parameters.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if !parameters.is_empty() {
        node.insert("$parameters".to_string(), JsonValue::Object(parameters.clone()));
    }

    for key in COMPONENT_KEYS {
        match node.get_mut(*key) {
            Some(JsonValue::Object(child)) => propagate_parameters(child, &parameters),
            Some(JsonValue::Array(items)) => {
                for child in items.iter_mut().filter_map(JsonValue::as_object_mut) {
                    propagate_parameters(child, &parameters);
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validate a manifest
fn validate_manifest(manifest: &Manifest) -> Result<()> {
    if manifest.streams.is_empty() {
        return Err(Error::config("Manifest must have at least one stream"));
    }

    let mut names = HashSet::new();
    for stream in &manifest.streams {
        validate_stream(stream)?;
        if !names.insert(stream.name.as_str()) {
            return Err(Error::config(format!(
                "Duplicate stream name '{}'",
                stream.name
            )));
        }
    }

    for name in &manifest.check.stream_names {
        if !names.contains(name.as_str()) {
            return Err(Error::config(format!(
                "Check stream '{name}' is not defined"
            )));
        }
    }

    for stream in &manifest.streams {
        for parent in stream.parent_streams() {
            if !names.contains(parent) {
                return Err(Error::config(format!(
                    "Stream '{}' has unknown parent stream '{parent}'",
                    stream.name
                )));
            }
        }
    }
    check_parent_cycles(manifest)?;

    if let Some(level) = &manifest.concurrency_level {
        if let JsonValue::Number(n) = &level.default_concurrency {
            if n.as_u64().map_or(true, |n| n == 0) {
                return Err(Error::config(format!(
                    "default_concurrency must be a positive integer, got {n}"
                )));
            }
        }
    }
    Ok(())
}

/// Validate a stream definition
fn validate_stream(stream: &StreamDefinition) -> Result<()> {
    if stream.name.is_empty() {
        return Err(Error::config("Stream name cannot be empty"));
    }

    if stream.retriever.requester.definition.url_base.as_str().is_empty() {
        return Err(Error::config(format!(
            "Stream '{}' url_base cannot be empty",
            stream.name
        )));
    }

    if let Some(incremental) = &stream.incremental_sync {
        if incremental.cursor_field.is_empty() {
            return Err(Error::config(format!(
                "Stream '{}' cursor_field cannot be empty",
                stream.name
            )));
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    InProgress,
    Done,
}

fn check_parent_cycles(manifest: &Manifest) -> Result<()> {
    let parents: HashMap<&str, Vec<&str>> = manifest
        .streams
        .iter()
        .map(|s| (s.name.as_str(), s.parent_streams()))
        .collect();

    fn visit<'a>(
        name: &'a str,
        parents: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Visit>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                return Err(Error::config(format!(
                    "Parent streams of '{name}' form a cycle"
                )))
            }
            None => {}
        }
        marks.insert(name, Visit::InProgress);
        for parent in parents.get(name).into_iter().flatten().copied() {
            visit(parent, parents, marks)?;
        }
        marks.insert(name, Visit::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for stream in &manifest.streams {
        visit(&stream.name, &parents, &mut marks)?;
    }
    Ok(())
}
