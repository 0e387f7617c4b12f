//! Build a runnable source from a manifest

use crate::engine::{DeclarativeSource, DeclarativeStream, RetrieverDefinition};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig};
use crate::loader::parser::load_manifest;
use crate::loader::types::{
    ConcurrencyLevel, HttpDefinition, IncrementalSync, Manifest, PrimaryKey, StreamDefinition,
};
use crate::partition::{DatetimeWindows, StreamSlicer};
use crate::state::CursorDefinition;
use crate::template::{InterpolatedString, TemplateContext};
use crate::types::JsonValue;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Load a manifest file and build its source
pub fn load_source(path: impl AsRef<Path>, config: JsonValue) -> Result<DeclarativeSource> {
    build_source(&load_manifest(path)?, config)
}

/// Build a source from a manifest and connector config
///
/// Authenticators are resolved against `config` here, so missing
/// credentials fail before any request is sent.
pub fn build_source(manifest: &Manifest, config: JsonValue) -> Result<DeclarativeSource> {
    let client = Arc::new(HttpClient::with_config(client_config(&manifest.http))?);
    let streams = manifest
        .streams
        .iter()
        .map(|stream| build_stream(stream, &config, manifest.base_dir.as_deref()))
        .collect::<Result<Vec<_>>>()?;
    let concurrency = manifest
        .concurrency_level
        .as_ref()
        .map(|level| resolve_concurrency(level, &config))
        .transpose()?;

    let mut source = DeclarativeSource::new(streams, client, config)
        .with_check_streams(manifest.check.stream_names.clone());
    if let Some(concurrency) = concurrency {
        source = source.with_default_concurrency(concurrency);
    }
    if let Some(spec) = &manifest.spec {
        source = source.with_spec(spec.to_value());
    }
    debug!(
        streams = source.streams().len(),
        concurrency = source.default_concurrency(),
        "Built source"
    );
    Ok(source)
}

/// Build one stream
pub fn build_stream(
    definition: &StreamDefinition,
    config: &JsonValue,
    base_dir: Option<&Path>,
) -> Result<DeclarativeStream> {
    let manifest = &definition.retriever;
    let authenticator = manifest.requester.authenticator.resolve(config)?;

    let mut selector = manifest.record_selector.clone();
    selector
        .transformations
        .extend(definition.transformations.iter().cloned());
    let retriever = RetrieverDefinition::new(manifest.requester.definition.clone())
        .with_selector(selector)
        .with_paginator(manifest.paginator.clone())
        .with_decoder(manifest.decoder);

    let router = manifest.partition_router.clone().unwrap_or_default();
    let partitioned = router.is_partitioned();
    let mut slicer = StreamSlicer::new(router);

    let mut schema_loader = definition.schema_loader.clone();
    if let Some(dir) = base_dir {
        schema_loader = schema_loader.with_base_dir(dir);
    }

    let mut stream = DeclarativeStream::new(&definition.name, retriever)
        .with_primary_key(
            definition
                .primary_key
                .as_ref()
                .map(PrimaryKey::paths)
                .unwrap_or_default(),
        )
        .with_schema_loader(schema_loader)
        .with_state_migrations(definition.state_migrations.clone())
        .with_parameters(definition.parameters.clone())
        .with_authenticator(Arc::new(authenticator));

    if let Some(incremental) = &definition.incremental_sync {
        if let Some(windows) = datetime_windows(incremental) {
            slicer = slicer.with_windows(windows, incremental.cursor_field.clone());
        }
        stream = stream.with_cursor(cursor_definition(incremental, partitioned));
    }
    Ok(stream.with_slicer(slicer))
}

fn client_config(http: &HttpDefinition) -> HttpClientConfig {
    let mut builder = HttpClientConfig::builder().timeout(Duration::from_secs(http.timeout_secs));
    if let Some(agent) = &http.user_agent {
        builder = builder.user_agent(agent.clone());
    }
    if let Some(limit) = &http.rate_limit {
        builder = builder.rate_limit(limit.clone());
    }
    builder.build()
}

fn resolve_concurrency(level: &ConcurrencyLevel, config: &JsonValue) -> Result<usize> {
    let value = match &level.default_concurrency {
        JsonValue::String(template) => {
            let ctx = TemplateContext::with_config(config.clone());
            InterpolatedString::new(template.as_str())?.eval(&ctx)?
        }
        other => other.clone(),
    };
    let concurrency = match &value {
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .filter(|n| *n > 0)
    .ok_or_else(|| {
        Error::config(format!(
            "default_concurrency must be a positive integer, got {value}"
        ))
    })?;

    let concurrency = usize::try_from(concurrency).unwrap_or(usize::MAX);
    Ok(level
        .max_concurrency
        .map_or(concurrency, |max| concurrency.min(max)))
}

fn datetime_windows(incremental: &IncrementalSync) -> Option<DatetimeWindows> {
    let start = incremental.start_datetime.as_ref()?;
    let mut windows = DatetimeWindows::new(start.template().clone());

    if let Some(end) = &incremental.end_datetime {
        windows = windows.with_end(end.template().clone());
    }
    if let Some(step) = &incremental.step {
        windows = windows.with_step(step.clone());
    }
    if let Some(granularity) = &incremental.cursor_granularity {
        windows = windows.with_granularity(granularity.clone());
    }
    if let Some(lookback) = &incremental.lookback_window {
        windows = windows.with_lookback(lookback.clone());
    }
    if let Some(format) = incremental.datetime_format.as_deref().or(start.format()) {
        windows = windows.with_datetime_format(format);
    }
    if let Some(key) = &incremental.partition_field_start {
        windows.start_key = key.clone();
    }
    if let Some(key) = &incremental.partition_field_end {
        windows.end_key = key.clone();
    }
    windows.start_time_option = incremental.start_time_option.clone();
    windows.end_time_option = incremental.end_time_option.clone();
    Some(windows)
}

fn cursor_definition(incremental: &IncrementalSync, partitioned: bool) -> CursorDefinition {
    let mut cursor = CursorDefinition::new(incremental.cursor_field.clone())
        .with_per_partition(partitioned && !incremental.global_substream_cursor);
    if let Some(format) = &incremental.datetime_format {
        cursor = cursor.with_datetime_format(format.clone());
    }
    if let Some(key) = &incremental.partition_field_start {
        cursor = cursor.with_start_key(key.clone());
    }
    if let Some(interval) = incremental.checkpoint_interval {
        cursor = cursor.with_checkpoint_interval(interval);
    }
    cursor
}
