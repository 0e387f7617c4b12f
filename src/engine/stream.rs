//! Declarative streams

use super::retriever::{PartitionReader, RetrieverDefinition};
use crate::auth::{AuthConfig, Authenticator};
use crate::concurrent::{PartitionSource, RecordSender};
use crate::error::{Error, Result};
use crate::http::HttpRuntime;
use crate::output::CatalogStream;
use crate::partition::{StreamSlice, StreamSlicer};
use crate::schema::SchemaLoader;
use crate::state::{CursorDefinition, StateMigration};
use crate::template::TemplateContext;
use crate::types::{JsonObject, JsonValue, SyncMode};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A stream built from a manifest
#[derive(Debug, Clone)]
pub struct DeclarativeStream {
    /// Stream name
    pub name: Arc<str>,
    /// Primary key as field paths
    pub primary_key: Vec<Vec<String>>,
    /// How records are fetched
    pub retriever: Arc<RetrieverDefinition>,
    /// Partitions and datetime windows
    pub slicer: StreamSlicer,
    /// Incremental cursor; full refresh only when absent
    pub cursor: Option<CursorDefinition>,
    /// Schema source for discovery
    pub schema_loader: SchemaLoader,
    /// Applied to incoming state before reading
    pub state_migrations: Vec<StateMigration>,
    /// Manifest `$parameters`
    pub parameters: JsonObject,
    /// Credentials of this stream's requests
    pub authenticator: Arc<dyn Authenticator>,
}

impl DeclarativeStream {
    /// Stream with a single partition and no cursor
    pub fn new(name: impl AsRef<str>, retriever: RetrieverDefinition) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            primary_key: Vec::new(),
            retriever: Arc::new(retriever),
            slicer: StreamSlicer::default(),
            cursor: None,
            schema_loader: SchemaLoader::default(),
            state_migrations: Vec::new(),
            parameters: JsonObject::new(),
            authenticator: Arc::new(AuthConfig::None),
        }
    }

    /// Set the primary key
    #[must_use]
    pub fn with_primary_key(mut self, primary_key: Vec<Vec<String>>) -> Self {
        self.primary_key = primary_key;
        self
    }

    /// Set the stream slicer
    #[must_use]
    pub fn with_slicer(mut self, slicer: StreamSlicer) -> Self {
        self.slicer = slicer;
        self
    }

    /// Make the stream incremental
    #[must_use]
    pub fn with_cursor(mut self, cursor: CursorDefinition) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Set the schema loader
    #[must_use]
    pub fn with_schema_loader(mut self, loader: SchemaLoader) -> Self {
        self.schema_loader = loader;
        self
    }

    /// Set the state migrations
    #[must_use]
    pub fn with_state_migrations(mut self, migrations: Vec<StateMigration>) -> Self {
        self.state_migrations = migrations;
        self
    }

    /// Set the manifest parameters
    #[must_use]
    pub fn with_parameters(mut self, parameters: JsonObject) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the authenticator
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// True when the stream keeps a cursor
    pub fn supports_incremental(&self) -> bool {
        self.cursor.is_some()
    }

    /// Sync mode used when none is forced
    pub fn default_sync_mode(&self) -> SyncMode {
        if self.supports_incremental() {
            SyncMode::Incremental
        } else {
            SyncMode::FullRefresh
        }
    }

    /// Reader for one slice of this stream
    pub fn partition_reader(
        &self,
        slice: Arc<StreamSlice>,
        stream_state: JsonValue,
        mut runtime: HttpRuntime,
    ) -> PartitionReader {
        runtime.authenticator = Arc::clone(&self.authenticator);
        let options = self.slicer.request_options(&slice);
        PartitionReader::new(
            Arc::clone(&self.name),
            Arc::clone(&self.retriever),
            slice,
            options,
            stream_state,
            JsonValue::Object(self.parameters.clone()),
            runtime,
        )
    }

    /// Catalog entry with the loaded schema
    pub fn catalog_entry(&self, config: &JsonValue) -> Result<CatalogStream> {
        let mut ctx = TemplateContext::with_config(config.clone());
        ctx.set_parameters(JsonValue::Object(self.parameters.clone()));
        let json_schema = self.schema_loader.load(&ctx)?;

        let mut supported_sync_modes = vec![SyncMode::FullRefresh];
        if self.supports_incremental() {
            supported_sync_modes.push(SyncMode::Incremental);
        }
        Ok(CatalogStream {
            name: self.name.to_string(),
            json_schema,
            supported_sync_modes,
            source_defined_cursor: self.supports_incremental(),
            default_cursor_field: self
                .cursor
                .as_ref()
                .map(|c| vec![c.cursor_field.clone()])
                .unwrap_or_default(),
            source_defined_primary_key: self.primary_key.clone(),
        })
    }
}

/// Reads partitions of one stream for the concurrent reader
#[derive(Debug)]
pub(crate) struct StreamPartitionSource {
    pub(crate) stream: Arc<DeclarativeStream>,
    pub(crate) runtime: HttpRuntime,
    pub(crate) stream_state: JsonValue,
}

#[async_trait]
impl PartitionSource for StreamPartitionSource {
    async fn read_partition(
        &self,
        slice: Arc<StreamSlice>,
        records: RecordSender,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut runtime = self.runtime.clone();
        runtime.cancel = cancel.clone();
        let mut reader = self
            .stream
            .partition_reader(slice, self.stream_state.clone(), runtime);

        while let Some(page) = reader.next_page().await? {
            for record in page {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                records.send(record).await?;
            }
        }
        Ok(())
    }
}
