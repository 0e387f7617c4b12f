//! Interpolation context

use serde_json::Value;

/// Context for template interpolation
///
/// Each field is one root name usable inside `{{ ... }}`. Unset roots are
/// `null`, so lookups below them are undefined.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Connector configuration values
    pub config: Value,
    /// Manifest `$parameters`
    pub parameters: Value,
    /// Stream state snapshot
    pub stream_state: Value,
    /// Current slice (partition and cursor window merged)
    pub stream_slice: Value,
    /// Partition part of the current slice
    pub stream_partition: Value,
    /// Cursor window of the current slice
    pub stream_interval: Value,
    /// Pagination token for the next request
    pub next_page_token: Value,
    /// Record being filtered or transformed
    pub record: Value,
    /// Decoded body of the last response
    pub response: Value,
    /// Headers of the last response
    pub headers: Value,
    /// Additional context variables
    pub vars: Value,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with config values
    pub fn with_config(config: Value) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Set config values
    pub fn set_config(&mut self, config: Value) -> &mut Self {
        self.config = config;
        self
    }

    /// Set stream state
    pub fn set_state(&mut self, state: Value) -> &mut Self {
        self.stream_state = state;
        self
    }

    /// Set the current slice
    ///
    /// `partition` and `cursor_slice` are merged into `stream_slice`.
    pub fn set_slice(&mut self, partition: Value, cursor_slice: Value) -> &mut Self {
        let mut merged = serde_json::Map::new();
        for part in [&partition, &cursor_slice] {
            if let Value::Object(map) = part {
                merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        self.stream_slice = Value::Object(merged);
        self.stream_partition = partition;
        self.stream_interval = cursor_slice;
        self
    }

    /// Set the next page token
    pub fn set_page_token(&mut self, token: Value) -> &mut Self {
        self.next_page_token = token;
        self
    }

    /// Set the record under evaluation
    pub fn set_record(&mut self, record: Value) -> &mut Self {
        self.record = record;
        self
    }

    /// Set the last response body and headers
    pub fn set_response(&mut self, body: Value, headers: Value) -> &mut Self {
        self.response = body;
        self.headers = headers;
        self
    }

    /// Set manifest parameters
    pub fn set_parameters(&mut self, parameters: Value) -> &mut Self {
        self.parameters = parameters;
        self
    }

    /// Set additional variables
    pub fn set_vars(&mut self, vars: Value) -> &mut Self {
        self.vars = vars;
        self
    }

    /// Resolve a root name
    ///
    /// Names that are not roots resolve against `config`, then `vars`.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let root = match name {
            "config" => &self.config,
            "parameters" => &self.parameters,
            "stream_state" => &self.stream_state,
            "stream_slice" => &self.stream_slice,
            "stream_partition" => &self.stream_partition,
            "stream_interval" => &self.stream_interval,
            "next_page_token" => &self.next_page_token,
            "record" => &self.record,
            "response" => &self.response,
            "headers" => &self.headers,
            "vars" => &self.vars,
            _ => return self.config.get(name).or_else(|| self.vars.get(name)),
        };
        Some(root)
    }
}
