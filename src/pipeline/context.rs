//! Request-scoped pipeline context

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Span;

use super::metadata::CallMetadata;
use crate::rpc::SchemaRegistry;

/// Everything one multi-call request carries through the pipeline
///
/// The `span` replaces thread-bound diagnostic context: synchronous phases
/// enter it, asynchronous completions are instrumented with it, so every log
/// line of the request carries its `cid`.
pub struct PipelineContext {
    cid: String,
    params: HashMap<String, String>,
    schema: Arc<dyn SchemaRegistry>,
    started_at: Instant,
    span: Span,
    pub(crate) metadata: CallMetadata,
}

impl PipelineContext {
    pub fn new(
        cid: impl Into<String>,
        params: HashMap<String, String>,
        schema: Arc<dyn SchemaRegistry>,
    ) -> Self {
        let cid = cid.into();
        let span = tracing::info_span!("request", cid = %cid);
        Self {
            cid,
            params,
            schema,
            started_at: Instant::now(),
            span,
            metadata: CallMetadata::default(),
        }
    }

    /// Correlation id
    pub fn cid(&self) -> &str {
        &self.cid
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn schema(&self) -> &dyn SchemaRegistry {
        self.schema.as_ref()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Metadata merged from every call so far
    pub fn metadata(&self) -> &CallMetadata {
        &self.metadata
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("cid", &self.cid)
            .field("params", &self.params)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
