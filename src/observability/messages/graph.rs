//! Message types for lineage store connection and write events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// The connection pool to the graph endpoint is up and verified.
pub struct GraphConnected<'a> {
    pub endpoint: &'a str,
    pub pool_size: usize,
}

impl Display for GraphConnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Connected to graph endpoint {} (pool of {})",
            self.endpoint, self.pool_size
        )
    }
}

impl StructuredLog for GraphConnected<'_> {
    fn log(&self) {
        tracing::info!(endpoint = self.endpoint, pool_size = self.pool_size, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("graph_connected", span_name = name, endpoint = self.endpoint)
    }
}

/// A parent id named by an invocation has no vertex; its edge is skipped.
/// This supports partial replay, so it warns rather than fails.
pub struct ParentVertexMissing<'a> {
    pub parent_id: &'a str,
    pub child_id: &'a str,
}

impl Display for ParentVertexMissing<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Parent vertex '{}' not found; skipping edge to '{}'",
            self.parent_id, self.child_id
        )
    }
}

impl StructuredLog for ParentVertexMissing<'_> {
    fn log(&self) {
        tracing::warn!(parent_id = self.parent_id, child_id = self.child_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("parent_missing", span_name = name, parent_id = self.parent_id)
    }
}

/// The lineage write for a finished invocation failed after the store's
/// retries. The invocation still returns its result; the vertex is lost.
pub struct LineageWriteFailed<'a> {
    pub component: &'a str,
    pub execution_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for LineageWriteFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Lineage write failed for '{}' (execution {}): {}",
            self.component, self.execution_id, self.error
        )
    }
}

impl StructuredLog for LineageWriteFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            component = self.component,
            execution_id = self.execution_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "lineage_loss",
            span_name = name,
            component = self.component,
            execution_id = self.execution_id,
        )
    }
}

/// The graph was truncated before a pipeline run.
pub struct GraphCleared {
    pub removed_vertices: u64,
}

impl Display for GraphCleared {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cleared {} vertices from graph", self.removed_vertices)
    }
}

impl StructuredLog for GraphCleared {
    fn log(&self) {
        tracing::info!(removed_vertices = self.removed_vertices, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("graph_cleared", span_name = name)
    }
}
