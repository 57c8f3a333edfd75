use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::errors::GraphError;

/// Property map written onto a lineage vertex. Values are JSON; the store
/// re-encodes anything that is not a JSON scalar to a JSON string before the
/// property write.
pub type VertexAttributes = BTreeMap<String, serde_json::Value>;

/// Seam between the execution engine and the lineage store.
///
/// The engine records through this trait; `graph::GraphStore` is the
/// production implementation. Recording failures are the caller's to absorb:
/// a successful user computation is never failed because of a lineage write.
#[async_trait]
pub trait LineageRecorder: Send + Sync {
    /// Write one `Component` vertex and a `DEPENDS_ON` edge from each parent.
    /// Returns the new vertex id.
    async fn record_component(
        &self,
        attributes: VertexAttributes,
        parent_ids: &[String],
    ) -> Result<String, GraphError>;

    /// Write one `Pipeline` vertex. Returns the new vertex id.
    async fn record_pipeline(&self, attributes: VertexAttributes) -> Result<String, GraphError>;

    /// Delete every vertex (edges cascade). Returns the prior vertex count.
    async fn clear(&self) -> Result<u64, GraphError>;
}
