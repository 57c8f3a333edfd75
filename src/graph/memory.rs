//! In-memory lineage recorders for executor tests. NOT available in
//! production builds; real recording goes through [`super::GraphStore`].

use async_trait::async_trait;
use std::sync::Mutex;

use crate::errors::GraphError;
use crate::traits::{LineageRecorder, VertexAttributes};

/// A vertex captured by [`MemoryRecorder`].
#[derive(Debug, Clone)]
pub struct RecordedVertex {
    pub label: String,
    pub attributes: VertexAttributes,
}

/// Records vertices and edges in memory so tests can assert on lineage
/// without a graph server.
#[derive(Default)]
pub struct MemoryRecorder {
    vertices: Mutex<Vec<RecordedVertex>>,
    /// (parent hash, child hash, label)
    edges: Mutex<Vec<(String, String, String)>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> Vec<RecordedVertex> {
        self.vertices.lock().unwrap().clone()
    }

    pub fn edges(&self) -> Vec<(String, String, String)> {
        self.edges.lock().unwrap().clone()
    }

    pub fn vertices_with_label(&self, label: &str) -> Vec<RecordedVertex> {
        self.vertices()
            .into_iter()
            .filter(|v| v.label == label)
            .collect()
    }

    pub fn find_by_hash(&self, hash: &str) -> Option<RecordedVertex> {
        self.vertices()
            .into_iter()
            .find(|v| v.attributes.get("Hash").and_then(|h| h.as_str()) == Some(hash))
    }

    fn hash_exists(&self, hash: &str) -> bool {
        self.find_by_hash(hash).is_some()
    }
}

#[async_trait]
impl LineageRecorder for MemoryRecorder {
    async fn record_component(
        &self,
        attributes: VertexAttributes,
        parent_ids: &[String],
    ) -> Result<String, GraphError> {
        for key in ["Name", "ExecutionID", "Hash"] {
            if !attributes.contains_key(key) {
                return Err(GraphError::Operation {
                    operation: "record_component",
                    message: format!("missing required attribute '{}'", key),
                });
            }
        }

        let child = attributes
            .get("Hash")
            .and_then(|h| h.as_str())
            .unwrap_or_default()
            .to_string();

        // Mirror the store: edges from absent parents are skipped, not errors
        for parent in parent_ids {
            if self.hash_exists(parent) {
                self.edges.lock().unwrap().push((
                    parent.clone(),
                    child.clone(),
                    "DEPENDS_ON".to_string(),
                ));
            }
        }

        let mut vertices = self.vertices.lock().unwrap();
        vertices.push(RecordedVertex {
            label: "Component".to_string(),
            attributes,
        });
        Ok(format!("v{}", vertices.len()))
    }

    async fn record_pipeline(&self, attributes: VertexAttributes) -> Result<String, GraphError> {
        let mut vertices = self.vertices.lock().unwrap();
        vertices.push(RecordedVertex {
            label: "Pipeline".to_string(),
            attributes,
        });
        Ok(format!("v{}", vertices.len()))
    }

    async fn clear(&self) -> Result<u64, GraphError> {
        let mut vertices = self.vertices.lock().unwrap();
        let removed = vertices.len() as u64;
        vertices.clear();
        self.edges.lock().unwrap().clear();
        Ok(removed)
    }
}

/// Fails every operation, standing in for an unreachable endpoint.
#[derive(Default)]
pub struct UnreachableRecorder;

#[async_trait]
impl LineageRecorder for UnreachableRecorder {
    async fn record_component(
        &self,
        _attributes: VertexAttributes,
        _parent_ids: &[String],
    ) -> Result<String, GraphError> {
        Err(GraphError::Connection {
            endpoint: "ws://unreachable:8182/gremlin".to_string(),
            message: "connection refused".to_string(),
        })
    }

    async fn record_pipeline(&self, _attributes: VertexAttributes) -> Result<String, GraphError> {
        Err(GraphError::Connection {
            endpoint: "ws://unreachable:8182/gremlin".to_string(),
            message: "connection refused".to_string(),
        })
    }

    async fn clear(&self) -> Result<u64, GraphError> {
        Err(GraphError::Connection {
            endpoint: "ws://unreachable:8182/gremlin".to_string(),
            message: "connection refused".to_string(),
        })
    }
}
