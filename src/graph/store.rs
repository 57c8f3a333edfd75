use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;

use crate::config::GraphConfig;
use crate::errors::GraphError;
use crate::graph::client::GremlinClient;
use crate::observability::messages::{
    graph::{GraphCleared, ParentVertexMissing},
    StructuredLog,
};
use crate::traits::{LineageRecorder, VertexAttributes};

/// Property-graph store for execution lineage.
///
/// One store owns one pooled client against one endpoint. Vertex writes and
/// their parent edges go out as a single script evaluation, which the server
/// runs as one transaction; a failure writes nothing.
pub struct GraphStore {
    client: GremlinClient,
}

/// Optional filters for [`GraphStore::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub name: Option<String>,
    pub platform: Option<String>,
    /// Inclusive lower bound on `StartTime` (ISO-8601)
    pub start_time: Option<String>,
    /// Inclusive upper bound on `StartTime` (ISO-8601)
    pub end_time: Option<String>,
    pub execution_id: Option<String>,
}

/// Subgraph returned by [`GraphStore::get_execution_graph`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    pub nodes: BTreeMap<String, serde_json::Value>,
    pub edges: Vec<(String, String)>,
}

/// Aggregate counts returned by [`GraphStore::statistics`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphStatistics {
    pub total_vertices: u64,
    pub total_edges: u64,
    pub components: u64,
    pub pipelines: u64,
    pub platforms: BTreeMap<String, u64>,
}

const REQUIRED_COMPONENT_KEYS: [&str; 3] = ["Name", "ExecutionID", "Hash"];

impl GraphStore {
    /// Connect the pool and verify the endpoint answers a trivial query.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        Ok(Self {
            client: GremlinClient::connect(config).await?,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    /// Delete every vertex (edges cascade). Returns the prior vertex count.
    pub async fn clear(&self) -> Result<u64, GraphError> {
        let rows = self
            .client
            .submit(
                "count = g.V().count().next(); g.V().drop().iterate(); count",
                serde_json::Map::new(),
                "clear",
            )
            .await?;

        let removed = rows
            .first()
            .and_then(|v| v.as_u64())
            .ok_or_else(|| GraphError::Operation {
                operation: "clear",
                message: "server returned no count".to_string(),
            })?;

        GraphCleared {
            removed_vertices: removed,
        }
        .log();
        Ok(removed)
    }

    /// Write one `Component` vertex with its `DEPENDS_ON` edges from each
    /// existing parent, as a single transaction.
    ///
    /// Parents without a vertex are skipped with a warning, never an error;
    /// partial replays depend on that.
    pub async fn add_component_execution(
        &self,
        attributes: VertexAttributes,
        parent_ids: &[String],
    ) -> Result<String, GraphError> {
        for key in REQUIRED_COMPONENT_KEYS {
            if !attributes.contains_key(key) {
                return Err(GraphError::Operation {
                    operation: "add_component_execution",
                    message: format!("missing required attribute '{}'", key),
                });
            }
        }

        let child_id = attributes
            .get("Hash")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let linkable = self
            .existing_parents(parent_ids, &child_id, "add_component_execution")
            .await?;

        let (script, bindings) = write_script("Component", &attributes, &linkable);
        let rows = self
            .client
            .submit(&script, bindings, "add_component_execution")
            .await?;

        vertex_id_from(rows, "add_component_execution")
    }

    /// Write one `Pipeline` vertex.
    pub async fn add_pipeline_node(
        &self,
        attributes: VertexAttributes,
    ) -> Result<String, GraphError> {
        let (script, bindings) = write_script("Pipeline", &attributes, &[]);
        let rows = self
            .client
            .submit(&script, bindings, "add_pipeline_node")
            .await?;
        vertex_id_from(rows, "add_pipeline_node")
    }

    /// Single-vertex lookup by execution hash.
    pub async fn get_component_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<serde_json::Value>, GraphError> {
        let rows = self
            .client
            .submit(
                "g.V().has('Hash', target_hash).elementMap()",
                single_binding("target_hash", json!(hash)),
                "get_component_by_hash",
            )
            .await?;

        Ok(rows.first().map(decode_properties))
    }

    /// Breadth-limited traversal following `DEPENDS_ON` outward from the
    /// given hash. Simple-path discipline guards against corrupted data;
    /// cycles cannot exist in well-formed lineage.
    pub async fn get_execution_graph(
        &self,
        start_hash: &str,
        max_depth: u32,
    ) -> Result<ExecutionGraph, GraphError> {
        let mut bindings = single_binding("start_hash", json!(start_hash));
        bindings.insert("max_depth".to_string(), json!(max_depth));

        let rows = self
            .client
            .submit(
                "g.V().has('Hash', start_hash)\
                 .repeat(out('DEPENDS_ON').simplePath())\
                 .until(loops().is(max_depth))\
                 .emit()\
                 .path().by(elementMap())",
                bindings,
                "get_execution_graph",
            )
            .await?;

        let mut graph = ExecutionGraph::default();
        for path in rows {
            let steps = match path.get("objects").and_then(|o| o.as_array()) {
                Some(steps) => steps.clone(),
                None => match path.as_array() {
                    Some(steps) => steps.clone(),
                    None => continue,
                },
            };

            let mut previous: Option<String> = None;
            for step in &steps {
                let decoded = decode_properties(step);
                let id = decoded
                    .get("Hash")
                    .or_else(|| decoded.get("id"))
                    .map(value_to_string)
                    .unwrap_or_default();
                if id.is_empty() {
                    continue;
                }
                graph.nodes.entry(id.clone()).or_insert(decoded);
                if let Some(prev) = &previous {
                    let edge = (prev.clone(), id.clone());
                    if !graph.edges.contains(&edge) {
                        graph.edges.push(edge);
                    }
                }
                previous = Some(id);
            }
        }
        Ok(graph)
    }

    /// Filtered component search, capped at `limit` results.
    pub async fn search(
        &self,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, GraphError> {
        let (script, bindings) = search_script(filters, limit);
        let rows = self.client.submit(&script, bindings, "search").await?;
        Ok(rows.iter().map(decode_properties).collect())
    }

    /// Vertex/edge totals, per-label counts, and platform distribution.
    pub async fn statistics(&self) -> Result<GraphStatistics, GraphError> {
        let rows = self
            .client
            .submit(
                "[g.V().count().next(), g.E().count().next(), \
                 g.V().hasLabel('Component').count().next(), \
                 g.V().hasLabel('Pipeline').count().next(), \
                 g.V().hasLabel('Component').groupCount().by('Platform').next()]",
                serde_json::Map::new(),
                "statistics",
            )
            .await?;

        let count = |index: usize| rows.get(index).and_then(|v| v.as_u64()).unwrap_or(0);
        let mut statistics = GraphStatistics {
            total_vertices: count(0),
            total_edges: count(1),
            components: count(2),
            pipelines: count(3),
            platforms: BTreeMap::new(),
        };

        if let Some(serde_json::Value::Object(map)) = rows.get(4) {
            for (platform, n) in map {
                statistics
                    .platforms
                    .insert(platform.clone(), n.as_u64().unwrap_or(0));
            }
        }
        Ok(statistics)
    }

    /// Open a scope that batches vertex writes into one script submission,
    /// committed or rolled back as a unit by the server.
    pub fn transaction(&self) -> TransactionScope<'_> {
        TransactionScope {
            store: self,
            statements: Vec::new(),
            bindings: serde_json::Map::new(),
        }
    }

    /// Which of the given parents have vertices; warns about the rest.
    async fn existing_parents(
        &self,
        parent_ids: &[String],
        child_id: &str,
        operation: &'static str,
    ) -> Result<Vec<String>, GraphError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .client
            .submit(
                "g.V().has('Hash', within(parent_hashes)).values('Hash')",
                single_binding("parent_hashes", json!(parent_ids)),
                operation,
            )
            .await?;

        let found: Vec<String> = rows
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();

        for parent in parent_ids {
            if !found.contains(parent) {
                ParentVertexMissing {
                    parent_id: parent,
                    child_id,
                }
                .log();
            }
        }
        Ok(found)
    }
}

/// Write scope grouping several vertex writes into one commit/rollback unit.
pub struct TransactionScope<'a> {
    store: &'a GraphStore,
    statements: Vec<String>,
    bindings: serde_json::Map<String, serde_json::Value>,
}

impl TransactionScope<'_> {
    pub fn queue_vertex(&mut self, label: &str, attributes: &VertexAttributes) {
        let prefix = format!("t{}_", self.statements.len());
        let (statement, bindings) = vertex_statement(label, attributes, &prefix, "_");
        self.statements.push(format!("{}.iterate()", statement));
        self.bindings.extend(bindings);
    }

    /// Submit every queued write as one script. The server commits all of
    /// it or none of it.
    pub async fn commit(self) -> Result<(), GraphError> {
        if self.statements.is_empty() {
            return Ok(());
        }
        self.store
            .client
            .submit(&self.statements.join("; "), self.bindings, "transaction")
            .await?;
        Ok(())
    }
}

/// Build the single-script vertex+edges write. Returns the script and its
/// bindings; the script yields the new vertex id.
fn write_script(
    label: &str,
    attributes: &VertexAttributes,
    parent_ids: &[String],
) -> (String, serde_json::Map<String, serde_json::Value>) {
    let (vertex, mut bindings) = vertex_statement(label, attributes, "p", "v");
    let mut script = format!("v = {}.next(); ", vertex);

    for (index, parent) in parent_ids.iter().enumerate() {
        let binding = format!("parent_{}", index);
        script.push_str(&format!(
            "g.V().has('Hash', {}).addE('DEPENDS_ON').to(__.V(v.id())).iterate(); ",
            binding
        ));
        bindings.insert(binding, json!(parent));
    }

    script.push_str("v.id().toString()");
    (script, bindings)
}

/// Build an `addV` traversal with one binding per property. `null`
/// properties are dropped; structured values become JSON strings, because
/// vertex properties are string-typed in the recorded schema.
fn vertex_statement(
    label: &str,
    attributes: &VertexAttributes,
    binding_prefix: &str,
    label_binding: &str,
) -> (String, serde_json::Map<String, serde_json::Value>) {
    let mut bindings = serde_json::Map::new();
    let label_key = format!("{}label_{}", binding_prefix, label_binding);
    bindings.insert(label_key.clone(), json!(label));

    let mut script = format!("g.addV({})", label_key);
    for (index, (key, value)) in attributes.iter().enumerate() {
        if value.is_null() {
            continue;
        }
        let value_binding = format!("{}{}", binding_prefix, index);
        script.push_str(&format!(".property('{}', {})", escape_key(key), value_binding));
        bindings.insert(value_binding, property_value(value));
    }
    (script, bindings)
}

/// Property keys come from component attributes; quote-escape them so a
/// hostile name cannot break out of the script literal.
fn escape_key(key: &str) -> String {
    key.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Scalars pass through; anything structured is re-encoded to a JSON string
/// before the property write.
fn property_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
            json!(value.to_string())
        }
        scalar => scalar.clone(),
    }
}

/// Reverse of [`property_value`]: JSON-string properties decode back into
/// structured values on the way out.
fn decode_properties(row: &serde_json::Value) -> serde_json::Value {
    match row {
        serde_json::Value::Object(map) => {
            let mut decoded = serde_json::Map::new();
            for (key, value) in map {
                let restored = match value.as_str() {
                    Some(text) if text.starts_with('{') || text.starts_with('[') => {
                        serde_json::from_str(text).unwrap_or_else(|_| value.clone())
                    }
                    _ => value.clone(),
                };
                decoded.insert(key.clone(), restored);
            }
            serde_json::Value::Object(decoded)
        }
        other => other.clone(),
    }
}

fn search_script(
    filters: &SearchFilters,
    limit: usize,
) -> (String, serde_json::Map<String, serde_json::Value>) {
    let mut script = String::from("g.V().hasLabel('Component')");
    let mut bindings = serde_json::Map::new();

    if let Some(name) = &filters.name {
        script.push_str(".has('Name', f_name)");
        bindings.insert("f_name".to_string(), json!(name));
    }
    if let Some(platform) = &filters.platform {
        script.push_str(".has('Platform', f_platform)");
        bindings.insert("f_platform".to_string(), json!(platform));
    }
    if let Some(start) = &filters.start_time {
        script.push_str(".has('StartTime', gte(f_start))");
        bindings.insert("f_start".to_string(), json!(start));
    }
    if let Some(end) = &filters.end_time {
        script.push_str(".has('StartTime', lte(f_end))");
        bindings.insert("f_end".to_string(), json!(end));
    }
    if let Some(execution_id) = &filters.execution_id {
        script.push_str(".has('ExecutionID', f_execution)");
        bindings.insert("f_execution".to_string(), json!(execution_id));
    }

    script.push_str(".limit(f_limit).elementMap()");
    bindings.insert("f_limit".to_string(), json!(limit));
    (script, bindings)
}

fn single_binding(
    key: &str,
    value: serde_json::Value,
) -> serde_json::Map<String, serde_json::Value> {
    let mut bindings = serde_json::Map::new();
    bindings.insert(key.to_string(), value);
    bindings
}

fn vertex_id_from(
    rows: Vec<serde_json::Value>,
    operation: &'static str,
) -> Result<String, GraphError> {
    rows.first()
        .map(value_to_string)
        .ok_or_else(|| GraphError::Operation {
            operation,
            message: "server returned no vertex id".to_string(),
        })
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl LineageRecorder for GraphStore {
    async fn record_component(
        &self,
        attributes: VertexAttributes,
        parent_ids: &[String],
    ) -> Result<String, GraphError> {
        self.add_component_execution(attributes, parent_ids).await
    }

    async fn record_pipeline(&self, attributes: VertexAttributes) -> Result<String, GraphError> {
        self.add_pipeline_node(attributes).await
    }

    async fn clear(&self) -> Result<u64, GraphError> {
        GraphStore::clear(self).await
    }
}
