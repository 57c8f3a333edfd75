use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::DependencyGraph;
use crate::errors::ConfigurationError;

/// An externally-authored workflow: a DAG of nodes defined as data.
///
/// This is the engine-side model of the JSON the authoring layer produces.
/// The engine consumes already-parsed workflows; the HTTP transport that
/// delivers them lives outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub metadata: Option<WorkflowMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub created: String,
    pub modified: String,
    pub author: String,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Component,
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub position: Position,
    pub data: NodeData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub label: String,
    /// Runtime tag the DagRunner dispatches on
    #[serde(default = "default_language")]
    pub language: String,
    /// Inline source executed by the selected language driver
    #[serde(default, alias = "code")]
    pub source: Option<String>,
    #[serde(default, alias = "inputs")]
    pub input_ports: Vec<Port>,
    #[serde(default, alias = "outputs")]
    pub output_ports: Vec<Port>,
    #[serde(default)]
    pub config: Option<NodeConfig>,
}

fn default_language() -> String {
    "python".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Per-node subprocess deadline, seconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Per-node re-attempt count on failure
    #[serde(default)]
    pub retry: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: PortType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Which output of the source feeds this edge; absent with
    /// `target_port` absent means the whole output mapping flows across
    #[serde(default, alias = "source_handle")]
    pub source_port: Option<String>,
    #[serde(default, alias = "target_handle")]
    pub target_port: Option<String>,
}

impl Workflow {
    /// Build the forward adjacency view the runner schedules from.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for node in &self.nodes {
            graph.add_node(&node.id);
        }
        for edge in &self.edges {
            graph.add_edge(&edge.source, &edge.target);
        }
        graph
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges pointing at `id`, in declaration order.
    pub fn inbound_edges(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target == id).collect()
    }
}

/// Load a workflow definition from a YAML or JSON file, selected by
/// extension.
pub fn load_workflow<P: AsRef<Path>>(path: P) -> Result<Workflow, ConfigurationError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| ConfigurationError::Io {
        path: display.clone(),
        message: e.to_string(),
    })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            serde_json::from_str(&content).map_err(|e| ConfigurationError::Parse {
                path: display,
                message: e.to_string(),
            })
        }
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|e| ConfigurationError::Parse {
                path: display,
                message: e.to_string(),
            })
        }
        _ => Err(ConfigurationError::UnsupportedFormat { path: display }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
id: wf-1
name: sample
nodes:
  - id: a
    type: input
    data:
      label: source
  - id: b
    type: component
    data:
      label: double
      language: python
      source: "def process(inputs):\n    return {'x': inputs['x'] * 2}"
      config:
        timeout: 10
edges:
  - id: e1
    source: a
    target: b
"#
    }

    #[test]
    fn parse_workflow_yaml() {
        let wf: Workflow = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(wf.nodes.len(), 2);
        assert_eq!(wf.nodes[0].kind, NodeKind::Input);
        assert_eq!(wf.nodes[1].data.language, "python");
        assert_eq!(wf.nodes[1].data.config.as_ref().unwrap().timeout, Some(10));
        assert_eq!(wf.edges[0].source, "a");
    }

    #[test]
    fn dependency_graph_follows_edges() {
        let wf: Workflow = serde_yaml::from_str(sample_yaml()).unwrap();
        let graph = wf.dependency_graph();
        assert_eq!(graph.dependents("a"), &["b".to_string()]);
        assert!(graph.dependents("b").is_empty());
    }

    #[test]
    fn load_workflow_selects_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("wf.yaml");
        std::fs::write(&yaml_path, sample_yaml()).unwrap();
        assert!(load_workflow(&yaml_path).is_ok());

        let txt_path = dir.path().join("wf.txt");
        std::fs::write(&txt_path, "not a workflow").unwrap();
        assert!(matches!(
            load_workflow(&txt_path),
            Err(ConfigurationError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn edge_port_aliases_accepted() {
        let json = serde_json::json!({
            "id": "wf", "name": "wf",
            "nodes": [],
            "edges": [{
                "id": "e", "source": "a", "target": "b",
                "source_handle": "out", "target_handle": "in"
            }]
        });
        let wf: Workflow = serde_json::from_value(json).unwrap();
        assert_eq!(wf.edges[0].source_port.as_deref(), Some("out"));
        assert_eq!(wf.edges[0].target_port.as_deref(), Some("in"));
    }
}
