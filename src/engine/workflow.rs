use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::{validate_workflow, DependencyGraph, Node, NodeKind, Workflow};
use crate::errors::WorkflowError;
use crate::languages::{BashDriver, NodeDriver, PythonDriver};
use crate::observability::messages::{
    engine::{NodeStatusChanged, WorkflowStarted},
    graph::LineageWriteFailed,
    StructuredLog,
};
use crate::serialize::execution_hash;
use crate::traits::{
    LanguageDriver, LanguageOptions, LineageRecorder, VertexAttributes,
};

/// Per-node lifecycle within one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        }
    }
}

/// Whole-execution lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Status event published for external subscribers. Publication is
/// fire-and-forget; the core never depends on anyone listening.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub node_id: Option<String>,
    pub node_status: Option<NodeStatus>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Retained state for one node of one execution.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub status: NodeStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for NodeSnapshot {
    fn default() -> Self {
        Self {
            status: NodeStatus::Pending,
            output: None,
            error: None,
            start_time: None,
            end_time: None,
        }
    }
}

/// Retained state for one execution, queryable by execution id.
#[derive(Debug, Clone)]
pub struct ExecutionSnapshot {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub nodes: BTreeMap<String, NodeSnapshot>,
}

/// Executes externally-authored workflows: validate, order topologically,
/// gather per-edge inputs, dispatch each node to its language driver, and
/// publish status transitions.
///
/// Nodes within one topological level run sequentially by default;
/// `with_level_parallelism` bounds concurrent nodes per level when more is
/// wanted. A failed node blocks everything reachable from it; siblings
/// continue, and the execution finishes as failed.
pub struct DagRunner {
    languages: HashMap<String, Arc<dyn LanguageDriver>>,
    executions: DashMap<String, ExecutionSnapshot>,
    events: broadcast::Sender<StatusUpdate>,
    level_parallelism: usize,
    recorder: Option<Arc<dyn LineageRecorder>>,
}

impl Default for DagRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl DagRunner {
    pub fn new() -> Self {
        let mut runner = Self {
            languages: HashMap::new(),
            executions: DashMap::new(),
            events: broadcast::channel(256).0,
            level_parallelism: 1,
            recorder: None,
        };
        runner.register_language(Arc::new(PythonDriver));
        runner.register_language(Arc::new(NodeDriver));
        runner.register_language(Arc::new(BashDriver));
        runner
    }

    /// Maximum nodes of one topological level in flight at once.
    pub fn with_level_parallelism(mut self, parallelism: usize) -> Self {
        self.level_parallelism = parallelism.max(1);
        self
    }

    /// Record each node execution as a lineage vertex with edges from the
    /// nodes it consumed.
    pub fn with_recorder(mut self, recorder: Arc<dyn LineageRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn register_language(&mut self, driver: Arc<dyn LanguageDriver>) {
        self.languages.insert(driver.language().to_string(), driver);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.events.subscribe()
    }

    /// Retained state of a current or past execution.
    pub fn execution(&self, execution_id: &str) -> Option<ExecutionSnapshot> {
        self.executions.get(execution_id).map(|e| e.clone())
    }

    /// Execute a workflow to completion. Returns every node's output keyed
    /// by node id, or the first failure once unaffected branches have run.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        execution_id: &str,
        parameters: &serde_json::Value,
    ) -> Result<BTreeMap<String, serde_json::Value>, WorkflowError> {
        validate_workflow(workflow).map_err(WorkflowError::Validation)?;

        let graph = workflow.dependency_graph();
        // Validation guarantees acyclicity
        let order = graph
            .topological_sort()
            .unwrap_or_default();
        let levels = schedule_levels(&graph, &order);
        let reverse = graph.reverse_dependencies();

        self.executions.insert(
            execution_id.to_string(),
            ExecutionSnapshot {
                workflow_id: workflow.id.clone(),
                status: WorkflowStatus::Running,
                nodes: workflow
                    .nodes
                    .iter()
                    .map(|n| (n.id.clone(), NodeSnapshot::default()))
                    .collect(),
            },
        );
        WorkflowStarted {
            workflow: &workflow.name,
            execution_id,
            node_count: workflow.nodes.len(),
        }
        .log();
        self.publish(execution_id, &workflow.id, WorkflowStatus::Running, None, None, None);

        let mut results: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut first_error: Option<WorkflowError> = None;
        // Execution hash per completed node, for lineage parent edges
        let mut hashes: HashMap<String, String> = HashMap::new();

        for level in levels {
            let mut runnable: Vec<&Node> = Vec::new();
            for node_id in &level {
                let node = match workflow.node(node_id) {
                    Some(node) => node,
                    None => continue,
                };
                if blocked.contains(node_id) {
                    self.transition(execution_id, &workflow.id, node_id, NodeStatus::Skipped, None);
                    continue;
                }
                runnable.push(node);
            }

            // One level runs with bounded concurrency; the level boundary is
            // a barrier, so inputs only ever come from finished levels
            let mut outcomes = stream::iter(runnable.into_iter().map(|node| {
                let inputs = self.gather_inputs(workflow, node, &reverse, &results, parameters);
                let parents: Vec<String> = reverse
                    .get(&node.id)
                    .into_iter()
                    .flatten()
                    .filter_map(|dep| hashes.get(dep).cloned())
                    .collect();
                async move {
                    self.transition(
                        execution_id,
                        &workflow.id,
                        &node.id,
                        NodeStatus::Running,
                        None,
                    );
                    let start_time = Utc::now();
                    let started = std::time::Instant::now();
                    let (inputs_json, result) = match inputs {
                        Ok(inputs) => {
                            let result = self.execute_node(node, inputs.clone()).await;
                            (inputs, result)
                        }
                        Err(error) => (serde_json::Value::Null, Err(error)),
                    };
                    let hash = self
                        .record_node(
                            node,
                            &parents,
                            &inputs_json,
                            &result,
                            start_time,
                            started.elapsed(),
                        )
                        .await;
                    (node.id.clone(), hash, result)
                }
            }))
            .buffer_unordered(self.level_parallelism);

            let mut level_results: Vec<(
                String,
                String,
                Result<serde_json::Value, WorkflowError>,
            )> = Vec::new();
            while let Some(outcome) = outcomes.next().await {
                level_results.push(outcome);
            }
            drop(outcomes);

            for (node_id, hash, outcome) in level_results {
                hashes.insert(node_id.clone(), hash);
                match outcome {
                    Ok(output) => {
                        results.insert(node_id.clone(), output.clone());
                        self.complete(execution_id, &workflow.id, &node_id, output);
                    }
                    Err(error) => {
                        self.fail(execution_id, &workflow.id, &node_id, &error);
                        for descendant in reachable_from(&graph, &node_id) {
                            blocked.insert(descendant);
                        }
                        if first_error.is_none() {
                            first_error = Some(error);
                        }
                    }
                }
            }
        }

        let final_status = if first_error.is_some() {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Completed
        };
        if let Some(mut entry) = self.executions.get_mut(execution_id) {
            entry.status = final_status;
        }
        self.publish(execution_id, &workflow.id, final_status, None, None, None);

        match first_error {
            Some(error) => Err(error),
            None => Ok(results),
        }
    }

    /// Walk inbound edges: a ported edge contributes `source_port ->
    /// target_port`; an unported edge merges the whole source output
    /// mapping. A source with no recorded output fails this node.
    fn gather_inputs(
        &self,
        workflow: &Workflow,
        node: &Node,
        reverse: &HashMap<String, Vec<String>>,
        results: &BTreeMap<String, serde_json::Value>,
        parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, WorkflowError> {
        let mut inputs = serde_json::Map::new();

        // Entry nodes see the execution parameters
        if node.kind == NodeKind::Input {
            if let Some(map) = parameters.as_object() {
                for (key, value) in map {
                    inputs.insert(key.clone(), value.clone());
                }
            }
        }

        let has_dependencies = reverse
            .get(&node.id)
            .map(|deps| !deps.is_empty())
            .unwrap_or(false);
        if has_dependencies {
            for edge in workflow.inbound_edges(&node.id) {
                let source_output =
                    results
                        .get(&edge.source)
                        .ok_or_else(|| WorkflowError::MissingInput {
                            node_id: node.id.clone(),
                            source: edge.source.clone(),
                        })?;

                match (&edge.source_port, &edge.target_port) {
                    (None, None) => {
                        if let Some(map) = source_output.as_object() {
                            for (key, value) in map {
                                inputs.insert(key.clone(), value.clone());
                            }
                        }
                    }
                    (source_port, target_port) => {
                        let value = match source_port {
                            Some(port) => source_output
                                .get(port)
                                .cloned()
                                .unwrap_or(serde_json::Value::Null),
                            None => source_output.clone(),
                        };
                        let key = target_port
                            .clone()
                            .or_else(|| source_port.clone())
                            .unwrap_or_else(|| edge.source.clone());
                        inputs.insert(key, value);
                    }
                }
            }
        }

        Ok(serde_json::Value::Object(inputs))
    }

    async fn execute_node(
        &self,
        node: &Node,
        inputs: serde_json::Value,
    ) -> Result<serde_json::Value, WorkflowError> {
        match node.kind {
            // Pass-through nodes carry their gathered inputs forward
            NodeKind::Input | NodeKind::Output => Ok(inputs),
            NodeKind::Component => {
                let driver = self.languages.get(&node.data.language).ok_or_else(|| {
                    WorkflowError::UnsupportedLanguage {
                        node_id: node.id.clone(),
                        language: node.data.language.clone(),
                    }
                })?;

                let source = node.data.source.clone().unwrap_or_default();
                let mut options = LanguageOptions::default();
                let mut attempts = 1u32;
                if let Some(config) = &node.data.config {
                    if let Some(timeout) = config.timeout {
                        options.timeout = std::time::Duration::from_secs(timeout);
                    }
                    options.environment = config.environment.clone();
                    attempts += config.retry.unwrap_or(0);
                }

                let mut last_error = None;
                for _ in 0..attempts {
                    match driver.execute(&source, &inputs, &options).await {
                        Ok(output) => return Ok(output),
                        Err(error) => last_error = Some(error),
                    }
                }
                Err(WorkflowError::NodeFailed {
                    node_id: node.id.clone(),
                    source: last_error.unwrap_or(crate::errors::LanguageError::Output {
                        runtime: node.data.language.clone(),
                        message: "no output".to_string(),
                    }),
                })
            }
        }
    }

    /// Write one `Component` vertex for a finished node, linked to the
    /// nodes it consumed. Returns the node's execution hash. Lineage
    /// failures are absorbed; workflow execution never depends on them.
    async fn record_node(
        &self,
        node: &Node,
        parents: &[String],
        inputs: &serde_json::Value,
        result: &Result<serde_json::Value, WorkflowError>,
        start_time: DateTime<Utc>,
        duration: std::time::Duration,
    ) -> String {
        let hash = execution_hash(parents, &node.id, inputs, start_time);
        let recorder = match &self.recorder {
            Some(recorder) => recorder.clone(),
            None => return hash,
        };

        let mut attributes = VertexAttributes::new();
        attributes.insert("Name".into(), serde_json::json!(node.data.label));
        attributes.insert("NodeID".into(), serde_json::json!(node.id));
        attributes.insert("ExecutionID".into(), serde_json::json!(hash));
        attributes.insert("Hash".into(), serde_json::json!(hash));
        attributes.insert(
            "StartTime".into(),
            serde_json::json!(start_time.to_rfc3339()),
        );
        attributes.insert(
            "ExecutionTime".into(),
            serde_json::json!(duration.as_secs_f64()),
        );
        attributes.insert("Success".into(), serde_json::json!(result.is_ok()));
        attributes.insert("Platform".into(), serde_json::json!(node.data.language));
        attributes.insert("Inputs".into(), inputs.clone());
        attributes.insert("ParentHashes".into(), serde_json::json!(parents));
        if let Some(source) = &node.data.source {
            attributes.insert("SourceCode".into(), serde_json::json!(source));
        }
        match result {
            Ok(output) => {
                attributes.insert("Outputs".into(), output.clone());
            }
            Err(error) => {
                attributes.insert("Error".into(), serde_json::json!(error.to_string()));
            }
        }

        if let Err(error) = recorder.record_component(attributes, parents).await {
            crate::observability::global_metrics().record_lineage_loss();
            LineageWriteFailed {
                component: &node.id,
                execution_id: &hash,
                error: &error,
            }
            .log();
        }
        hash
    }

    fn transition(
        &self,
        execution_id: &str,
        workflow_id: &str,
        node_id: &str,
        status: NodeStatus,
        message: Option<String>,
    ) {
        if let Some(mut entry) = self.executions.get_mut(execution_id) {
            if let Some(node) = entry.nodes.get_mut(node_id) {
                node.status = status;
                match status {
                    NodeStatus::Running => node.start_time = Some(Utc::now()),
                    NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped => {
                        node.end_time = Some(Utc::now())
                    }
                    NodeStatus::Pending => {}
                }
                if let Some(message) = &message {
                    node.error = Some(message.clone());
                }
            }
        }

        NodeStatusChanged {
            execution_id,
            node_id,
            status: status.as_str(),
        }
        .log();
        self.publish(
            execution_id,
            workflow_id,
            WorkflowStatus::Running,
            Some(node_id.to_string()),
            Some(status),
            message,
        );
    }

    fn complete(
        &self,
        execution_id: &str,
        workflow_id: &str,
        node_id: &str,
        output: serde_json::Value,
    ) {
        if let Some(mut entry) = self.executions.get_mut(execution_id) {
            if let Some(node) = entry.nodes.get_mut(node_id) {
                node.output = Some(output);
            }
        }
        self.transition(execution_id, workflow_id, node_id, NodeStatus::Completed, None);
    }

    fn fail(&self, execution_id: &str, workflow_id: &str, node_id: &str, error: &WorkflowError) {
        self.transition(
            execution_id,
            workflow_id,
            node_id,
            NodeStatus::Failed,
            Some(error.to_string()),
        );
    }

    fn publish(
        &self,
        execution_id: &str,
        workflow_id: &str,
        status: WorkflowStatus,
        node_id: Option<String>,
        node_status: Option<NodeStatus>,
        message: Option<String>,
    ) {
        // No subscribers is fine; the send result is deliberately ignored
        let _ = self.events.send(StatusUpdate {
            execution_id: execution_id.to_string(),
            workflow_id: workflow_id.to_string(),
            status,
            node_id,
            node_status,
            message,
            timestamp: Utc::now(),
        });
    }
}

/// Group a topological order into levels: a node's level is one past the
/// deepest of its dependencies, so every level only depends on earlier ones.
fn schedule_levels(graph: &DependencyGraph, order: &[String]) -> Vec<Vec<String>> {
    let reverse = graph.reverse_dependencies();
    let mut level_of: HashMap<String, usize> = HashMap::new();
    let mut levels: Vec<Vec<String>> = Vec::new();

    for node in order {
        let level = reverse
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|dep| level_of.get(dep))
            .max()
            .map(|deepest| deepest + 1)
            .unwrap_or(0);
        level_of.insert(node.clone(), level);
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(node.clone());
    }
    levels
}

/// Every node reachable from `start` along forward edges, excluding
/// `start` itself.
fn reachable_from(graph: &DependencyGraph, start: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(start.to_string());

    while let Some(node) = queue.pop_front() {
        for dependent in graph.dependents(&node) {
            if seen.insert(dependent.clone()) {
                queue.push_back(dependent.clone());
            }
        }
    }
    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Edge, NodeConfig, NodeData, Position};
    use async_trait::async_trait;
    use crate::errors::LanguageError;

    /// Echo driver: returns its inputs plus the node's source text, so
    /// wiring is observable without a runtime subprocess.
    struct EchoDriver;

    #[async_trait]
    impl LanguageDriver for EchoDriver {
        async fn execute(
            &self,
            source: &str,
            inputs: &serde_json::Value,
            _options: &LanguageOptions,
        ) -> Result<serde_json::Value, LanguageError> {
            if source == "fail" {
                return Err(LanguageError::Execution {
                    runtime: "echo".to_string(),
                    stderr: "scripted failure".to_string(),
                });
            }
            let mut output = inputs.as_object().cloned().unwrap_or_default();
            output.insert("from".to_string(), serde_json::json!(source));
            Ok(serde_json::Value::Object(output))
        }

        fn language(&self) -> &'static str {
            "echo"
        }
    }

    fn component(id: &str, source: &str) -> Node {
        Node {
            id: id.to_string(),
            kind: NodeKind::Component,
            position: Position::default(),
            data: NodeData {
                label: id.to_string(),
                language: "echo".to_string(),
                source: Some(source.to_string()),
                input_ports: vec![],
                output_ports: vec![],
                config: None,
            },
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            source_port: None,
            target_port: None,
        }
    }

    fn runner() -> DagRunner {
        let mut runner = DagRunner::new();
        runner.register_language(Arc::new(EchoDriver));
        runner
    }

    fn workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
        Workflow {
            id: "wf".to_string(),
            name: "wf".to_string(),
            description: None,
            nodes,
            edges,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn diamond_wiring_merges_both_branches_and_records_lineage() {
        // a -> b, a -> c, {b, c} -> d
        let wf = workflow(
            vec![
                component("a", "src-a"),
                component("b", "src-b"),
                component("c", "src-c"),
                component("d", "src-d"),
            ],
            vec![
                edge("e1", "a", "b"),
                edge("e2", "a", "c"),
                edge("e3", "b", "d"),
                edge("e4", "c", "d"),
            ],
        );

        let recorder = Arc::new(crate::graph::memory::MemoryRecorder::new());
        let dag = runner().with_recorder(recorder.clone());
        let results = dag
            .execute(&wf, "exec-1", &serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        // d saw output flowing through both b and c
        let d = &results["d"];
        assert_eq!(d["from"], "src-d");

        // One vertex per node, one edge per workflow edge
        assert_eq!(recorder.vertices_with_label("Component").len(), 4);
        assert_eq!(recorder.edges().len(), 4);
    }

    #[tokio::test]
    async fn ported_edges_select_named_outputs() {
        let mut b = component("b", "src-b");
        b.data.config = Some(NodeConfig::default());
        let wf = workflow(
            vec![component("a", "src-a"), b],
            vec![Edge {
                id: "e1".to_string(),
                source: "a".to_string(),
                target: "b".to_string(),
                source_port: Some("from".to_string()),
                target_port: Some("upstream".to_string()),
            }],
        );

        let results = runner()
            .execute(&wf, "exec-2", &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(results["b"]["upstream"], "src-a");
    }

    #[tokio::test]
    async fn failure_blocks_descendants_and_spares_siblings() {
        // a -> bad -> d ; a -> c (c unaffected)
        let wf = workflow(
            vec![
                component("a", "src-a"),
                component("bad", "fail"),
                component("c", "src-c"),
                component("d", "src-d"),
            ],
            vec![
                edge("e1", "a", "bad"),
                edge("e2", "a", "c"),
                edge("e3", "bad", "d"),
            ],
        );

        let dag = runner();
        let error = dag
            .execute(&wf, "exec-3", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(error, WorkflowError::NodeFailed { .. }));

        let snapshot = dag.execution("exec-3").unwrap();
        assert_eq!(snapshot.status, WorkflowStatus::Failed);
        assert_eq!(snapshot.nodes["bad"].status, NodeStatus::Failed);
        assert_eq!(snapshot.nodes["d"].status, NodeStatus::Skipped);
        assert_eq!(snapshot.nodes["c"].status, NodeStatus::Completed);
    }

    #[tokio::test]
    async fn input_nodes_receive_execution_parameters() {
        let mut input = component("start", "");
        input.kind = NodeKind::Input;
        let wf = workflow(
            vec![input, component("work", "src")],
            vec![edge("e1", "start", "work")],
        );

        let results = runner()
            .execute(&wf, "exec-4", &serde_json::json!({"seed": 7}))
            .await
            .unwrap();
        assert_eq!(results["work"]["seed"], 7);
    }

    #[tokio::test]
    async fn unsupported_language_fails_the_node() {
        let mut node = component("x", "src");
        node.data.language = "fortran".to_string();
        let wf = workflow(vec![node], vec![]);

        let error = runner()
            .execute(&wf, "exec-5", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(error, WorkflowError::UnsupportedLanguage { .. }));
    }

    #[tokio::test]
    async fn invalid_workflow_is_rejected_before_running() {
        let wf = workflow(
            vec![component("a", "s"), component("b", "s")],
            vec![edge("e1", "a", "b"), edge("e2", "b", "a")],
        );
        let error = runner()
            .execute(&wf, "exec-6", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(error, WorkflowError::Validation(_)));
    }

    #[tokio::test]
    async fn status_events_flow_to_subscribers() {
        let dag = runner();
        let mut events = dag.subscribe();
        let wf = workflow(vec![component("a", "src")], vec![]);

        dag.execute(&wf, "exec-7", &serde_json::json!({}))
            .await
            .unwrap();

        let mut seen_running = false;
        let mut seen_completed = false;
        while let Ok(update) = events.try_recv() {
            if update.node_id.as_deref() == Some("a") {
                match update.node_status {
                    Some(NodeStatus::Running) => seen_running = true,
                    Some(NodeStatus::Completed) => seen_completed = true,
                    _ => {}
                }
            }
        }
        assert!(seen_running);
        assert!(seen_completed);
    }

    #[test]
    fn levels_respect_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("a", "c");
        graph.add_edge("b", "d");
        graph.add_edge("c", "d");
        let order = graph.topological_sort().unwrap();
        let levels = schedule_levels(&graph, &order);

        assert_eq!(levels[0], vec!["a"]);
        assert_eq!(levels[1].len(), 2);
        assert_eq!(levels[2], vec!["d"]);
    }

    #[test]
    fn reachable_excludes_the_start_node() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        let mut reachable = reachable_from(&graph, "a");
        reachable.sort();
        assert_eq!(reachable, vec!["b", "c"]);
    }
}
