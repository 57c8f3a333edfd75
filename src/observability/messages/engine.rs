//! Message types for pipeline and workflow lifecycle events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A pipeline run began; the `PipelineStart` vertex has been written.
///
/// # Log Level
/// `info!` - important operational event
pub struct PipelineStarted<'a> {
    pub pipeline: &'a str,
    pub pipeline_id: &'a str,
    pub mode: &'a str,
}

impl Display for PipelineStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting pipeline '{}' in {} mode (id {})",
            self.pipeline, self.mode, self.pipeline_id
        )
    }
}

impl StructuredLog for PipelineStarted<'_> {
    fn log(&self) {
        tracing::info!(
            pipeline = self.pipeline,
            pipeline_id = self.pipeline_id,
            mode = self.mode,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pipeline",
            span_name = name,
            pipeline = self.pipeline,
            pipeline_id = self.pipeline_id,
            mode = self.mode,
        )
    }
}

/// A pipeline run finished and the `PipelineEnd` vertex was written.
pub struct PipelineCompleted<'a> {
    pub pipeline: &'a str,
    pub pipeline_id: &'a str,
    pub duration: std::time::Duration,
}

impl Display for PipelineCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' completed in {:?}",
            self.pipeline, self.duration
        )
    }
}

impl StructuredLog for PipelineCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            pipeline = self.pipeline,
            pipeline_id = self.pipeline_id,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pipeline_completed",
            span_name = name,
            pipeline = self.pipeline,
        )
    }
}

/// Clear-on-start was requested together with distributed mode; concurrent
/// pipelines would race on the clear, so it is skipped.
pub struct ClearGraphSkipped<'a> {
    pub pipeline: &'a str,
}

impl Display for ClearGraphSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' requested clear_on_start in distributed mode; ignoring",
            self.pipeline
        )
    }
}

impl StructuredLog for ClearGraphSkipped<'_> {
    fn log(&self) {
        tracing::warn!(pipeline = self.pipeline, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("clear_graph_skipped", span_name = name, pipeline = self.pipeline)
    }
}

/// A workflow execution started scheduling nodes.
pub struct WorkflowStarted<'a> {
    pub workflow: &'a str,
    pub execution_id: &'a str,
    pub node_count: usize,
}

impl Display for WorkflowStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Executing workflow '{}' with {} nodes (execution {})",
            self.workflow, self.node_count, self.execution_id
        )
    }
}

impl StructuredLog for WorkflowStarted<'_> {
    fn log(&self) {
        tracing::info!(
            workflow = self.workflow,
            execution_id = self.execution_id,
            node_count = self.node_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "workflow",
            span_name = name,
            workflow = self.workflow,
            execution_id = self.execution_id,
        )
    }
}

/// A workflow node moved between statuses.
pub struct NodeStatusChanged<'a> {
    pub execution_id: &'a str,
    pub node_id: &'a str,
    pub status: &'a str,
}

impl Display for NodeStatusChanged<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' is {} (execution {})",
            self.node_id, self.status, self.execution_id
        )
    }
}

impl StructuredLog for NodeStatusChanged<'_> {
    fn log(&self) {
        tracing::debug!(
            execution_id = self.execution_id,
            node_id = self.node_id,
            status = self.status,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "node_status",
            span_name = name,
            node_id = self.node_id,
            status = self.status,
        )
    }
}
