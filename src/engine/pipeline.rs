use chrono::{SecondsFormat, Utc};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::engine::component::{ComponentCall, ComponentResult, ComponentRunner};
use crate::errors::{ComponentError, PipelineError};
use crate::observability::messages::{
    engine::{ClearGraphSkipped, PipelineCompleted, PipelineStarted},
    graph::LineageWriteFailed,
    StructuredLog,
};
use crate::observability::MetricsRegistry;
use crate::serialize::execution_hash;
use crate::traits::{LineageRecorder, VertexAttributes};

/// How component calls inside a pipeline run.
#[derive(Debug, Clone)]
pub enum ExecutionMode {
    /// User code runs on the calling task; component calls block until done
    Sequential,
    /// Component calls are spawned onto a bounded worker pool; submission
    /// blocks when the pool is saturated
    Distributed { max_parallel_tasks: usize },
}

impl ExecutionMode {
    fn label(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Distributed { .. } => "distributed",
        }
    }
}

/// Declaration-time options for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub name: String,
    /// Truncate the graph before the run. Honored only in sequential mode;
    /// concurrent distributed pipelines would race on the clear.
    pub clear_graph: bool,
    pub mode: ExecutionMode,
}

impl PipelineOptions {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            clear_graph: false,
            mode: ExecutionMode::Sequential,
        }
    }

    pub fn clear_graph(mut self, clear: bool) -> Self {
        self.clear_graph = clear;
        self
    }

    pub fn distributed(mut self, max_parallel_tasks: usize) -> Self {
        self.mode = ExecutionMode::Distributed {
            max_parallel_tasks: max_parallel_tasks.max(1),
        };
        self
    }
}

/// Handle to a submitted component call. In sequential mode the result is
/// already present; in distributed mode it resolves when the worker
/// finishes.
pub struct ComponentHandle {
    inner: HandleInner,
}

enum HandleInner {
    Ready(Result<ComponentResult, ComponentError>),
    Task(tokio::task::JoinHandle<Result<ComponentResult, ComponentError>>),
}

impl ComponentHandle {
    pub async fn result(self) -> Result<ComponentResult, ComponentError> {
        match self.inner {
            HandleInner::Ready(result) => result,
            HandleInner::Task(task) => task.await.unwrap_or_else(|e| {
                Err(ComponentError::Execution {
                    component: "<worker>".to_string(),
                    execution_id: String::new(),
                    platform: crate::traits::Platform::Local,
                    source: crate::errors::PlatformError::Execution {
                        platform: crate::traits::Platform::Local,
                        message: format!("worker task failed: {}", e),
                        retryable: false,
                    },
                })
            }),
        }
    }
}

/// Handed to the user composition function; routes component calls
/// according to the pipeline's execution mode.
#[derive(Clone)]
pub struct PipelineContext {
    pool: Option<Arc<Semaphore>>,
}

impl PipelineContext {
    /// Submit one component call. Sequential mode runs it inline;
    /// distributed mode spawns it once a pool slot frees up.
    pub async fn submit(
        &self,
        runner: Arc<ComponentRunner>,
        call: ComponentCall,
    ) -> ComponentHandle {
        match &self.pool {
            None => ComponentHandle {
                inner: HandleInner::Ready(runner.invoke(call).await),
            },
            Some(pool) => {
                // Backpressure: saturated pool blocks submission here
                let permit = match pool.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    // A closed pool degrades to inline execution
                    Err(_) => {
                        return ComponentHandle {
                            inner: HandleInner::Ready(runner.invoke(call).await),
                        }
                    }
                };
                let task = tokio::spawn(async move {
                    let _permit = permit;
                    runner.invoke(call).await
                });
                ComponentHandle {
                    inner: HandleInner::Task(task),
                }
            }
        }
    }

    /// Submit and wait in one step.
    pub async fn invoke(
        &self,
        runner: Arc<ComponentRunner>,
        call: ComponentCall,
    ) -> Result<ComponentResult, ComponentError> {
        self.submit(runner, call).await.result().await
    }
}

/// Demarcates one end-to-end workflow execution: optional graph clear, a
/// `PipelineStart` vertex, the user composition function, and a
/// `PipelineEnd` vertex on return or failure.
pub struct PipelineRunner {
    options: PipelineOptions,
    recorder: Option<Arc<dyn LineageRecorder>>,
    metrics: Arc<MetricsRegistry>,
}

impl PipelineRunner {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            recorder: None,
            metrics: crate::observability::global_metrics(),
        }
    }

    pub fn recorder(mut self, recorder: Arc<dyn LineageRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run the user composition function between the start and end markers.
    pub async fn run<T, F, Fut>(&self, body: F) -> Result<T, PipelineError>
    where
        F: FnOnce(PipelineContext) -> Fut,
        Fut: Future<Output = Result<T, ComponentError>>,
    {
        let name = self.options.name.clone();
        let wall = Instant::now();

        if self.options.clear_graph {
            match (&self.options.mode, &self.recorder) {
                (ExecutionMode::Sequential, Some(recorder)) => {
                    if let Err(error) = recorder.clear().await {
                        self.lineage_loss(&name, &error);
                    }
                }
                (ExecutionMode::Distributed { .. }, _) => {
                    ClearGraphSkipped { pipeline: &name }.log();
                }
                _ => {}
            }
        }

        let pipeline_id = execution_hash(&[], &name, &json!({}), Utc::now());
        PipelineStarted {
            pipeline: &name,
            pipeline_id: &pipeline_id,
            mode: self.options.mode.label(),
        }
        .log();

        self.record_marker(&name, &pipeline_id, "PipelineStart", None, None)
            .await;

        let context = PipelineContext {
            pool: match self.options.mode {
                ExecutionMode::Sequential => None,
                ExecutionMode::Distributed { max_parallel_tasks } => {
                    Some(Arc::new(Semaphore::new(max_parallel_tasks)))
                }
            },
        };

        match body(context).await {
            Ok(value) => {
                let duration = wall.elapsed();
                self.record_marker(
                    &name,
                    &pipeline_id,
                    "PipelineEnd",
                    Some(duration),
                    None,
                )
                .await;
                PipelineCompleted {
                    pipeline: &name,
                    pipeline_id: &pipeline_id,
                    duration,
                }
                .log();
                Ok(value)
            }
            Err(error) => {
                let duration = wall.elapsed();
                self.record_marker(
                    &name,
                    &pipeline_id,
                    "PipelineEnd",
                    Some(duration),
                    Some(error.to_string()),
                )
                .await;

                let failed_component = match &error {
                    ComponentError::Execution { component, .. }
                    | ComponentError::Configuration { component, .. } => Some(component.clone()),
                    ComponentError::Validation(_) => None,
                };
                Err(PipelineError {
                    pipeline: name,
                    failed_component,
                    source: Box::new(error),
                })
            }
        }
    }

    async fn record_marker(
        &self,
        name: &str,
        pipeline_id: &str,
        marker: &str,
        duration: Option<std::time::Duration>,
        error: Option<String>,
    ) {
        let recorder = match &self.recorder {
            Some(recorder) => recorder.clone(),
            None => return,
        };

        let mut attributes = VertexAttributes::new();
        attributes.insert("Name".into(), json!(format!("Pipeline:{}", name)));
        attributes.insert("PipelineID".into(), json!(pipeline_id));
        attributes.insert("Type".into(), json!(marker));

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        match duration {
            None => {
                attributes.insert("StartTime".into(), json!(now));
            }
            Some(duration) => {
                attributes.insert("EndTime".into(), json!(now));
                attributes.insert("ExecutionTime".into(), json!(duration.as_secs_f64()));
                attributes.insert("Success".into(), json!(error.is_none()));
            }
        }
        if let Some(message) = error {
            attributes.insert("Error".into(), json!(message));
        }

        if let Err(error) = recorder.record_pipeline(attributes).await {
            self.lineage_loss(name, &error);
        }
    }

    fn lineage_loss(&self, name: &str, error: &dyn std::error::Error) {
        self.metrics.record_lineage_loss();
        LineageWriteFailed {
            component: name,
            execution_id: "<pipeline>",
            error,
        }
        .log();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::component::ComponentSpec;
    use crate::graph::memory::MemoryRecorder;
    use crate::serialize::Value;
    use std::collections::BTreeMap;

    fn double_runner(metrics: Arc<MetricsRegistry>, recorder: Arc<MemoryRecorder>) -> Arc<ComponentRunner> {
        let spec = ComponentSpec::builder("double")
            .parameter("x")
            .native(|inputs| {
                let mut fields = BTreeMap::new();
                fields.insert(
                    "doubled".to_string(),
                    Value::Int(inputs.i64("x").unwrap_or(0) * 2),
                );
                Ok(Value::record("outputs", fields))
            })
            .build();
        Arc::new(
            ComponentRunner::builder(spec)
                .metrics(metrics)
                .recorder(recorder)
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn sequential_pipeline_writes_start_and_end_markers() {
        let recorder = Arc::new(MemoryRecorder::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let runner = PipelineRunner::new(PipelineOptions::new("demo"))
            .recorder(recorder.clone())
            .metrics(metrics.clone());
        let component = double_runner(metrics, recorder.clone());

        let result = runner
            .run(|ctx| async move {
                let out = ctx
                    .invoke(component, ComponentCall::new().kwarg("x", 21i64))
                    .await?;
                Ok(out.output("doubled").cloned())
            })
            .await
            .unwrap();

        assert_eq!(result, Some(Value::Int(42)));

        let markers = recorder.vertices_with_label("Pipeline");
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].attributes["Type"], "PipelineStart");
        assert_eq!(markers[1].attributes["Type"], "PipelineEnd");
        assert_eq!(markers[1].attributes["Success"], true);
    }

    #[tokio::test]
    async fn failing_body_records_failure_and_wraps_the_error() {
        let recorder = Arc::new(MemoryRecorder::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let runner = PipelineRunner::new(PipelineOptions::new("broken"))
            .recorder(recorder.clone())
            .metrics(metrics);

        let result: Result<(), _> = runner
            .run(|_ctx| async move {
                Err(ComponentError::Validation(
                    crate::errors::ValidationError::MissingParameter {
                        component: "x".to_string(),
                        parameter: "a".to_string(),
                    },
                ))
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.pipeline, "broken");

        let markers = recorder.vertices_with_label("Pipeline");
        assert_eq!(markers[1].attributes["Success"], false);
        assert!(markers[1].attributes.contains_key("Error"));
    }

    #[tokio::test]
    async fn clear_graph_runs_in_sequential_mode() {
        let recorder = Arc::new(MemoryRecorder::new());
        recorder
            .record_pipeline(BTreeMap::from([(
                "Name".to_string(),
                serde_json::json!("Pipeline:stale"),
            )]))
            .await
            .unwrap();

        let metrics = Arc::new(MetricsRegistry::new());
        let runner = PipelineRunner::new(PipelineOptions::new("fresh").clear_graph(true))
            .recorder(recorder.clone())
            .metrics(metrics);
        runner.run(|_ctx| async move { Ok(()) }).await.unwrap();

        // Stale vertex gone; only this run's two markers remain
        assert_eq!(recorder.vertices().len(), 2);
    }

    #[tokio::test]
    async fn clear_graph_is_ignored_in_distributed_mode() {
        let recorder = Arc::new(MemoryRecorder::new());
        recorder
            .record_pipeline(BTreeMap::from([(
                "Name".to_string(),
                serde_json::json!("Pipeline:stale"),
            )]))
            .await
            .unwrap();

        let metrics = Arc::new(MetricsRegistry::new());
        let runner =
            PipelineRunner::new(PipelineOptions::new("fresh").clear_graph(true).distributed(4))
                .recorder(recorder.clone())
                .metrics(metrics);
        runner.run(|_ctx| async move { Ok(()) }).await.unwrap();

        // Stale vertex survives: the clear was skipped
        assert_eq!(recorder.vertices().len(), 3);
    }

    #[tokio::test]
    async fn distributed_mode_runs_submissions_on_the_pool() {
        let recorder = Arc::new(MemoryRecorder::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let runner = PipelineRunner::new(PipelineOptions::new("fanout").distributed(2))
            .recorder(recorder.clone())
            .metrics(metrics.clone());
        let component = double_runner(metrics, recorder.clone());

        let outputs = runner
            .run(|ctx| {
                let component = component.clone();
                async move {
                    let mut handles = Vec::new();
                    for x in 0..4i64 {
                        handles.push(
                            ctx.submit(
                                component.clone(),
                                ComponentCall::new().kwarg("x", x),
                            )
                            .await,
                        );
                    }
                    let mut results = Vec::new();
                    for handle in handles {
                        results.push(handle.result().await?.output("doubled").cloned());
                    }
                    Ok(results)
                }
            })
            .await
            .unwrap();

        assert_eq!(outputs.len(), 4);
        assert_eq!(recorder.vertices_with_label("Component").len(), 4);
    }
}
