use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backends::{
    BatchApi, BatchDriver, BoundInputs, ClusterApi, DockerDriver, FaasApi, KubectlCluster,
    KubernetesDriver, LambdaDriver, LocalDriver, NativeFn, SlurmDriver, SshDriver,
};
use crate::backends::script::extract_json_line;
use crate::config::{PlatformConfig, PlatformSettings, RetrySettings};
use crate::engine::retry::RetryPolicy;
use crate::errors::{ComponentError, PlatformError, ValidationError};
use crate::observability::messages::{
    component::{
        ComponentExecutionCompleted, ComponentExecutionFailed, ComponentExecutionStarted,
    },
    graph::LineageWriteFailed,
    StructuredLog,
};
use crate::observability::MetricsRegistry;
use crate::serialize::{decode, encode, execution_hash, Value};
use crate::traits::{
    EncodedInputs, FunctionDescriptor, InvocationContext, LineageRecorder, Platform,
    PlatformDriver, RawOutput, VertexAttributes,
};

/// One declared parameter: name, optional type hint, optional default.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub type_hint: Option<String>,
    pub default: Option<Value>,
}

/// Static description of a user component, constructed once at declaration
/// time and consulted by every invocation. The invocation path reads it,
/// never writes.
pub struct ComponentSpec {
    name: String,
    parameters: Vec<ParameterSpec>,
    source_listing: String,
    file_path: String,
    line_number: u32,
    settings: PlatformSettings,
    native: Option<Arc<NativeFn>>,
}

impl ComponentSpec {
    pub fn builder(name: &str) -> ComponentSpecBuilder {
        ComponentSpecBuilder {
            name: name.to_string(),
            parameters: Vec::new(),
            source_listing: String::new(),
            file_path: String::new(),
            line_number: 0,
            settings: PlatformSettings::default(),
            native: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn platform(&self) -> Platform {
        self.settings.config.platform()
    }

    pub fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    pub fn descriptor(&self) -> FunctionDescriptor {
        FunctionDescriptor {
            name: self.name.clone(),
            source_listing: self.source_listing.clone(),
            parameter_order: self.parameters.iter().map(|p| p.name.clone()).collect(),
        }
    }

    /// Bind positional and keyword arguments against the declared signature,
    /// applying defaults. Mirrors call-site binding rules: positionals fill
    /// parameters in order, keywords must name declared parameters, and a
    /// parameter bound twice is an error.
    pub fn bind_inputs(
        &self,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, ValidationError> {
        if args.len() > self.parameters.len() {
            return Err(ValidationError::TooManyArguments {
                component: self.name.clone(),
                expected: self.parameters.len(),
                got: args.len(),
            });
        }

        let mut bound: BTreeMap<String, Value> = BTreeMap::new();
        for (parameter, value) in self.parameters.iter().zip(args.iter()) {
            bound.insert(parameter.name.clone(), value.clone());
        }

        for (name, value) in kwargs {
            if !self.parameters.iter().any(|p| &p.name == name) {
                return Err(ValidationError::UnknownParameter {
                    component: self.name.clone(),
                    parameter: name.clone(),
                });
            }
            if bound.contains_key(name) {
                return Err(ValidationError::DuplicateArgument {
                    component: self.name.clone(),
                    parameter: name.clone(),
                });
            }
            bound.insert(name.clone(), value.clone());
        }

        for parameter in &self.parameters {
            if !bound.contains_key(&parameter.name) {
                match &parameter.default {
                    Some(default) => {
                        bound.insert(parameter.name.clone(), default.clone());
                    }
                    None => {
                        return Err(ValidationError::MissingParameter {
                            component: self.name.clone(),
                            parameter: parameter.name.clone(),
                        })
                    }
                }
            }
        }

        Ok(bound)
    }
}

pub struct ComponentSpecBuilder {
    name: String,
    parameters: Vec<ParameterSpec>,
    source_listing: String,
    file_path: String,
    line_number: u32,
    settings: PlatformSettings,
    native: Option<Arc<NativeFn>>,
}

impl ComponentSpecBuilder {
    pub fn parameter(mut self, name: &str) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.to_string(),
            type_hint: None,
            default: None,
        });
        self
    }

    pub fn typed_parameter(mut self, name: &str, type_hint: &str) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.to_string(),
            type_hint: Some(type_hint.to_string()),
            default: None,
        });
        self
    }

    pub fn parameter_with_default(mut self, name: &str, default: Value) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.to_string(),
            type_hint: None,
            default: Some(default),
        });
        self
    }

    /// Source listing shipped to remote platforms; the in-process driver
    /// ignores it.
    pub fn source_listing(mut self, source: &str) -> Self {
        self.source_listing = source.to_string();
        self
    }

    pub fn declared_at(mut self, file_path: &str, line_number: u32) -> Self {
        self.file_path = file_path.to_string();
        self.line_number = line_number;
        self
    }

    pub fn settings(mut self, settings: PlatformSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn platform_config(mut self, config: PlatformConfig) -> Self {
        self.settings.config = config;
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.settings.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, auto_retry: bool, max_retries: u32) -> Self {
        self.settings.auto_retry = auto_retry;
        self.settings.max_retries = max_retries;
        self
    }

    pub fn native<F>(mut self, f: F) -> Self
    where
        F: Fn(&BoundInputs) -> Result<Value, crate::backends::NativeError> + Send + Sync + 'static,
    {
        self.native = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> ComponentSpec {
        ComponentSpec {
            name: self.name,
            parameters: self.parameters,
            source_listing: self.source_listing,
            file_path: self.file_path,
            line_number: self.line_number,
            settings: self.settings,
            native: self.native,
        }
    }
}

/// Parent execution ids supplied by the caller via the reserved
/// `parent_hash` argument, never forwarded to the user function.
#[derive(Debug, Clone, Default)]
pub enum ParentHashes {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl ParentHashes {
    pub fn normalize(&self) -> Vec<String> {
        match self {
            ParentHashes::None => Vec::new(),
            ParentHashes::One(hash) => vec![hash.clone()],
            ParentHashes::Many(hashes) => hashes.clone(),
        }
    }
}

/// One invocation's arguments.
#[derive(Debug, Clone, Default)]
pub struct ComponentCall {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
    pub parent_hash: ParentHashes,
}

impl ComponentCall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.to_string(), value.into());
        self
    }

    pub fn parent(mut self, hash: &str) -> Self {
        self.parent_hash = match self.parent_hash {
            ParentHashes::None => ParentHashes::One(hash.to_string()),
            ParentHashes::One(existing) => {
                ParentHashes::Many(vec![existing, hash.to_string()])
            }
            ParentHashes::Many(mut hashes) => {
                hashes.push(hash.to_string());
                ParentHashes::Many(hashes)
            }
        };
        self
    }

    pub fn parents(mut self, hashes: Vec<String>) -> Self {
        self.parent_hash = ParentHashes::Many(hashes);
        self
    }
}

/// What an invocation hands back: the projected outputs, the execution hash
/// downstream calls reference, the component name, and the completion time.
#[derive(Debug, Clone)]
pub struct ComponentResult {
    pub outputs: BTreeMap<String, Value>,
    pub hash: String,
    pub component: String,
    pub timestamp: DateTime<Utc>,
}

impl ComponentResult {
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }
}

/// Version-control metadata attached to recorded vertices when available.
#[derive(Debug, Clone)]
pub struct VcsInfo {
    pub commit: String,
    pub branch: String,
    pub author: String,
    pub message: String,
}

impl VcsInfo {
    /// Best-effort detection from the working copy; absence is not an error.
    pub fn detect() -> Option<Self> {
        let read = |args: &[&str]| -> Option<String> {
            let output = std::process::Command::new("git").args(args).output().ok()?;
            output
                .status
                .success()
                .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
        };

        Some(Self {
            commit: read(&["rev-parse", "HEAD"])?,
            branch: read(&["rev-parse", "--abbrev-ref", "HEAD"])?,
            author: read(&["log", "-1", "--format=%an <%ae>"])?,
            message: read(&["log", "-1", "--format=%s"])?,
        })
    }
}

/// Per-invocation orchestration for one declared component: bind and encode
/// inputs, derive the execution id, dispatch under the retry policy, project
/// the result, and record the lineage vertex.
pub struct ComponentRunner {
    spec: Arc<ComponentSpec>,
    driver: Arc<dyn PlatformDriver>,
    recorder: Option<Arc<dyn LineageRecorder>>,
    metrics: Arc<MetricsRegistry>,
    additional_attributes: VertexAttributes,
    vcs: Option<VcsInfo>,
    cancel: CancellationToken,
    retry_delay: std::time::Duration,
    graph_retry: RetrySettings,
}

impl std::fmt::Debug for ComponentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRunner")
            .field("spec", &self.spec.name())
            .field("additional_attributes", &self.additional_attributes)
            .field("vcs", &self.vcs)
            .field("retry_delay", &self.retry_delay)
            .field("graph_retry", &self.graph_retry)
            .finish()
    }
}

impl ComponentRunner {
    pub fn builder(spec: ComponentSpec) -> ComponentRunnerBuilder {
        // Resolved once per process; decorator-level overrides go through
        // the builder methods
        let resolved = crate::config::global_config();
        ComponentRunnerBuilder {
            spec: Arc::new(spec),
            driver: None,
            recorder: None,
            metrics: None,
            additional_attributes: VertexAttributes::new(),
            vcs: None,
            cancel: CancellationToken::new(),
            retry_delay: resolved.retry.delay,
            graph_retry: resolved.retry.clone(),
            cluster_api: None,
            faas_api: None,
            batch_api: None,
        }
    }

    pub fn spec(&self) -> &ComponentSpec {
        &self.spec
    }

    /// Execute one invocation end to end.
    pub async fn invoke(&self, call: ComponentCall) -> Result<ComponentResult, ComponentError> {
        let wall = Instant::now();
        let start_time = Utc::now();
        let name = self.spec.name.clone();
        let platform = self.spec.platform();
        let parents = call.parent_hash.normalize();

        // Configuration and signature problems fail before any dispatch and
        // before an execution id exists; nothing is recorded for them
        self.spec
            .settings
            .config
            .validate()
            .map_err(|source| ComponentError::Configuration {
                component: name.clone(),
                source,
            })?;
        let bound = self.spec.bind_inputs(&call.args, &call.kwargs)?;

        let mut encoded = EncodedInputs::default();
        for (parameter, value) in &bound {
            encoded.kwargs.insert(parameter.clone(), encode(value));
        }
        let inputs_json =
            serde_json::Value::Object(encoded.kwargs.clone().into_iter().collect());

        let execution_id = execution_hash(&parents, &name, &inputs_json, start_time);
        let context = InvocationContext {
            execution_id: execution_id.clone(),
            component_name: name.clone(),
            start_time,
            parent_ids: parents.clone(),
        };

        ComponentExecutionStarted {
            component: &name,
            execution_id: &execution_id,
            platform: platform.as_str(),
        }
        .log();

        let retry = if self.spec.settings.auto_retry {
            RetryPolicy::new(self.spec.settings.max_retries, self.retry_delay, 2.0)
        } else {
            RetryPolicy::none()
        };

        let descriptor = self.spec.descriptor();
        let dispatch = retry
            .run(&name, &self.cancel, || {
                self.metrics.record_attempt(&name);
                let descriptor = descriptor.clone();
                let encoded = encoded.clone();
                let context = context.clone();
                async move { self.driver.execute(&descriptor, &encoded, &context).await }
            })
            .await
            .and_then(|raw| decode_raw_output(raw, &platform));

        let duration = wall.elapsed();
        self.metrics.record_invocation(&name, duration);

        match dispatch {
            Ok(value) => {
                let result = ComponentResult {
                    outputs: project_result(value),
                    hash: execution_id.clone(),
                    component: name.clone(),
                    timestamp: Utc::now(),
                };

                self.record(&context, &inputs_json, Ok(&result), duration)
                    .await;

                ComponentExecutionCompleted {
                    component: &name,
                    execution_id: &execution_id,
                    duration,
                }
                .log();
                Ok(result)
            }
            Err(source) => {
                self.metrics
                    .record_error(&name, platform.as_str(), source.kind());
                self.record(&context, &inputs_json, Err(&source), duration)
                    .await;

                ComponentExecutionFailed {
                    component: &name,
                    execution_id: &execution_id,
                    error: &source,
                }
                .log();

                Err(ComponentError::Execution {
                    component: name,
                    execution_id,
                    platform,
                    source,
                })
            }
        }
    }

    /// Write the `Component` vertex for this invocation, success or failure.
    /// Lineage-store failures never fail the invocation: after the store's
    /// retries the loss is logged and metered, and the caller still gets its
    /// result.
    async fn record(
        &self,
        context: &InvocationContext,
        inputs_json: &serde_json::Value,
        outcome: Result<&ComponentResult, &PlatformError>,
        duration: std::time::Duration,
    ) {
        let recorder = match &self.recorder {
            Some(recorder) => recorder.clone(),
            None => return,
        };

        // Cancellation is honored before the write; the computation result
        // still reaches the caller
        if self.cancel.is_cancelled() {
            self.metrics.record_lineage_loss();
            return;
        }

        let mut attributes = VertexAttributes::new();
        attributes.insert("Name".into(), json!(self.spec.name));
        attributes.insert("ExecutionID".into(), json!(context.execution_id));
        attributes.insert("Hash".into(), json!(context.execution_id));
        attributes.insert(
            "StartTime".into(),
            json!(context
                .start_time
                .to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        attributes.insert("ExecutionTime".into(), json!(duration.as_secs_f64()));
        attributes.insert("Success".into(), json!(outcome.is_ok()));
        attributes.insert("Platform".into(), json!(self.spec.platform().as_str()));
        attributes.insert("Inputs".into(), inputs_json.clone());
        attributes.insert("ParentHashes".into(), json!(context.parent_ids));
        attributes.insert("SourceCode".into(), json!(self.spec.source_listing));
        attributes.insert("FilePath".into(), json!(self.spec.file_path));
        attributes.insert("LineNumber".into(), json!(self.spec.line_number));

        match outcome {
            Ok(result) => {
                let outputs: serde_json::Map<String, serde_json::Value> = result
                    .outputs
                    .iter()
                    .map(|(key, value)| (key.clone(), encode(value)))
                    .collect();
                attributes.insert(
                    "Outputs".into(),
                    json!({
                        "outputs": outputs,
                        "hash": result.hash,
                        "component": result.component,
                        "timestamp": result
                            .timestamp
                            .to_rfc3339_opts(SecondsFormat::Micros, true),
                    }),
                );
            }
            Err(error) => {
                attributes.insert(
                    "Error".into(),
                    json!({
                        "error_type": error.kind(),
                        "error_message": error.to_string(),
                    }),
                );
            }
        }

        for (key, value) in &self.additional_attributes {
            attributes.insert(key.clone(), value.clone());
        }
        if let Some(vcs) = &self.vcs {
            attributes.insert("GitCommit".into(), json!(vcs.commit));
            attributes.insert("GitBranch".into(), json!(vcs.branch));
            attributes.insert("GitAuthor".into(), json!(vcs.author));
            attributes.insert("GitMessage".into(), json!(vcs.message));
        }

        let mut attempts = self.graph_retry.count.max(1);
        loop {
            match recorder
                .record_component(attributes.clone(), &context.parent_ids)
                .await
            {
                Ok(_) => return,
                Err(error) => {
                    attempts -= 1;
                    if attempts == 0 {
                        self.metrics.record_lineage_loss();
                        LineageWriteFailed {
                            component: &self.spec.name,
                            execution_id: &context.execution_id,
                            error: &error,
                        }
                        .log();
                        return;
                    }
                    tokio::time::sleep(self.graph_retry.delay).await;
                }
            }
        }
    }
}

/// If the returned value has named fields, use them; if a mapping, use it
/// directly; otherwise wrap as `{result: value}`.
fn project_result(value: Value) -> BTreeMap<String, Value> {
    match value {
        Value::Record { fields, .. } => fields,
        Value::Map(entries) => entries,
        other => {
            let mut outputs = BTreeMap::new();
            outputs.insert("result".to_string(), other);
            outputs
        }
    }
}

/// Decode whatever form the driver produced into an engine value.
fn decode_raw_output(raw: RawOutput, platform: &Platform) -> Result<Value, PlatformError> {
    match raw {
        RawOutput::Native(value) => Ok(value),
        RawOutput::Json(value) => Ok(decode(&value)),
        RawOutput::Text(text) => extract_json_line(&text)
            .map(|value| decode(&value))
            .map_err(|message| PlatformError::Execution {
                platform: platform.clone(),
                message,
                retryable: false,
            }),
    }
}

pub struct ComponentRunnerBuilder {
    spec: Arc<ComponentSpec>,
    driver: Option<Arc<dyn PlatformDriver>>,
    recorder: Option<Arc<dyn LineageRecorder>>,
    metrics: Option<Arc<MetricsRegistry>>,
    additional_attributes: VertexAttributes,
    vcs: Option<VcsInfo>,
    cancel: CancellationToken,
    retry_delay: std::time::Duration,
    graph_retry: RetrySettings,
    cluster_api: Option<Arc<dyn ClusterApi>>,
    faas_api: Option<Arc<dyn FaasApi>>,
    batch_api: Option<Arc<dyn BatchApi>>,
}

impl ComponentRunnerBuilder {
    pub fn recorder(mut self, recorder: Arc<dyn LineageRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn additional_attribute(mut self, key: &str, value: serde_json::Value) -> Self {
        self.additional_attributes.insert(key.to_string(), value);
        self
    }

    pub fn vcs(mut self, vcs: VcsInfo) -> Self {
        self.vcs = Some(vcs);
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Base delay between dispatch re-attempts.
    pub fn retry_delay(mut self, delay: std::time::Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Retry settings for lineage writes, separate from dispatch retries.
    pub fn graph_retry(mut self, settings: RetrySettings) -> Self {
        self.graph_retry = settings;
        self
    }

    /// Inject the cluster binding for the kubernetes platform. Defaults to
    /// the bundled `kubectl` binding.
    pub fn cluster_api(mut self, api: Arc<dyn ClusterApi>) -> Self {
        self.cluster_api = Some(api);
        self
    }

    /// Inject the FaaS binding for the lambda platform. Required to run on
    /// lambda; the engine carries only the contract.
    pub fn faas_api(mut self, api: Arc<dyn FaasApi>) -> Self {
        self.faas_api = Some(api);
        self
    }

    /// Inject the batch-service binding. Required to run on batch.
    pub fn batch_api(mut self, api: Arc<dyn BatchApi>) -> Self {
        self.batch_api = Some(api);
        self
    }

    /// Externally-registered driver, overriding platform dispatch entirely.
    pub fn driver(mut self, driver: Arc<dyn PlatformDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn build(self) -> Result<ComponentRunner, ComponentError> {
        let settings = self.spec.settings.clone();
        let driver: Arc<dyn PlatformDriver> = match self.driver {
            Some(driver) => driver,
            None => match &settings.config {
                PlatformConfig::Local => {
                    let native =
                        self.spec
                            .native
                            .clone()
                            .ok_or_else(|| ComponentError::Configuration {
                                component: self.spec.name.clone(),
                                source: PlatformError::Configuration {
                                    platform: Platform::Local,
                                    message: "local component has no native function".to_string(),
                                },
                            })?;
                    Arc::new(LocalDriver::new(native, settings.timeout))
                }
                PlatformConfig::Docker(config) => {
                    Arc::new(DockerDriver::new(config.clone(), settings.timeout))
                }
                PlatformConfig::Kubernetes(config) => Arc::new(KubernetesDriver::new(
                    config.clone(),
                    self.cluster_api
                        .clone()
                        .unwrap_or_else(|| Arc::new(KubectlCluster)),
                    settings.timeout,
                    settings.max_retries,
                )),
                PlatformConfig::Lambda(config) => {
                    let api = self
                        .faas_api
                        .clone()
                        .ok_or_else(|| ComponentError::Configuration {
                            component: self.spec.name.clone(),
                            source: PlatformError::Configuration {
                                platform: Platform::Lambda,
                                message: "no FaaS binding injected".to_string(),
                            },
                        })?;
                    Arc::new(LambdaDriver::new(config.clone(), api))
                }
                PlatformConfig::Batch(config) => {
                    let api = self
                        .batch_api
                        .clone()
                        .ok_or_else(|| ComponentError::Configuration {
                            component: self.spec.name.clone(),
                            source: PlatformError::Configuration {
                                platform: Platform::Batch,
                                message: "no batch binding injected".to_string(),
                            },
                        })?;
                    Arc::new(BatchDriver::new(config.clone(), api, settings.timeout))
                }
                PlatformConfig::Slurm(config) => {
                    Arc::new(SlurmDriver::new(config.clone(), settings.timeout))
                }
                PlatformConfig::Ssh(config) => {
                    Arc::new(SshDriver::new(config.clone(), settings.timeout))
                }
            },
        };

        Ok(ComponentRunner {
            spec: self.spec,
            driver,
            recorder: self.recorder,
            metrics: self
                .metrics
                .unwrap_or_else(crate::observability::global_metrics),
            additional_attributes: self.additional_attributes,
            vcs: self.vcs,
            cancel: self.cancel,
            retry_delay: self.retry_delay,
            graph_retry: self.graph_retry,
        })
    }
}
