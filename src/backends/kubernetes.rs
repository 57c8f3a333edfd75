//! Cluster job backend: one Kubernetes Job per invocation.
//!
//! The cluster itself sits behind the [`ClusterApi`] contract; the engine
//! only decides what to create, when to poll, and what to clean up. The
//! bundled [`KubectlCluster`] binding shells out to `kubectl`, and test
//! suites inject mock implementations.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::backends::script::{extract_json_line, python_script};
use crate::config::KubernetesConfig;
use crate::errors::PlatformError;
use crate::observability::messages::{platform::CleanupFailed, StructuredLog};
use crate::traits::{
    EncodedInputs, FunctionDescriptor, InvocationContext, Platform, PlatformDriver, RawOutput,
};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// Observed state of a submitted Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Active,
    Succeeded,
    Failed,
}

/// The slice of the cluster's API this engine depends on. Everything else
/// about the cluster client is out of scope.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn create_config_map(
        &self,
        namespace: &str,
        name: &str,
        script: &str,
    ) -> Result<(), PlatformError>;

    async fn create_job(
        &self,
        namespace: &str,
        manifest: &serde_json::Value,
    ) -> Result<(), PlatformError>;

    async fn job_phase(&self, namespace: &str, name: &str) -> Result<JobPhase, PlatformError>;

    /// Logs of the first pod matching the job label.
    async fn pod_logs(&self, namespace: &str, job_name: &str) -> Result<String, PlatformError>;

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), PlatformError>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), PlatformError>;
}

/// Creates a config map holding the script, submits a Job that runs it,
/// polls until a terminal phase, reads the pod logs, and always cleans up.
pub struct KubernetesDriver {
    config: KubernetesConfig,
    api: Arc<dyn ClusterApi>,
    timeout: Option<Duration>,
    max_retries: u32,
}

impl KubernetesDriver {
    pub fn new(
        config: KubernetesConfig,
        api: Arc<dyn ClusterApi>,
        timeout: Option<Duration>,
        max_retries: u32,
    ) -> Self {
        Self {
            config,
            api,
            timeout,
            max_retries,
        }
    }

    fn deadline(&self) -> Duration {
        self.config
            .active_deadline_seconds
            .map(Duration::from_secs)
            .or(self.timeout)
            .unwrap_or(DEFAULT_DEADLINE)
    }

    /// The Job manifest submitted for one invocation.
    fn job_manifest(&self, job_name: &str, context: &InvocationContext) -> serde_json::Value {
        let mut env = vec![
            json!({"name": "EXECUTION_ID", "value": context.execution_id}),
            json!({"name": "COMPONENT_NAME", "value": context.component_name}),
        ];
        for (key, value) in &self.config.environment {
            env.push(json!({"name": key, "value": value}));
        }

        let backoff_limit = self
            .config
            .retry_backoff_limit
            .unwrap_or(self.max_retries);

        json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {"name": job_name},
            "spec": {
                "backoffLimit": backoff_limit,
                "activeDeadlineSeconds": self.deadline().as_secs(),
                "template": {
                    "spec": {
                        "restartPolicy": "Never",
                        "containers": [{
                            "name": "executor",
                            "image": self.config.image.clone().unwrap_or_default(),
                            "command": ["python", "/scripts/script.py"],
                            "env": env,
                            "resources": {
                                "requests": self.config.resources.requests,
                                "limits": self.config.resources.limits,
                            },
                            "volumeMounts": [{"name": "script", "mountPath": "/scripts"}],
                        }],
                        "volumes": [{
                            "name": "script",
                            "configMap": {"name": format!("{}-script", job_name)},
                        }],
                    }
                }
            }
        })
    }

    async fn await_completion(
        &self,
        namespace: &str,
        job_name: &str,
    ) -> Result<String, PlatformError> {
        let deadline = self.deadline();
        let started = tokio::time::Instant::now();

        loop {
            match self.api.job_phase(namespace, job_name).await? {
                JobPhase::Succeeded => return self.api.pod_logs(namespace, job_name).await,
                JobPhase::Failed => {
                    return Err(PlatformError::Execution {
                        platform: Platform::Kubernetes,
                        message: format!("job {} failed", job_name),
                        retryable: false,
                    })
                }
                JobPhase::Active => {}
            }

            if started.elapsed() >= deadline {
                return Err(PlatformError::Timeout {
                    operation: format!("kubernetes job {}", job_name),
                    seconds: deadline.as_secs_f64(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn cleanup(&self, namespace: &str, job_name: &str) {
        if let Err(e) = self.api.delete_job(namespace, job_name).await {
            CleanupFailed {
                platform: "kubernetes",
                artifact: job_name,
                error: &e.to_string(),
            }
            .log();
        }
        let config_map = format!("{}-script", job_name);
        if let Err(e) = self.api.delete_config_map(namespace, &config_map).await {
            CleanupFailed {
                platform: "kubernetes",
                artifact: &config_map,
                error: &e.to_string(),
            }
            .log();
        }
    }
}

#[async_trait]
impl PlatformDriver for KubernetesDriver {
    async fn execute(
        &self,
        descriptor: &FunctionDescriptor,
        inputs: &EncodedInputs,
        context: &InvocationContext,
    ) -> Result<RawOutput, PlatformError> {
        self.validate()?;

        let namespace = self.config.namespace.clone();
        let job_name = format!("dagline-{}", context.execution_id);
        let script = python_script(descriptor, inputs);

        self.api
            .create_config_map(&namespace, &format!("{}-script", job_name), &script)
            .await?;

        let submit = async {
            self.api
                .create_job(&namespace, &self.job_manifest(&job_name, context))
                .await?;
            self.await_completion(&namespace, &job_name).await
        };
        let outcome = submit.await;

        // Job and config map go away on every exit path
        self.cleanup(&namespace, &job_name).await;

        let logs = outcome?;
        let result = extract_json_line(&logs).map_err(|message| PlatformError::Execution {
            platform: Platform::Kubernetes,
            message,
            retryable: false,
        })?;
        Ok(RawOutput::Json(result))
    }

    fn platform(&self) -> Platform {
        Platform::Kubernetes
    }

    fn validate(&self) -> Result<(), PlatformError> {
        if self.config.image.is_none() {
            return Err(PlatformError::Configuration {
                platform: Platform::Kubernetes,
                message: "missing required keys: image".to_string(),
            });
        }
        Ok(())
    }
}

/// `kubectl`-backed [`ClusterApi`] binding.
pub struct KubectlCluster;

impl KubectlCluster {
    async fn run(args: &[&str], stdin: Option<&str>) -> Result<String, PlatformError> {
        let mut command = Command::new("kubectl");
        command.args(args);

        let output = if let Some(input) = stdin {
            use std::process::Stdio;
            use tokio::io::AsyncWriteExt;

            command.stdin(Stdio::piped());
            command.stdout(Stdio::piped());
            command.stderr(Stdio::piped());
            let mut child = command.spawn().map_err(|e| PlatformError::Network {
                message: format!("failed to invoke kubectl: {}", e),
            })?;
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes())
                    .await
                    .map_err(|e| PlatformError::Network {
                        message: format!("failed to stream manifest: {}", e),
                    })?;
            }
            child
                .wait_with_output()
                .await
                .map_err(|e| PlatformError::Network {
                    message: format!("kubectl did not complete: {}", e),
                })?
        } else {
            command.output().await.map_err(|e| PlatformError::Network {
                message: format!("failed to invoke kubectl: {}", e),
            })?
        };

        if !output.status.success() {
            return Err(PlatformError::Execution {
                platform: Platform::Kubernetes,
                message: String::from_utf8_lossy(&output.stderr).to_string(),
                retryable: false,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ClusterApi for KubectlCluster {
    async fn create_config_map(
        &self,
        namespace: &str,
        name: &str,
        script: &str,
    ) -> Result<(), PlatformError> {
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": namespace},
            "data": {"script.py": script},
        });
        Self::run(
            &["apply", "-n", namespace, "-f", "-"],
            Some(&manifest.to_string()),
        )
        .await
        .map(|_| ())
    }

    async fn create_job(
        &self,
        namespace: &str,
        manifest: &serde_json::Value,
    ) -> Result<(), PlatformError> {
        Self::run(
            &["apply", "-n", namespace, "-f", "-"],
            Some(&manifest.to_string()),
        )
        .await
        .map(|_| ())
    }

    async fn job_phase(&self, namespace: &str, name: &str) -> Result<JobPhase, PlatformError> {
        let status = Self::run(
            &[
                "get",
                "job",
                name,
                "-n",
                namespace,
                "-o",
                "jsonpath={.status.succeeded},{.status.failed}",
            ],
            None,
        )
        .await?;

        let mut parts = status.trim().split(',');
        let succeeded = parts.next().unwrap_or("").parse::<u32>().unwrap_or(0);
        let failed = parts.next().unwrap_or("").parse::<u32>().unwrap_or(0);
        if succeeded > 0 {
            Ok(JobPhase::Succeeded)
        } else if failed > 0 {
            Ok(JobPhase::Failed)
        } else {
            Ok(JobPhase::Active)
        }
    }

    async fn pod_logs(&self, namespace: &str, job_name: &str) -> Result<String, PlatformError> {
        Self::run(
            &[
                "logs",
                "-n",
                namespace,
                "-l",
                &format!("job-name={}", job_name),
                "--tail=-1",
            ],
            None,
        )
        .await
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), PlatformError> {
        Self::run(
            &["delete", "job", name, "-n", namespace, "--ignore-not-found"],
            None,
        )
        .await
        .map(|_| ())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), PlatformError> {
        Self::run(
            &[
                "delete",
                "configmap",
                name,
                "-n",
                namespace,
                "--ignore-not-found",
            ],
            None,
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Scripted cluster: succeeds after a configurable number of polls and
    /// records every call for cleanup assertions.
    struct MockCluster {
        polls_until_done: Mutex<u32>,
        terminal: JobPhase,
        logs: String,
        calls: Mutex<Vec<String>>,
    }

    impl MockCluster {
        fn new(terminal: JobPhase, logs: &str) -> Self {
            Self {
                polls_until_done: Mutex::new(1),
                terminal,
                logs: logs.to_string(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClusterApi for MockCluster {
        async fn create_config_map(
            &self,
            _namespace: &str,
            name: &str,
            script: &str,
        ) -> Result<(), PlatformError> {
            assert!(script.contains("input_data"));
            self.record(&format!("create_config_map:{}", name));
            Ok(())
        }

        async fn create_job(
            &self,
            _namespace: &str,
            manifest: &serde_json::Value,
        ) -> Result<(), PlatformError> {
            self.record(&format!(
                "create_job:{}",
                manifest["metadata"]["name"].as_str().unwrap()
            ));
            Ok(())
        }

        async fn job_phase(&self, _namespace: &str, _name: &str) -> Result<JobPhase, PlatformError> {
            let mut remaining = self.polls_until_done.lock().unwrap();
            if *remaining == 0 {
                Ok(self.terminal)
            } else {
                *remaining -= 1;
                Ok(JobPhase::Active)
            }
        }

        async fn pod_logs(
            &self,
            _namespace: &str,
            _job_name: &str,
        ) -> Result<String, PlatformError> {
            Ok(self.logs.clone())
        }

        async fn delete_job(&self, _namespace: &str, name: &str) -> Result<(), PlatformError> {
            self.record(&format!("delete_job:{}", name));
            Ok(())
        }

        async fn delete_config_map(
            &self,
            _namespace: &str,
            name: &str,
        ) -> Result<(), PlatformError> {
            self.record(&format!("delete_config_map:{}", name));
            Ok(())
        }
    }

    fn descriptor() -> FunctionDescriptor {
        FunctionDescriptor {
            name: "add".to_string(),
            source_listing: "def add(a, b):\n    return {'sum': a + b}".to_string(),
            parameter_order: vec!["a".to_string(), "b".to_string()],
        }
    }

    fn context() -> InvocationContext {
        InvocationContext {
            execution_id: "abc123".to_string(),
            component_name: "add".to_string(),
            start_time: chrono::Utc::now(),
            parent_ids: vec![],
        }
    }

    fn config() -> KubernetesConfig {
        KubernetesConfig {
            image: Some("python:3.11".to_string()),
            ..KubernetesConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_job_returns_log_json_and_cleans_up() {
        let api = Arc::new(MockCluster::new(JobPhase::Succeeded, "{\"sum\": 5}\n"));
        let driver = KubernetesDriver::new(config(), api.clone(), None, 3);

        let output = driver
            .execute(&descriptor(), &EncodedInputs::default(), &context())
            .await
            .unwrap();
        match output {
            RawOutput::Json(v) => assert_eq!(v, json!({"sum": 5})),
            other => panic!("unexpected output: {:?}", other),
        }

        let calls = api.calls();
        assert!(calls.contains(&"create_config_map:dagline-abc123-script".to_string()));
        assert!(calls.contains(&"create_job:dagline-abc123".to_string()));
        assert!(calls.contains(&"delete_job:dagline-abc123".to_string()));
        assert!(calls.contains(&"delete_config_map:dagline-abc123-script".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_raises_and_still_cleans_up() {
        let api = Arc::new(MockCluster::new(JobPhase::Failed, ""));
        let driver = KubernetesDriver::new(config(), api.clone(), None, 3);

        let error = driver
            .execute(&descriptor(), &EncodedInputs::default(), &context())
            .await
            .unwrap_err();
        assert!(error.to_string().contains("dagline-abc123"));
        assert!(api.calls().contains(&"delete_job:dagline-abc123".to_string()));
    }

    #[test]
    fn manifest_carries_resources_env_and_limits() {
        let mut config = config();
        config
            .resources
            .requests
            .insert("cpu".to_string(), "100m".to_string());
        config
            .resources
            .limits
            .insert("memory".to_string(), "1Gi".to_string());
        config
            .environment
            .insert("STAGE".to_string(), "test".to_string());
        config.retry_backoff_limit = Some(2);
        config.active_deadline_seconds = Some(120);

        let driver = KubernetesDriver::new(config, Arc::new(MockCluster::new(JobPhase::Succeeded, "")), None, 3);
        let manifest = driver.job_manifest("dagline-xyz", &context());

        assert_eq!(manifest["spec"]["backoffLimit"], 2);
        assert_eq!(manifest["spec"]["activeDeadlineSeconds"], 120);
        let container = &manifest["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["command"][0], "python");
        assert_eq!(container["resources"]["requests"]["cpu"], "100m");
        assert_eq!(container["resources"]["limits"]["memory"], "1Gi");
        let env = container["env"].as_array().unwrap();
        assert!(env.iter().any(|e| e["name"] == "EXECUTION_ID"));
        assert!(env.iter().any(|e| e["name"] == "STAGE"));
    }

    #[test]
    fn missing_image_fails_validation() {
        let driver = KubernetesDriver::new(
            KubernetesConfig::default(),
            Arc::new(MockCluster::new(JobPhase::Succeeded, "")),
            None,
            3,
        );
        assert!(driver.validate().is_err());
    }
}
