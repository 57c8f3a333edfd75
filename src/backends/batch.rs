//! Managed batch-job backend behind the [`BatchApi`] contract.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backends::script::{extract_json_line, python_script};
use crate::config::BatchConfig;
use crate::errors::PlatformError;
use crate::observability::messages::{
    platform::{ComponentRegistered, JobSubmitted},
    StructuredLog,
};
use crate::traits::{
    EncodedInputs, FunctionDescriptor, InvocationContext, Platform, PlatformDriver, RawOutput,
};

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_DEADLINE: Duration = Duration::from_secs(3600);

/// A submitted job and the log stream its stdout lands in.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub job_id: String,
    pub log_stream: String,
}

/// Terminal and intermediate job states as the service reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchJobState {
    Submitted,
    Running,
    Succeeded,
    Failed { reason: String },
}

/// The slice of the batch service this engine depends on.
#[async_trait]
pub trait BatchApi: Send + Sync {
    async fn register_job_definition(
        &self,
        definition_name: &str,
        config: &BatchConfig,
    ) -> Result<(), PlatformError>;

    async fn submit_job(
        &self,
        job_name: &str,
        config: &BatchConfig,
        command: &[String],
    ) -> Result<JobSubmission, PlatformError>;

    async fn describe_job(&self, job_id: &str) -> Result<BatchJobState, PlatformError>;

    /// Stdout of a finished job, read from its log stream.
    async fn fetch_log(&self, log_group: &str, log_stream: &str)
        -> Result<String, PlatformError>;
}

/// Submits one job per invocation, optionally waits for the terminal state,
/// and reads the result from the job's log stream.
pub struct BatchDriver {
    config: BatchConfig,
    api: Arc<dyn BatchApi>,
    timeout: Option<Duration>,
    registered: Mutex<HashSet<String>>,
}

impl BatchDriver {
    pub fn new(config: BatchConfig, api: Arc<dyn BatchApi>, timeout: Option<Duration>) -> Self {
        Self {
            config,
            api,
            timeout,
            registered: Mutex::new(HashSet::new()),
        }
    }

    fn deadline(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_DEADLINE)
    }

    /// One job definition per component, registered on first use.
    async fn ensure_registered(&self, component: &str) -> Result<(), PlatformError> {
        let definition = format!("job-{}", component);
        {
            let registered = self.registered.lock().unwrap();
            if registered.contains(&definition) {
                return Ok(());
            }
        }

        self.api
            .register_job_definition(&definition, &self.config)
            .await?;
        ComponentRegistered {
            platform: "batch",
            component,
        }
        .log();

        self.registered.lock().unwrap().insert(definition);
        Ok(())
    }

    async fn await_terminal(&self, job_id: &str) -> Result<(), PlatformError> {
        let deadline = self.deadline();
        let started = tokio::time::Instant::now();

        loop {
            match self.api.describe_job(job_id).await? {
                BatchJobState::Succeeded => return Ok(()),
                BatchJobState::Failed { reason } => {
                    return Err(PlatformError::Execution {
                        platform: Platform::Batch,
                        message: format!("job {} failed: {}", job_id, reason),
                        retryable: false,
                    })
                }
                BatchJobState::Submitted | BatchJobState::Running => {}
            }

            if started.elapsed() >= deadline {
                return Err(PlatformError::Timeout {
                    operation: format!("batch job {}", job_id),
                    seconds: deadline.as_secs_f64(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PlatformDriver for BatchDriver {
    async fn execute(
        &self,
        descriptor: &FunctionDescriptor,
        inputs: &EncodedInputs,
        context: &InvocationContext,
    ) -> Result<RawOutput, PlatformError> {
        self.validate()?;
        self.ensure_registered(&descriptor.name).await?;

        let script = python_script(descriptor, inputs);
        let command = vec![
            "python".to_string(),
            "-c".to_string(),
            script,
        ];

        let job_name = format!("job-{}", context.execution_id);
        let submission = self
            .api
            .submit_job(&job_name, &self.config, &command)
            .await?;
        JobSubmitted {
            platform: "batch",
            job_id: &submission.job_id,
            execution_id: &context.execution_id,
        }
        .log();

        // Fire-and-forget mode hands back the submission reference
        if !self.config.wait {
            return Ok(RawOutput::Json(serde_json::json!({
                "job_id": submission.job_id,
                "status": "submitted",
            })));
        }

        self.await_terminal(&submission.job_id).await?;

        let log_group = self.config.log_group.clone().unwrap_or_default();
        let output = self
            .api
            .fetch_log(&log_group, &submission.log_stream)
            .await?;
        let result = extract_json_line(&output).map_err(|message| PlatformError::Execution {
            platform: Platform::Batch,
            message,
            retryable: false,
        })?;
        Ok(RawOutput::Json(result))
    }

    fn platform(&self) -> Platform {
        Platform::Batch
    }

    fn validate(&self) -> Result<(), PlatformError> {
        let mut missing = Vec::new();
        if self.config.job_queue.is_none() {
            missing.push("job_queue");
        }
        if self.config.job_definition.is_none() {
            missing.push("job_definition");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PlatformError::Configuration {
                platform: Platform::Batch,
                message: format!("missing required keys: {}", missing.join(", ")),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockBatch {
        registrations: AtomicU32,
        polls_until_done: AtomicU32,
        terminal: BatchJobState,
        log: String,
    }

    impl MockBatch {
        fn new(terminal: BatchJobState, log: &str) -> Self {
            Self {
                registrations: AtomicU32::new(0),
                polls_until_done: AtomicU32::new(2),
                terminal,
                log: log.to_string(),
            }
        }
    }

    #[async_trait]
    impl BatchApi for MockBatch {
        async fn register_job_definition(
            &self,
            definition_name: &str,
            _config: &BatchConfig,
        ) -> Result<(), PlatformError> {
            assert!(definition_name.starts_with("job-"));
            self.registrations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn submit_job(
            &self,
            job_name: &str,
            _config: &BatchConfig,
            command: &[String],
        ) -> Result<JobSubmission, PlatformError> {
            assert_eq!(command[0], "python");
            assert!(command[2].contains("input_data"));
            Ok(JobSubmission {
                job_id: format!("{}-id", job_name),
                log_stream: format!("{}-stream", job_name),
            })
        }

        async fn describe_job(&self, _job_id: &str) -> Result<BatchJobState, PlatformError> {
            let remaining = self.polls_until_done.load(Ordering::SeqCst);
            if remaining == 0 {
                Ok(self.terminal.clone())
            } else {
                self.polls_until_done.fetch_sub(1, Ordering::SeqCst);
                Ok(BatchJobState::Running)
            }
        }

        async fn fetch_log(
            &self,
            _log_group: &str,
            _log_stream: &str,
        ) -> Result<String, PlatformError> {
            Ok(self.log.clone())
        }
    }

    fn config() -> BatchConfig {
        BatchConfig {
            job_queue: Some("main".to_string()),
            job_definition: Some("base".to_string()),
            log_group: Some("/dagline/batch".to_string()),
            ..BatchConfig::default()
        }
    }

    fn descriptor() -> FunctionDescriptor {
        FunctionDescriptor {
            name: "transform".to_string(),
            source_listing: "def transform(x):\n    return {'y': x}".to_string(),
            parameter_order: vec!["x".to_string()],
        }
    }

    fn context() -> InvocationContext {
        InvocationContext {
            execution_id: "abc".to_string(),
            component_name: "transform".to_string(),
            start_time: chrono::Utc::now(),
            parent_ids: vec![],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_success_and_reads_log_output() {
        let api = Arc::new(MockBatch::new(BatchJobState::Succeeded, "{\"y\": 4}\n"));
        let driver = BatchDriver::new(config(), api.clone(), None);

        let output = driver
            .execute(&descriptor(), &EncodedInputs::default(), &context())
            .await
            .unwrap();
        match output {
            RawOutput::Json(v) => assert_eq!(v, json!({"y": 4})),
            other => panic!("unexpected output: {:?}", other),
        }
        assert_eq!(api.registrations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_carries_the_status_reason() {
        let api = Arc::new(MockBatch::new(
            BatchJobState::Failed {
                reason: "host terminated".to_string(),
            },
            "",
        ));
        let driver = BatchDriver::new(config(), api, None);

        let error = driver
            .execute(&descriptor(), &EncodedInputs::default(), &context())
            .await
            .unwrap_err();
        assert!(error.to_string().contains("host terminated"));
    }

    #[tokio::test]
    async fn no_wait_returns_submission_reference() {
        let api = Arc::new(MockBatch::new(BatchJobState::Succeeded, ""));
        let mut config = config();
        config.wait = false;
        let driver = BatchDriver::new(config, api, None);

        let output = driver
            .execute(&descriptor(), &EncodedInputs::default(), &context())
            .await
            .unwrap();
        match output {
            RawOutput::Json(v) => {
                assert_eq!(v["status"], "submitted");
                assert_eq!(v["job_id"], "job-abc-id");
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_queue_is_a_configuration_error() {
        let driver = BatchDriver::new(
            BatchConfig::default(),
            Arc::new(MockBatch::new(BatchJobState::Succeeded, "")),
            None,
        );
        let error = driver
            .execute(&descriptor(), &EncodedInputs::default(), &context())
            .await
            .unwrap_err();
        assert!(matches!(error, PlatformError::Configuration { .. }));
    }
}
