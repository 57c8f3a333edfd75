//! Container runtime backend driven through the Docker CLI.

use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tokio::process::Command;

use crate::backends::script::{extract_json_line, python_script};
use crate::config::DockerConfig;
use crate::errors::PlatformError;
use crate::traits::{
    EncodedInputs, FunctionDescriptor, InvocationContext, Platform, PlatformDriver, RawOutput,
};

const CONTAINER_SCRIPT_PATH: &str = "/tmp/script.py";

/// Runs the materialized script inside a container image.
///
/// The script is mounted read-only, the container is removed on exit, and
/// stdout is captured for the result line. A non-zero exit code raises with
/// the container's stderr.
pub struct DockerDriver {
    config: DockerConfig,
    timeout: Option<Duration>,
}

impl DockerDriver {
    pub fn new(config: DockerConfig, timeout: Option<Duration>) -> Self {
        Self { config, timeout }
    }

    /// Effective deadline: the platform config's own `timeout` key wins over
    /// the component-level setting.
    fn deadline(&self) -> Option<Duration> {
        self.config
            .timeout
            .map(Duration::from_secs)
            .or(self.timeout)
    }

    fn run_args(&self, script_path: &str, context: &InvocationContext) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:{}:ro", script_path, CONTAINER_SCRIPT_PATH),
            "-e".to_string(),
            format!("EXECUTION_ID={}", context.execution_id),
            "-e".to_string(),
            format!("COMPONENT_NAME={}", context.component_name),
        ];

        for (key, value) in &self.config.environment {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        if let Some(memory) = &self.config.memory {
            args.push("--memory".to_string());
            args.push(memory.clone());
        }
        if let Some(cpu) = self.config.cpu {
            args.push("--cpus".to_string());
            args.push(cpu.to_string());
        }
        if let Some(gpu) = &self.config.gpu {
            args.push("--gpus".to_string());
            args.push(gpu.clone());
        }

        args.push(self.config.image.clone().unwrap_or_default());
        args.push("python".to_string());
        args.push(CONTAINER_SCRIPT_PATH.to_string());
        args
    }
}

#[async_trait]
impl PlatformDriver for DockerDriver {
    async fn execute(
        &self,
        descriptor: &FunctionDescriptor,
        inputs: &EncodedInputs,
        context: &InvocationContext,
    ) -> Result<RawOutput, PlatformError> {
        self.validate()?;

        let script = python_script(descriptor, inputs);
        let mut file = tempfile::NamedTempFile::new().map_err(|e| PlatformError::Resource {
            message: format!("failed to materialize script: {}", e),
        })?;
        file.write_all(script.as_bytes())
            .map_err(|e| PlatformError::Resource {
                message: format!("failed to write script: {}", e),
            })?;

        let script_path = file.path().to_string_lossy().to_string();
        let args = self.run_args(&script_path, context);

        let run = Command::new("docker").args(&args).output();
        let output = match self.deadline() {
            Some(deadline) => tokio::time::timeout(deadline, run).await.map_err(|_| {
                PlatformError::Timeout {
                    operation: format!("docker run for '{}'", descriptor.name),
                    seconds: deadline.as_secs_f64(),
                }
            })?,
            None => run.await,
        }
        .map_err(|e| PlatformError::Network {
            message: format!("failed to invoke docker: {}", e),
        })?;

        // The temp file drops (and unlinks) here regardless of outcome
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            // Daemon unavailability is transient; in-container failures are not
            let retryable = stderr.contains("Cannot connect to the Docker daemon");
            if retryable {
                return Err(PlatformError::Network { message: stderr });
            }
            return Err(PlatformError::Execution {
                platform: Platform::Docker,
                message: container_error(&stderr, output.status.code()),
                retryable: false,
            });
        }

        let result = extract_json_line(&stdout).map_err(|message| PlatformError::Execution {
            platform: Platform::Docker,
            message,
            retryable: false,
        })?;
        Ok(RawOutput::Json(result))
    }

    fn platform(&self) -> Platform {
        Platform::Docker
    }

    fn validate(&self) -> Result<(), PlatformError> {
        if self.config.image.is_none() {
            return Err(PlatformError::Configuration {
                platform: Platform::Docker,
                message: "missing required keys: image".to_string(),
            });
        }
        Ok(())
    }
}

/// Prefer the script's own JSON error line over raw stderr when present.
fn container_error(stderr: &str, exit_code: Option<i32>) -> String {
    if let Ok(parsed) = extract_json_line(stderr) {
        if let Some(message) = parsed.get("error").and_then(|e| e.as_str()) {
            return message.to_string();
        }
    }
    format!(
        "container exited with code {}: {}",
        exit_code.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
        stderr.trim()
    )
}
