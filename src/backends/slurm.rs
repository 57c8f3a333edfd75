//! HPC batch backend driven through `sbatch`/`squeue`.

use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tokio::process::Command;

use crate::backends::script::{extract_json_line, python_script};
use crate::config::SlurmConfig;
use crate::errors::PlatformError;
use crate::observability::messages::{platform::JobSubmitted, StructuredLog};
use crate::traits::{
    EncodedInputs, FunctionDescriptor, InvocationContext, Platform, PlatformDriver, RawOutput,
};

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_DEADLINE: Duration = Duration::from_secs(3600);

/// Writes a batch script with the scheduler preamble, submits it, polls the
/// queue until the job leaves it, and reads the configured output file.
pub struct SlurmDriver {
    config: SlurmConfig,
    timeout: Option<Duration>,
}

impl SlurmDriver {
    pub fn new(config: SlurmConfig, timeout: Option<Duration>) -> Self {
        Self { config, timeout }
    }

    fn deadline(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_DEADLINE)
    }

    /// The `#SBATCH` preamble plus a heredoc running the Python script.
    fn batch_script(
        &self,
        descriptor: &FunctionDescriptor,
        inputs: &EncodedInputs,
        context: &InvocationContext,
    ) -> String {
        let mut directives = vec![
            format!("#SBATCH --job-name=dagline-{}", context.execution_id),
            format!("#SBATCH --nodes={}", self.config.nodes),
            format!("#SBATCH --ntasks={}", self.config.ntasks),
            format!("#SBATCH --cpus-per-task={}", self.config.cpus_per_task),
            format!("#SBATCH --time={}", self.config.time_limit),
            format!("#SBATCH --mem={}", self.config.memory),
            format!("#SBATCH --output={}", self.config.output_file),
            format!("#SBATCH --error={}", self.config.error_file),
        ];
        if let Some(partition) = &self.config.partition {
            directives.push(format!("#SBATCH --partition={}", partition));
        }
        if let Some(account) = &self.config.account {
            directives.push(format!("#SBATCH --account={}", account));
        }
        if let Some(qos) = &self.config.qos {
            directives.push(format!("#SBATCH --qos={}", qos));
        }

        format!(
            "#!/bin/bash\n{directives}\n\nexport EXECUTION_ID={execution_id}\nexport COMPONENT_NAME={component}\n\npython3 << 'DAGLINE_EOF'\n{script}DAGLINE_EOF\n",
            directives = directives.join("\n"),
            execution_id = context.execution_id,
            component = context.component_name,
            script = python_script(descriptor, inputs),
        )
    }

    /// Parse the job id out of `Submitted batch job 12345`.
    fn parse_job_id(acknowledgement: &str) -> Result<String, PlatformError> {
        acknowledgement
            .lines()
            .find_map(|line| {
                line.contains("Submitted batch job")
                    .then(|| line.split_whitespace().last())
                    .flatten()
            })
            .map(String::from)
            .ok_or_else(|| PlatformError::Execution {
                platform: Platform::Slurm,
                message: format!(
                    "could not parse job id from sbatch output: {}",
                    acknowledgement.trim()
                ),
                retryable: false,
            })
    }

    async fn submit(&self, script_path: &str) -> Result<String, PlatformError> {
        let output = Command::new("sbatch")
            .arg(script_path)
            .output()
            .await
            .map_err(|e| PlatformError::Network {
                message: format!("failed to invoke sbatch: {}", e),
            })?;

        if !output.status.success() {
            return Err(PlatformError::Execution {
                platform: Platform::Slurm,
                message: format!(
                    "sbatch rejected the job: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                retryable: false,
            });
        }
        Self::parse_job_id(&String::from_utf8_lossy(&output.stdout))
    }

    /// Poll `squeue` until the job leaves the queue or fails outright.
    async fn await_completion(&self, job_id: &str) -> Result<(), PlatformError> {
        let deadline = self.deadline();
        let started = tokio::time::Instant::now();

        loop {
            let output = Command::new("squeue")
                .args(["-j", job_id, "-h", "-o", "%T"])
                .output()
                .await
                .map_err(|e| PlatformError::Network {
                    message: format!("failed to invoke squeue: {}", e),
                })?;

            // Gone from the queue means finished
            if !output.status.success() {
                return Ok(());
            }
            let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
            match state.as_str() {
                "" | "COMPLETED" | "COMPLETING" => return Ok(()),
                "FAILED" | "CANCELLED" | "TIMEOUT" | "OUT_OF_MEMORY" => {
                    return Err(PlatformError::Execution {
                        platform: Platform::Slurm,
                        message: format!("job {} left the queue with state {}", job_id, state),
                        retryable: false,
                    })
                }
                _ => {}
            }

            if started.elapsed() >= deadline {
                return Err(PlatformError::Timeout {
                    operation: format!("slurm job {}", job_id),
                    seconds: deadline.as_secs_f64(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn output_path(&self, job_id: &str) -> String {
        self.config.output_file.replace("%j", job_id)
    }
}

#[async_trait]
impl PlatformDriver for SlurmDriver {
    async fn execute(
        &self,
        descriptor: &FunctionDescriptor,
        inputs: &EncodedInputs,
        context: &InvocationContext,
    ) -> Result<RawOutput, PlatformError> {
        let script = self.batch_script(descriptor, inputs, context);

        let mut file = tempfile::Builder::new()
            .suffix(".sh")
            .tempfile()
            .map_err(|e| PlatformError::Resource {
                message: format!("failed to materialize batch script: {}", e),
            })?;
        file.write_all(script.as_bytes())
            .map_err(|e| PlatformError::Resource {
                message: format!("failed to write batch script: {}", e),
            })?;

        let job_id = self.submit(&file.path().to_string_lossy()).await?;
        JobSubmitted {
            platform: "slurm",
            job_id: &job_id,
            execution_id: &context.execution_id,
        }
        .log();

        self.await_completion(&job_id).await?;

        let output_path = self.output_path(&job_id);
        let stdout =
            tokio::fs::read_to_string(&output_path)
                .await
                .map_err(|e| PlatformError::Execution {
                    platform: Platform::Slurm,
                    message: format!("output file {} not readable: {}", output_path, e),
                    retryable: false,
                })?;

        let result = extract_json_line(&stdout).map_err(|message| PlatformError::Execution {
            platform: Platform::Slurm,
            message,
            retryable: false,
        })?;
        Ok(RawOutput::Json(result))
    }

    fn platform(&self) -> Platform {
        Platform::Slurm
    }
}
