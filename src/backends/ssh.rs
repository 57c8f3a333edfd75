//! Remote shell backend driven through `ssh`/`scp`.

use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

use crate::backends::script::{extract_json_line, python_script};
use crate::config::SshConfig;
use crate::errors::PlatformError;
use crate::observability::messages::{platform::CleanupFailed, StructuredLog};
use crate::traits::{
    EncodedInputs, FunctionDescriptor, InvocationContext, Platform, PlatformDriver, RawOutput,
};

/// Opens an authenticated shell to the configured host, uploads the
/// materialized script over the file-transfer channel, runs it with the
/// configured interpreter, and optionally removes it afterwards.
///
/// Key-file authentication is preferred; when no key file is configured the
/// ambient agent is the fallback.
pub struct SshDriver {
    config: SshConfig,
    timeout: Option<Duration>,
}

impl SshDriver {
    pub fn new(config: SshConfig, timeout: Option<Duration>) -> Self {
        Self { config, timeout }
    }

    fn destination(&self) -> String {
        format!(
            "{}@{}",
            self.config.username.clone().unwrap_or_default(),
            self.config.hostname.clone().unwrap_or_default()
        )
    }

    /// Options shared by every `ssh` invocation.
    fn ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.config.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout),
        ];
        if let Some(key_file) = &self.config.key_file {
            args.push("-i".to_string());
            args.push(key_file.clone());
        }
        args
    }

    fn scp_args(&self, local: &str, remote: &str) -> Vec<String> {
        let mut args = vec![
            "-P".to_string(),
            self.config.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout),
        ];
        if let Some(key_file) = &self.config.key_file {
            args.push("-i".to_string());
            args.push(key_file.clone());
        }
        args.push(local.to_string());
        args.push(format!("{}:{}", self.destination(), remote));
        args
    }

    async fn run_remote(&self, command: &str) -> Result<std::process::Output, PlatformError> {
        let mut args = self.ssh_args();
        args.push(self.destination());
        args.push(command.to_string());

        let run = Command::new("ssh").args(&args).output();
        let output = match self.timeout {
            Some(deadline) => {
                tokio::time::timeout(deadline, run)
                    .await
                    .map_err(|_| PlatformError::Timeout {
                        operation: format!("ssh to {}", self.destination()),
                        seconds: deadline.as_secs_f64(),
                    })?
            }
            None => run.await,
        }
        .map_err(|e| PlatformError::Network {
            message: format!("failed to invoke ssh: {}", e),
        })?;
        Ok(output)
    }

    async fn upload(&self, local: &str, remote: &str) -> Result<(), PlatformError> {
        let output = Command::new("scp")
            .args(self.scp_args(local, remote))
            .output()
            .await
            .map_err(|e| PlatformError::Network {
                message: format!("failed to invoke scp: {}", e),
            })?;

        if !output.status.success() {
            return Err(PlatformError::Network {
                message: format!(
                    "upload to {} failed: {}",
                    self.destination(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformDriver for SshDriver {
    async fn execute(
        &self,
        descriptor: &FunctionDescriptor,
        inputs: &EncodedInputs,
        context: &InvocationContext,
    ) -> Result<RawOutput, PlatformError> {
        self.validate()?;

        let script = python_script(descriptor, inputs);
        let mut file = tempfile::Builder::new()
            .suffix(".py")
            .tempfile()
            .map_err(|e| PlatformError::Resource {
                message: format!("failed to materialize script: {}", e),
            })?;
        file.write_all(script.as_bytes())
            .map_err(|e| PlatformError::Resource {
                message: format!("failed to write script: {}", e),
            })?;

        let workdir = &self.config.remote_workdir;
        let remote_path = format!(
            "{}/dagline_{}.py",
            workdir,
            Uuid::new_v4().simple()
        );

        // Working directory first, then the script over the transfer channel
        let mkdir = self.run_remote(&format!("mkdir -p {}", workdir)).await?;
        if !mkdir.status.success() {
            return Err(PlatformError::Execution {
                platform: Platform::Ssh,
                message: format!(
                    "could not create remote workdir {}: {}",
                    workdir,
                    String::from_utf8_lossy(&mkdir.stderr).trim()
                ),
                retryable: false,
            });
        }

        self.upload(&file.path().to_string_lossy(), &remote_path)
            .await?;

        let run = self
            .run_remote(&format!(
                "EXECUTION_ID={} COMPONENT_NAME={} {} {}",
                context.execution_id,
                context.component_name,
                self.config.python_path,
                remote_path
            ))
            .await;

        if self.config.cleanup_remote {
            if let Err(e) = self.run_remote(&format!("rm -f {}", remote_path)).await {
                CleanupFailed {
                    platform: "ssh",
                    artifact: &remote_path,
                    error: &e.to_string(),
                }
                .log();
            }
        }

        let output = run?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(PlatformError::Execution {
                platform: Platform::Ssh,
                message: format!("remote execution failed: {}", stderr.trim()),
                retryable: false,
            });
        }

        let result = extract_json_line(&stdout).map_err(|message| PlatformError::Execution {
            platform: Platform::Ssh,
            message,
            retryable: false,
        })?;
        Ok(RawOutput::Json(result))
    }

    fn platform(&self) -> Platform {
        Platform::Ssh
    }

    fn validate(&self) -> Result<(), PlatformError> {
        let mut missing = Vec::new();
        if self.config.hostname.is_none() {
            missing.push("hostname");
        }
        if self.config.username.is_none() {
            missing.push("username");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PlatformError::Configuration {
                platform: Platform::Ssh,
                message: format!("missing required keys: {}", missing.join(", ")),
            })
        }
    }
}
