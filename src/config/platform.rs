use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::PlatformError;
use crate::traits::Platform;

/// Everything a component declaration says about how to run it: the target
/// platform's options plus the retry/timeout envelope around each dispatch.
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    /// Per-attempt ceiling enforced by the driver
    pub timeout: Option<Duration>,
    pub auto_retry: bool,
    pub max_retries: u32,
    pub config: PlatformConfig,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            auto_retry: true,
            max_retries: 3,
            config: PlatformConfig::Local,
        }
    }
}

impl PlatformSettings {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn for_config(config: PlatformConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
}

/// Per-platform configuration, one variant per backend. Selecting a platform
/// requires its mandatory keys; `validate` rejects the invocation with a
/// configuration error before any dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum PlatformConfig {
    Local,
    Docker(DockerConfig),
    Kubernetes(KubernetesConfig),
    Lambda(LambdaConfig),
    Batch(BatchConfig),
    Slurm(SlurmConfig),
    Ssh(SshConfig),
}

impl PlatformConfig {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformConfig::Local => Platform::Local,
            PlatformConfig::Docker(_) => Platform::Docker,
            PlatformConfig::Kubernetes(_) => Platform::Kubernetes,
            PlatformConfig::Lambda(_) => Platform::Lambda,
            PlatformConfig::Batch(_) => Platform::Batch,
            PlatformConfig::Slurm(_) => Platform::Slurm,
            PlatformConfig::Ssh(_) => Platform::Ssh,
        }
    }

    /// Check mandatory keys for the selected platform.
    pub fn validate(&self) -> Result<(), PlatformError> {
        let missing: Vec<&str> = match self {
            PlatformConfig::Local => vec![],
            PlatformConfig::Docker(c) => {
                missing_keys(&[("image", c.image.is_none())])
            }
            PlatformConfig::Kubernetes(c) => {
                missing_keys(&[("image", c.image.is_none())])
            }
            PlatformConfig::Lambda(c) => missing_keys(&[
                ("function_name", c.function_name.is_none()),
                ("region", c.region.is_none()),
            ]),
            PlatformConfig::Batch(c) => missing_keys(&[
                ("job_queue", c.job_queue.is_none()),
                ("job_definition", c.job_definition.is_none()),
            ]),
            PlatformConfig::Slurm(_) => vec![],
            PlatformConfig::Ssh(c) => missing_keys(&[
                ("hostname", c.hostname.is_none()),
                ("username", c.username.is_none()),
            ]),
        };

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PlatformError::Configuration {
                platform: self.platform(),
                message: format!("missing required keys: {}", missing.join(", ")),
            })
        }
    }
}

fn missing_keys<'a>(checks: &[(&'a str, bool)]) -> Vec<&'a str> {
    checks
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(key, _)| *key)
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    pub image: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Seconds before the container is killed
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub gpu: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub image: Option<String>,
    #[serde(default)]
    pub resources: ResourceSpec,
    /// Maps onto the Job's `backoffLimit`
    #[serde(default)]
    pub retry_backoff_limit: Option<u32>,
    #[serde(default)]
    pub active_deadline_seconds: Option<u64>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            image: None,
            resources: ResourceSpec::default(),
            retry_backoff_limit: None,
            active_deadline_seconds: None,
            environment: BTreeMap::new(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaConfig {
    pub function_name: Option<String>,
    pub region: Option<String>,
    #[serde(default = "default_architecture")]
    pub architecture: String,
    #[serde(default = "default_memory_size")]
    pub memory_size: u32,
    #[serde(default = "default_storage_size")]
    pub storage_size: u32,
    #[serde(default)]
    pub iam_role: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub extended_output: bool,
}

impl Default for LambdaConfig {
    fn default() -> Self {
        Self {
            function_name: None,
            region: None,
            architecture: default_architecture(),
            memory_size: default_memory_size(),
            storage_size: default_storage_size(),
            iam_role: None,
            timeout: None,
            extended_output: false,
        }
    }
}

fn default_architecture() -> String {
    "x86_64".to_string()
}

fn default_memory_size() -> u32 {
    512
}

fn default_storage_size() -> u32 {
    512
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub job_queue: Option<String>,
    pub job_definition: Option<String>,
    #[serde(default)]
    pub log_group: Option<String>,
    #[serde(default = "default_vcpu")]
    pub vcpu: u32,
    #[serde(default = "default_batch_memory")]
    pub memory: u32,
    #[serde(default)]
    pub region: Option<String>,
    /// Wait for the terminal state and fetch the log output
    #[serde(default = "default_true")]
    pub wait: bool,
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default = "default_env_type")]
    pub env_type: String,
    #[serde(default)]
    pub num_gpus: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            job_queue: None,
            job_definition: None,
            log_group: None,
            vcpu: default_vcpu(),
            memory: default_batch_memory(),
            region: None,
            wait: true,
            role_arn: None,
            env_type: default_env_type(),
            num_gpus: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_vcpu() -> u32 {
    1
}

fn default_batch_memory() -> u32 {
    2048
}

fn default_env_type() -> String {
    "ec2".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlurmConfig {
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub qos: Option<String>,
    #[serde(default = "default_one")]
    pub nodes: u32,
    #[serde(default = "default_one")]
    pub ntasks: u32,
    #[serde(default = "default_one")]
    pub cpus_per_task: u32,
    #[serde(default = "default_slurm_memory")]
    pub memory: String,
    /// Wall time in `HH:MM:SS`
    #[serde(default = "default_time_limit")]
    pub time_limit: String,
    /// `%j` expands to the job id
    #[serde(default = "default_output_file")]
    pub output_file: String,
    #[serde(default = "default_error_file")]
    pub error_file: String,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            partition: None,
            account: None,
            qos: None,
            nodes: 1,
            ntasks: 1,
            cpus_per_task: 1,
            memory: default_slurm_memory(),
            time_limit: default_time_limit(),
            output_file: default_output_file(),
            error_file: default_error_file(),
        }
    }
}

fn default_one() -> u32 {
    1
}

fn default_slurm_memory() -> String {
    "4GB".to_string()
}

fn default_time_limit() -> String {
    "01:00:00".to_string()
}

fn default_output_file() -> String {
    "slurm-%j.out".to_string()
}

fn default_error_file() -> String {
    "slurm-%j.err".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    pub hostname: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: Option<String>,
    /// Key file preferred; agent authentication is the fallback
    #[serde(default)]
    pub key_file: Option<String>,
    #[serde(default = "default_remote_workdir")]
    pub remote_workdir: String,
    #[serde(default = "default_python_path")]
    pub python_path: String,
    #[serde(default = "default_true")]
    pub cleanup_remote: bool,
    /// Seconds to wait for the TCP/SSH handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            port: default_ssh_port(),
            username: None,
            key_file: None,
            remote_workdir: default_remote_workdir(),
            python_path: default_python_path(),
            cleanup_remote: true,
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_ssh_port() -> u16 {
    22
}

fn default_remote_workdir() -> String {
    "/tmp/dagline".to_string()
}

fn default_python_path() -> String {
    "python3".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_needs_nothing() {
        assert!(PlatformConfig::Local.validate().is_ok());
    }

    #[test]
    fn docker_requires_image() {
        let err = PlatformConfig::Docker(DockerConfig::default())
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("image"));

        let ok = PlatformConfig::Docker(DockerConfig {
            image: Some("python:3.11".to_string()),
            ..DockerConfig::default()
        });
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn batch_requires_queue_and_definition() {
        let err = PlatformConfig::Batch(BatchConfig::default())
            .validate()
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("job_queue"));
        assert!(text.contains("job_definition"));
    }

    #[test]
    fn ssh_requires_host_and_user() {
        let err = PlatformConfig::Ssh(SshConfig::default())
            .validate()
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("hostname"));
        assert!(text.contains("username"));
    }

    #[test]
    fn configs_deserialize_with_defaults() {
        let yaml = r#"
platform: slurm
partition: gpu
"#;
        let config: PlatformConfig = serde_yaml::from_str(yaml).unwrap();
        match &config {
            PlatformConfig::Slurm(c) => {
                assert_eq!(c.partition.as_deref(), Some("gpu"));
                assert_eq!(c.nodes, 1);
                assert_eq!(c.time_limit, "01:00:00");
            }
            other => panic!("expected slurm config, got {:?}", other),
        }
        assert!(config.validate().is_ok());
    }
}
