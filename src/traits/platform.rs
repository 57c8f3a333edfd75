use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::PlatformError;
use crate::serialize::Value;

/// Compute backend responsible for running a component's user code.
///
/// The seven built-in targets cover in-process execution, container and
/// cluster runtimes, serverless and batch services, HPC schedulers, and
/// plain remote shells. `Extension` is the slot for externally-registered
/// drivers; dispatch is by tag, not by inheritance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Local,
    Docker,
    Kubernetes,
    Lambda,
    Batch,
    Slurm,
    Ssh,
    #[serde(untagged)]
    Extension(String),
}

impl Platform {
    /// Stable label recorded as the `Platform` vertex property.
    pub fn as_str(&self) -> &str {
        match self {
            Platform::Local => "local",
            Platform::Docker => "docker",
            Platform::Kubernetes => "kubernetes",
            Platform::Lambda => "lambda",
            Platform::Batch => "batch",
            Platform::Slurm => "slurm",
            Platform::Ssh => "ssh",
            Platform::Extension(name) => name,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of the function a driver must run: the name to call,
/// the source listing that defines it, and the declared parameter order.
///
/// Remote drivers inline the source listing into a generated script; the
/// in-process driver ignores it and calls the native closure instead.
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    pub name: String,
    pub source_listing: String,
    pub parameter_order: Vec<String>,
}

/// Inputs already passed through the serializer, ready for transport.
///
/// The `{args, kwargs}` shape is what generated scripts deserialize on the
/// far side.
#[derive(Debug, Clone, Default)]
pub struct EncodedInputs {
    pub args: Vec<serde_json::Value>,
    pub kwargs: BTreeMap<String, serde_json::Value>,
}

impl EncodedInputs {
    /// Render as the transport payload `{"args": [...], "kwargs": {...}}`.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "args": self.args,
            "kwargs": self.kwargs,
        })
    }
}

/// Per-invocation context handed to drivers alongside the inputs.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub execution_id: String,
    pub component_name: String,
    pub start_time: DateTime<Utc>,
    pub parent_ids: Vec<String>,
}

/// Whatever form a driver's execution produced. The component runner owns
/// decoding; drivers only deliver.
#[derive(Debug, Clone)]
pub enum RawOutput {
    /// In-process execution returns the value directly, no transport round-trip
    Native(Value),
    /// Remote execution returns captured output; the final JSON line is the result
    Text(String),
    /// Some services hand back parsed JSON already
    Json(serde_json::Value),
}

/// Contract satisfied by every compute backend.
///
/// `execute` delivers the function and inputs to the target and returns the
/// raw output. `validate` rejects configurations missing mandatory keys
/// before any dispatch happens.
#[async_trait]
pub trait PlatformDriver: Send + Sync {
    async fn execute(
        &self,
        descriptor: &FunctionDescriptor,
        inputs: &EncodedInputs,
        context: &InvocationContext,
    ) -> Result<RawOutput, PlatformError>;

    fn platform(&self) -> Platform;

    /// Languages this backend can run source listings in.
    fn supported_languages(&self) -> &[&'static str] {
        &["python"]
    }

    /// Check mandatory configuration before first dispatch.
    fn validate(&self) -> Result<(), PlatformError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_labels_are_stable() {
        assert_eq!(Platform::Local.as_str(), "local");
        assert_eq!(Platform::Kubernetes.as_str(), "kubernetes");
        assert_eq!(Platform::Extension("spark".into()).as_str(), "spark");
    }

    #[test]
    fn encoded_inputs_payload_shape() {
        let mut inputs = EncodedInputs::default();
        inputs.args.push(serde_json::json!(1));
        inputs
            .kwargs
            .insert("b".to_string(), serde_json::json!("two"));

        let payload = inputs.to_payload();
        assert_eq!(payload["args"][0], 1);
        assert_eq!(payload["kwargs"]["b"], "two");
    }
}
