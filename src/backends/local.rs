//! In-process backend: direct invocation of a native closure.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::PlatformError;
use crate::serialize::{decode, Value};
use crate::traits::{
    EncodedInputs, FunctionDescriptor, InvocationContext, Platform, PlatformDriver, RawOutput,
};

/// A component's arguments after binding and decoding, keyed by parameter
/// name with defaults applied.
#[derive(Debug, Clone, Default)]
pub struct BoundInputs {
    values: BTreeMap<String, Value>,
}

impl BoundInputs {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Failure surfaced by a native component function.
///
/// The classification feeds the retry loop: `Transient` failures
/// re-attempt under the component's retry policy, `Fatal` ones surface
/// immediately.
#[derive(Debug, Clone)]
pub enum NativeError {
    Transient(String),
    Fatal(String),
}

impl NativeError {
    pub fn transient(message: impl Into<String>) -> Self {
        NativeError::Transient(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        NativeError::Fatal(message.into())
    }
}

impl From<String> for NativeError {
    fn from(message: String) -> Self {
        NativeError::Transient(message)
    }
}

impl From<&str> for NativeError {
    fn from(message: &str) -> Self {
        NativeError::Transient(message.to_string())
    }
}

/// The native function a local component wraps.
pub type NativeFn = dyn Fn(&BoundInputs) -> Result<Value, NativeError> + Send + Sync;

/// Runs the component function on the calling process.
///
/// No serialization round-trip happens; the encoded inputs are decoded back
/// into engine values and handed to the closure. The declared timeout is
/// honored best-effort: the invocation is abandoned at the deadline, but
/// synchronous user code cannot be preempted mid-execution.
pub struct LocalDriver {
    native: Arc<NativeFn>,
    timeout: Option<Duration>,
}

impl LocalDriver {
    pub fn new(native: Arc<NativeFn>, timeout: Option<Duration>) -> Self {
        Self { native, timeout }
    }
}

#[async_trait]
impl PlatformDriver for LocalDriver {
    async fn execute(
        &self,
        descriptor: &FunctionDescriptor,
        inputs: &EncodedInputs,
        _context: &InvocationContext,
    ) -> Result<RawOutput, PlatformError> {
        let bound = BoundInputs::new(
            inputs
                .kwargs
                .iter()
                .map(|(name, encoded)| (name.clone(), decode(encoded)))
                .collect(),
        );

        let native = self.native.clone();
        let component = descriptor.name.clone();
        let invocation = tokio::task::spawn_blocking(move || native(&bound));

        let joined = match self.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, invocation).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(PlatformError::Timeout {
                        operation: component,
                        seconds: deadline.as_secs_f64(),
                    })
                }
            },
            None => invocation.await,
        };

        let result = joined.map_err(|e| PlatformError::Execution {
            platform: Platform::Local,
            message: format!("invocation task failed: {}", e),
            retryable: false,
        })?;

        match result {
            Ok(value) => Ok(RawOutput::Native(value)),
            Err(NativeError::Transient(message)) => Err(PlatformError::Execution {
                platform: Platform::Local,
                message,
                retryable: true,
            }),
            Err(NativeError::Fatal(message)) => Err(PlatformError::Execution {
                platform: Platform::Local,
                message,
                retryable: false,
            }),
        }
    }

    fn platform(&self) -> Platform {
        Platform::Local
    }

    fn supported_languages(&self) -> &[&'static str] {
        &["native"]
    }
}
