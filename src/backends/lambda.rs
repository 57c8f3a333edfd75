//! Function-as-a-service backend behind the [`FaasApi`] contract.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use crate::config::LambdaConfig;
use crate::errors::PlatformError;
use crate::observability::messages::{platform::ComponentRegistered, StructuredLog};
use crate::traits::{
    EncodedInputs, FunctionDescriptor, InvocationContext, Platform, PlatformDriver, RawOutput,
};

/// Transport-level retries when an invoke returns no payload at all.
const INVOKE_ATTEMPTS: u32 = 5;

/// The slice of the FaaS service this engine depends on. `invoke` is
/// synchronous request/response; `Ok(None)` means the call went through but
/// no payload came back, which the driver treats as a transport fault.
#[async_trait]
pub trait FaasApi: Send + Sync {
    async fn create_function(
        &self,
        function_name: &str,
        config: &LambdaConfig,
    ) -> Result<(), PlatformError>;

    async fn invoke(
        &self,
        function_name: &str,
        payload: &serde_json::Value,
    ) -> Result<Option<serde_json::Value>, PlatformError>;
}

/// Invokes a pre-registered function by name with the invocation payload.
///
/// Registration happens once per component, on the first dispatch that
/// targets this platform.
pub struct LambdaDriver {
    config: LambdaConfig,
    api: Arc<dyn FaasApi>,
    registered: Mutex<HashSet<String>>,
}

impl LambdaDriver {
    pub fn new(config: LambdaConfig, api: Arc<dyn FaasApi>) -> Self {
        Self {
            config,
            api,
            registered: Mutex::new(HashSet::new()),
        }
    }

    fn function_name(&self, component: &str) -> String {
        self.config
            .function_name
            .clone()
            .unwrap_or_else(|| format!("dagline-{}", component))
    }

    async fn ensure_registered(&self, component: &str) -> Result<(), PlatformError> {
        let function_name = self.function_name(component);
        {
            let registered = self.registered.lock().unwrap();
            if registered.contains(&function_name) {
                return Ok(());
            }
        }

        self.api
            .create_function(&function_name, &self.config)
            .await?;
        ComponentRegistered {
            platform: "lambda",
            component,
        }
        .log();

        self.registered.lock().unwrap().insert(function_name);
        Ok(())
    }
}

#[async_trait]
impl PlatformDriver for LambdaDriver {
    async fn execute(
        &self,
        descriptor: &FunctionDescriptor,
        inputs: &EncodedInputs,
        context: &InvocationContext,
    ) -> Result<RawOutput, PlatformError> {
        self.validate()?;
        self.ensure_registered(&descriptor.name).await?;

        let function_name = self.function_name(&descriptor.name);
        let payload = json!({
            "component": context.component_name,
            "execution_id": context.execution_id,
            "inputs": inputs.to_payload(),
        });

        // The invoke itself retries when nothing comes back; this is
        // independent of the component-level retry policy
        let mut last_error = None;
        for _ in 0..INVOKE_ATTEMPTS {
            match self.api.invoke(&function_name, &payload).await {
                Ok(Some(response)) => {
                    if let Some(message) =
                        response.get("errorMessage").and_then(|m| m.as_str())
                    {
                        return Err(PlatformError::Execution {
                            platform: Platform::Lambda,
                            message: message.to_string(),
                            retryable: false,
                        });
                    }
                    return Ok(RawOutput::Json(response));
                }
                Ok(None) => {
                    last_error = Some(PlatformError::Network {
                        message: format!("no payload returned from {}", function_name),
                    });
                }
                Err(error) if error.is_retryable() => last_error = Some(error),
                Err(error) => return Err(error),
            }
        }

        Err(last_error.unwrap_or_else(|| PlatformError::Network {
            message: format!("invoke of {} produced no output", function_name),
        }))
    }

    fn platform(&self) -> Platform {
        Platform::Lambda
    }

    fn validate(&self) -> Result<(), PlatformError> {
        if self.config.region.is_none() {
            return Err(PlatformError::Configuration {
                platform: Platform::Lambda,
                message: "missing required keys: region".to_string(),
            });
        }
        Ok(())
    }
}
