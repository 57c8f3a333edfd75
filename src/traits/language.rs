use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::LanguageError;

/// Execution options a workflow node can set for its runtime subprocess.
#[derive(Debug, Clone)]
pub struct LanguageOptions {
    pub timeout: Duration,
    pub environment: BTreeMap<String, String>,
}

impl Default for LanguageOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            environment: BTreeMap::new(),
        }
    }
}

/// Runs inline source code in a named runtime with a JSON input payload.
///
/// One shape for all variants: materialize a temporary source file with a
/// prelude that reads the payload, run the runtime as a subprocess, read JSON
/// from standard output, unlink the file.
#[async_trait]
pub trait LanguageDriver: Send + Sync {
    async fn execute(
        &self,
        source: &str,
        inputs: &serde_json::Value,
        options: &LanguageOptions,
    ) -> Result<serde_json::Value, LanguageError>;

    /// The language tag workflow nodes select this driver by.
    fn language(&self) -> &'static str;
}
