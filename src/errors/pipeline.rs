// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Wraps the first failure surfaced while running a pipeline. The
/// `PipelineEnd` vertex has already been written with `Success = false` by
/// the time this reaches the caller.
#[derive(Debug)]
pub struct PipelineError {
    pub pipeline: String,
    /// Name of the failed component, when the failure came from one
    pub failed_component: Option<String>,
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failed_component {
            Some(component) => write!(
                f,
                "Pipeline '{}' failed at component '{}': {}",
                self.pipeline, component, self.source
            ),
            None => write!(f, "Pipeline '{}' failed: {}", self.pipeline, self.source),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
