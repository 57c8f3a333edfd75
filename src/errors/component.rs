// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

use crate::errors::{PlatformError, ValidationError};
use crate::traits::Platform;

/// Failures of a single component invocation, surfaced to the caller after
/// the lineage vertex has been recorded.
#[derive(Debug)]
pub enum ComponentError {
    /// Argument binding failed before dispatch
    Validation(ValidationError),
    /// Platform configuration rejected before dispatch
    Configuration {
        component: String,
        source: PlatformError,
    },
    /// The user function or its driver failed after retries were exhausted
    Execution {
        component: String,
        execution_id: String,
        platform: Platform,
        source: PlatformError,
    },
}

impl ComponentError {
    /// Stable label used as the error-kind dimension of metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ComponentError::Validation(_) => "validation",
            ComponentError::Configuration { .. } => "configuration",
            ComponentError::Execution { source, .. } => source.kind(),
        }
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentError::Validation(e) => write!(f, "{}", e),
            ComponentError::Configuration { component, source } => {
                write!(f, "Component '{}' misconfigured: {}", component, source)
            }
            ComponentError::Execution {
                component,
                execution_id,
                platform,
                source,
            } => {
                write!(
                    f,
                    "Component '{}' failed on {} (execution {}): {}",
                    component, platform, execution_id, source
                )
            }
        }
    }
}

impl std::error::Error for ComponentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComponentError::Validation(e) => Some(e),
            ComponentError::Configuration { source, .. } => Some(source),
            ComponentError::Execution { source, .. } => Some(source),
        }
    }
}

impl From<ValidationError> for ComponentError {
    fn from(e: ValidationError) -> Self {
        ComponentError::Validation(e)
    }
}
