// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

use crate::traits::Platform;

/// Driver-side failures. The `is_retryable` classification drives the retry
/// loop: network and transient resource errors are worth re-attempting,
/// configuration problems and cancellation are not.
#[derive(Debug, Clone)]
pub enum PlatformError {
    /// Platform configuration is missing required keys or otherwise unusable
    Configuration {
        platform: Platform,
        message: String,
    },
    /// The execution itself failed on the platform (non-zero exit, job
    /// failure, error payload). `retryable` carries the platform's own
    /// signal about whether a re-attempt can succeed.
    Execution {
        platform: Platform,
        message: String,
        retryable: bool,
    },
    /// Transport-level failure reaching the platform
    Network { message: String },
    /// Transient resource exhaustion reported by the platform
    Resource { message: String },
    /// A per-attempt or aggregate deadline expired
    Timeout { operation: String, seconds: f64 },
    /// Cooperative cancellation was observed
    Cancelled,
}

impl PlatformError {
    /// Whether the retry loop should re-attempt after this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlatformError::Network { .. } | PlatformError::Resource { .. } => true,
            PlatformError::Execution { retryable, .. } => *retryable,
            PlatformError::Configuration { .. }
            | PlatformError::Timeout { .. }
            | PlatformError::Cancelled => false,
        }
    }

    /// Stable label used as the error-kind dimension of metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PlatformError::Configuration { .. } => "configuration",
            PlatformError::Execution { .. } => "execution",
            PlatformError::Network { .. } => "network",
            PlatformError::Resource { .. } => "resource",
            PlatformError::Timeout { .. } => "timeout",
            PlatformError::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::Configuration { platform, message } => {
                write!(f, "Invalid {} configuration: {}", platform, message)
            }
            PlatformError::Execution {
                platform, message, ..
            } => {
                write!(f, "{} execution failed: {}", platform, message)
            }
            PlatformError::Network { message } => write!(f, "Network error: {}", message),
            PlatformError::Resource { message } => write!(f, "Resource error: {}", message),
            PlatformError::Timeout { operation, seconds } => {
                write!(f, "Operation '{}' timed out after {}s", operation, seconds)
            }
            PlatformError::Cancelled => write!(f, "Execution cancelled"),
        }
    }
}

impl std::error::Error for PlatformError {}
