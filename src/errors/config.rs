// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Problems loading or resolving engine configuration.
#[derive(Debug)]
pub enum ConfigurationError {
    /// Workflow files are selected by extension; anything else is rejected
    UnsupportedFormat { path: String },
    Io { path: String, message: String },
    Parse { path: String, message: String },
    /// A resolved value is out of range or inconsistent
    Invalid { message: String },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::UnsupportedFormat { path } => {
                write!(f, "Unsupported workflow format: {}", path)
            }
            ConfigurationError::Io { path, message } => {
                write!(f, "Failed to read {}: {}", path, message)
            }
            ConfigurationError::Parse { path, message } => {
                write!(f, "Failed to parse {}: {}", path, message)
            }
            ConfigurationError::Invalid { message } => {
                write!(f, "Invalid configuration: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}
