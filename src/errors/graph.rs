// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Lineage-store failures. Connection problems and operational problems are
/// kept distinct so callers can decide whether reconnecting is worthwhile.
/// The store itself never retries; that is the caller's job.
#[derive(Debug, Clone)]
pub enum GraphError {
    /// Could not reach or handshake with the graph endpoint
    Connection { endpoint: String, message: String },
    /// A traversal was submitted but the server rejected or dropped it
    Operation {
        /// The store operation that was being attempted
        operation: &'static str,
        message: String,
    },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Connection { endpoint, message } => {
                write!(
                    f,
                    "Failed to connect to graph endpoint {}: {}",
                    endpoint, message
                )
            }
            GraphError::Operation { operation, message } => {
                write!(f, "Graph operation '{}' failed: {}", operation, message)
            }
        }
    }
}

impl std::error::Error for GraphError {}
