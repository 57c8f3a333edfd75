// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

use crate::errors::{LanguageError, ValidationError};

/// Failures executing an externally-authored workflow.
#[derive(Debug)]
pub enum WorkflowError {
    /// The workflow failed structural validation; every problem found
    Validation(Vec<ValidationError>),
    /// A node names a language no registered driver handles
    UnsupportedLanguage { node_id: String, language: String },
    /// An inbound edge's source produced no output this node can consume
    MissingInput { node_id: String, source: String },
    /// A node's runtime execution failed; downstream nodes were skipped
    NodeFailed {
        node_id: String,
        source: LanguageError,
    },
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowError::Validation(errors) => {
                write!(f, "Workflow validation failed: ")?;
                for (i, error) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", error)?;
                }
                Ok(())
            }
            WorkflowError::UnsupportedLanguage { node_id, language } => {
                write!(f, "Node '{}' uses unsupported language '{}'", node_id, language)
            }
            WorkflowError::MissingInput { node_id, source } => {
                write!(
                    f,
                    "Node '{}' is missing input from source node '{}'",
                    node_id, source
                )
            }
            WorkflowError::NodeFailed { node_id, source } => {
                write!(f, "Node '{}' failed: {}", node_id, source)
            }
        }
    }
}

impl std::error::Error for WorkflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkflowError::NodeFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
