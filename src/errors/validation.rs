// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors raised before any dispatch happens: signature mismatches when
/// binding a component call, and structural problems in a workflow graph.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A circular dependency was detected in the workflow graph
    CyclicDependency {
        /// The cycle path showing the circular dependency
        cycle: Vec<String>,
    },
    /// An edge references a node that doesn't exist
    UnknownNodeReference {
        /// The edge with the dangling reference
        edge_id: String,
        /// The node id that couldn't be resolved
        node_id: String,
    },
    /// Two nodes share the same id
    DuplicateNodeId { node_id: String },
    /// A keyword argument does not match any declared parameter
    UnknownParameter {
        component: String,
        parameter: String,
    },
    /// A required parameter has neither an argument nor a default
    MissingParameter {
        component: String,
        parameter: String,
    },
    /// More positional arguments than declared parameters
    TooManyArguments {
        component: String,
        expected: usize,
        got: usize,
    },
    /// The same parameter was bound positionally and by keyword
    DuplicateArgument {
        component: String,
        parameter: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::CyclicDependency { cycle } => {
                write!(f, "Cyclic dependency detected: {}", cycle.join(" -> "))
            }
            ValidationError::UnknownNodeReference { edge_id, node_id } => {
                write!(
                    f,
                    "Edge '{}' references node '{}' which does not exist",
                    edge_id, node_id
                )
            }
            ValidationError::DuplicateNodeId { node_id } => {
                write!(f, "Duplicate node id: '{}'", node_id)
            }
            ValidationError::UnknownParameter {
                component,
                parameter,
            } => {
                write!(
                    f,
                    "Component '{}' has no parameter named '{}'",
                    component, parameter
                )
            }
            ValidationError::MissingParameter {
                component,
                parameter,
            } => {
                write!(
                    f,
                    "Component '{}' is missing required parameter '{}'",
                    component, parameter
                )
            }
            ValidationError::TooManyArguments {
                component,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Component '{}' takes {} positional arguments but {} were given",
                    component, expected, got
                )
            }
            ValidationError::DuplicateArgument {
                component,
                parameter,
            } => {
                write!(
                    f,
                    "Component '{}' got multiple values for parameter '{}'",
                    component, parameter
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}
