use std::collections::HashSet;

use crate::config::Workflow;
use crate::errors::ValidationError;

/// Validate a workflow before scheduling: node ids must be unique, every
/// edge must reference existing nodes, and the directed graph induced by the
/// edges must be acyclic.
///
/// All problems found are returned together so an author can fix a workflow
/// in one pass instead of replaying one error at a time.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
    }

    for edge in &workflow.edges {
        for endpoint in [&edge.source, &edge.target] {
            if !seen.contains(endpoint.as_str()) {
                errors.push(ValidationError::UnknownNodeReference {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
    }

    // Cycle detection only makes sense once the references resolve
    if errors.is_empty() {
        if let Some(cycle) = workflow.dependency_graph().find_cycle() {
            errors.push(ValidationError::CyclicDependency { cycle });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
