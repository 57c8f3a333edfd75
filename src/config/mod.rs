// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod dependency_graph;
mod platform;
mod resolver;
mod validation;
mod workflow;

pub use dependency_graph::DependencyGraph;
pub use platform::{
    BatchConfig, DockerConfig, KubernetesConfig, LambdaConfig, PlatformConfig, PlatformSettings,
    ResourceSpec, SlurmConfig, SshConfig,
};
pub use resolver::{
    global_config, init_global_config, ConfigOverrides, ConfigResolver, EngineConfig, GraphConfig,
    RetrySettings, DEFAULT_GRAPH_ENDPOINT,
};
pub use validation::validate_workflow;
pub use workflow::{
    load_workflow, Edge, Node, NodeConfig, NodeData, NodeKind, Port, PortType, Position, Workflow,
    WorkflowMetadata,
};
