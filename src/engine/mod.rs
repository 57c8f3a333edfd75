// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Execution engine: per-invocation component orchestration, pipeline
//! demarcation, the retry loop, and the workflow runner.

mod component;
mod pipeline;
mod retry;
mod workflow;

#[cfg(test)]
mod integration_tests;

pub use component::{
    ComponentCall, ComponentResult, ComponentRunner, ComponentRunnerBuilder, ComponentSpec,
    ComponentSpecBuilder, ParameterSpec, ParentHashes, VcsInfo,
};
pub use pipeline::{
    ComponentHandle, ExecutionMode, PipelineContext, PipelineOptions, PipelineRunner,
};
pub use retry::RetryPolicy;
pub use workflow::{
    DagRunner, ExecutionSnapshot, NodeSnapshot, NodeStatus, StatusUpdate, WorkflowStatus,
};
