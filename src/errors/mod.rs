// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod component;
mod config;
mod graph;
mod language;
mod pipeline;
mod platform;
mod validation;
mod workflow;

pub use component::ComponentError;
pub use config::ConfigurationError;
pub use graph::GraphError;
pub use language::LanguageError;
pub use pipeline::PipelineError;
pub use platform::PlatformError;
pub use validation::ValidationError;
pub use workflow::WorkflowError;
