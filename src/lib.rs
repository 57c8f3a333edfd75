// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;      // platform drivers
pub mod config;        // configuration, workflow model, graph algorithms
pub mod engine;        // component/pipeline/workflow runners
pub mod errors;        // error handling
pub mod graph;         // lineage property-graph client
pub mod languages;     // language drivers for inline source
pub mod observability; // metrics + structured log messages
pub mod serialize;     // value envelopes and execution hashing
pub mod traits;        // unified abstractions
