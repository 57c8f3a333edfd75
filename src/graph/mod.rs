// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Property-graph client for the lineage store.
//!
//! The lineage graph lives in a remote service speaking the Gremlin Server
//! WebSocket protocol. This module owns one connection pool per endpoint and
//! exposes the vertex/edge writes, queries, and statistics the engine needs.
//! Components never hold a session; every operation borrows one from the
//! pool and returns it.
//!
//! Failure semantics: connection problems surface as
//! [`GraphError::Connection`](crate::errors::GraphError), operational
//! problems as [`GraphError::Operation`](crate::errors::GraphError) naming
//! the attempted operation. The store never retries internally; retrying is
//! the caller's decision.

mod client;
mod protocol;
mod store;

#[cfg(test)]
pub mod memory;

pub use client::GremlinClient;
pub use protocol::{flatten_graphson, GremlinRequest, GremlinResponse};
pub use store::{ExecutionGraph, GraphStatistics, GraphStore, SearchFilters, TransactionScope};
