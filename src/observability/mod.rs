// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability for the execution engine: structured log messages and the
//! shared metrics registry.
//!
//! Message types follow a struct-based pattern with a `Display`
//! implementation plus the [`messages::StructuredLog`] trait, keeping
//! diagnostic strings out of the execution code paths. Messages are
//! organized by subsystem:
//!
//! * `messages::engine` - pipeline and workflow lifecycle events
//! * `messages::component` - component invocation and retry events
//! * `messages::graph` - lineage store connection and write events
//! * `messages::platform` - driver dispatch and job lifecycle events
//!
//! The [`MetricsRegistry`] is the process-wide counter store: invocation and
//! attempt counts, error counts keyed by component/platform/kind, duration
//! aggregates, and the lineage-loss counter.

pub mod messages;
mod metrics;

pub use metrics::{global_metrics, MetricsRegistry, MetricsSnapshot};
