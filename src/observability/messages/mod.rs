// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message is a plain struct implementing `Display` (human-readable
//! text) and [`StructuredLog`] (machine-readable fields plus span creation),
//! so execution code never assembles log strings inline.

pub mod component;
pub mod engine;
pub mod graph;
pub mod platform;

use tracing::Span;

/// Messages that can emit themselves as structured log events and open
/// spans carrying their fields as attributes.
pub trait StructuredLog {
    /// Emit a log event at the level matching the message's meaning.
    fn log(&self);

    /// Create a span with this message's fields as attributes.
    fn span(&self, name: &str) -> Span;
}
