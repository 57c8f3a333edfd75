//! Message types for component invocation lifecycle events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A component invocation began dispatch.
///
/// # Log Level
/// `debug!` - high-volume operational event
pub struct ComponentExecutionStarted<'a> {
    pub component: &'a str,
    pub execution_id: &'a str,
    pub platform: &'a str,
}

impl Display for ComponentExecutionStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Executing component '{}' on {} (execution {})",
            self.component, self.platform, self.execution_id
        )
    }
}

impl StructuredLog for ComponentExecutionStarted<'_> {
    fn log(&self) {
        tracing::debug!(
            component = self.component,
            execution_id = self.execution_id,
            platform = self.platform,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "component_execution",
            span_name = name,
            component = self.component,
            execution_id = self.execution_id,
            platform = self.platform,
        )
    }
}

/// A component invocation completed and its vertex was recorded.
pub struct ComponentExecutionCompleted<'a> {
    pub component: &'a str,
    pub execution_id: &'a str,
    pub duration: std::time::Duration,
}

impl Display for ComponentExecutionCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Component '{}' completed in {:?} (execution {})",
            self.component, self.duration, self.execution_id
        )
    }
}

impl StructuredLog for ComponentExecutionCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            component = self.component,
            execution_id = self.execution_id,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "component_completed",
            span_name = name,
            component = self.component,
            execution_id = self.execution_id,
        )
    }
}

/// A component invocation failed after retries were exhausted.
pub struct ComponentExecutionFailed<'a> {
    pub component: &'a str,
    pub execution_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ComponentExecutionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Component '{}' failed (execution {}): {}",
            self.component, self.execution_id, self.error
        )
    }
}

impl StructuredLog for ComponentExecutionFailed<'_> {
    fn log(&self) {
        tracing::error!(
            component = self.component,
            execution_id = self.execution_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "component_failed",
            span_name = name,
            component = self.component,
            execution_id = self.execution_id,
        )
    }
}

/// An attempt failed with a retryable error; a re-attempt is scheduled.
pub struct ComponentRetryScheduled<'a> {
    pub component: &'a str,
    pub attempt: u32,
    pub max_attempts: u32,
    pub wait: std::time::Duration,
    pub error: &'a dyn std::error::Error,
}

impl Display for ComponentRetryScheduled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Attempt {}/{} failed for '{}', retrying in {:.1}s: {}",
            self.attempt,
            self.max_attempts,
            self.component,
            self.wait.as_secs_f64(),
            self.error
        )
    }
}

impl StructuredLog for ComponentRetryScheduled<'_> {
    fn log(&self) {
        tracing::warn!(
            component = self.component,
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            wait_ms = self.wait.as_millis() as u64,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "component_retry",
            span_name = name,
            component = self.component,
            attempt = self.attempt,
        )
    }
}
