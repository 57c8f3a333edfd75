//! Message types for driver dispatch and remote job lifecycle events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A remote job was submitted on behalf of an invocation.
pub struct JobSubmitted<'a> {
    pub platform: &'a str,
    pub job_id: &'a str,
    pub execution_id: &'a str,
}

impl Display for JobSubmitted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Submitted {} job {} (execution {})",
            self.platform, self.job_id, self.execution_id
        )
    }
}

impl StructuredLog for JobSubmitted<'_> {
    fn log(&self) {
        tracing::info!(
            platform = self.platform,
            job_id = self.job_id,
            execution_id = self.execution_id,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "job_submitted",
            span_name = name,
            platform = self.platform,
            job_id = self.job_id,
        )
    }
}

/// A per-component registration (function or job definition) was performed
/// on first dispatch to the platform.
pub struct ComponentRegistered<'a> {
    pub platform: &'a str,
    pub component: &'a str,
}

impl Display for ComponentRegistered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Registered component '{}' with {}",
            self.component, self.platform
        )
    }
}

impl StructuredLog for ComponentRegistered<'_> {
    fn log(&self) {
        tracing::info!(platform = self.platform, component = self.component, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "component_registered",
            span_name = name,
            platform = self.platform,
            component = self.component,
        )
    }
}

/// Cleanup of a remote artifact (job, config map, script) failed. The
/// execution result is unaffected; the artifact may need manual removal.
pub struct CleanupFailed<'a> {
    pub platform: &'a str,
    pub artifact: &'a str,
    pub error: &'a str,
}

impl Display for CleanupFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to clean up {} artifact '{}': {}",
            self.platform, self.artifact, self.error
        )
    }
}

impl StructuredLog for CleanupFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            platform = self.platform,
            artifact = self.artifact,
            error = self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("cleanup_failed", span_name = name, platform = self.platform)
    }
}
