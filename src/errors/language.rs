// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Failures executing inline source in a language runtime subprocess.
#[derive(Debug, Clone, Error)]
pub enum LanguageError {
    /// The runtime binary could not be spawned
    #[error("Failed to launch {runtime} runtime: {message}")]
    Launch { runtime: String, message: String },

    /// The subprocess exited non-zero; carries captured standard error
    #[error("{runtime} execution failed: {stderr}")]
    Execution { runtime: String, stderr: String },

    /// The subprocess outlived its configured deadline
    #[error("{runtime} execution timed out after {seconds}s")]
    Timeout { runtime: String, seconds: f64 },

    /// A structured runtime produced output that is not JSON
    #[error("{runtime} produced unreadable output: {message}")]
    Output { runtime: String, message: String },
}
