// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use shader_compiler_ir::{ShaderStage, TessInfoConflict};
use thiserror::Error;

/// why a pipeline couldn't be created
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum PipelineError {
    /// a shader wasn't in the cache and compiling was forbidden
    #[error("pipeline compile required")]
    CompileRequired,
    /// the backend rejected a program
    #[error("failed to compile {stage} shader: {message}")]
    Backend {
        /// the failing stage
        stage: ShaderStage,
        /// the backend's diagnostic text
        message: String,
    },
    /// a resource limit was exceeded
    #[error("out of memory")]
    OutOfMemory,
    /// any other failure
    #[error("{0}")]
    Unknown(String),
    /// the create info broke an API rule
    #[error("invalid usage: {0}")]
    InvalidUsage(String),
}

impl From<TessInfoConflict> for PipelineError {
    fn from(v: TessInfoConflict) -> Self {
        PipelineError::InvalidUsage(v.to_string())
    }
}

/// `Result` specialized to `PipelineError`
pub type Result<T> = std::result::Result<T, PipelineError>;
