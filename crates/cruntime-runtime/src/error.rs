//! The execution-driver-facing error type, wrapping both the core
//! taxonomy and the code generator's own error kinds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] cruntime_core::CoreError),

    #[error(transparent)]
    Codegen(#[from] cruntime_codegen::CodegenError),

    #[error("{0}")]
    Repl(String),
}

impl RuntimeError {
    /// Exit code mapping for compile/load failures.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
