//! The runtime-internal error taxonomy.
//!
//! Every component returns an absence-of-value token (`Option`/`Result`)
//! to its caller; no out-of-band exceptions cross component boundaries.
//! This enum is that token's error half for everything below the
//! execution driver.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("allocation failure: {0}")]
    Memory(String),

    #[error("code generator initialization failed: {0}")]
    CodegenInit(String),

    #[error("code generator compile failed: {0}")]
    CodegenCompile(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<cruntime_platform::PlatformError> for CoreError {
    fn from(e: cruntime_platform::PlatformError) -> Self {
        match e {
            cruntime_platform::PlatformError::NotFound(s) => CoreError::FileNotFound(s),
            cruntime_platform::PlatformError::SymbolNotFound(s) => CoreError::SymbolNotFound(s),
            other => CoreError::Platform(other.to_string()),
        }
    }
}
