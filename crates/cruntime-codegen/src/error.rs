use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("code generator initialization failed: {0}")]
    Init(String),

    #[error("code generator compile failed: {0}")]
    Compile(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),
}

impl From<CodegenError> for cruntime_core::CoreError {
    fn from(e: CodegenError) -> Self {
        match e {
            CodegenError::Init(m) => cruntime_core::CoreError::CodegenInit(m),
            CodegenError::Compile(m) => cruntime_core::CoreError::CodegenCompile(m),
            CodegenError::SymbolNotFound(name) => cruntime_core::CoreError::SymbolNotFound(name),
        }
    }
}
