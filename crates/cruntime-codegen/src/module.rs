//! Module handle, and the typed executable-memory
//! region it owns.

use crate::backend::CodegenState;
use crate::error::CodegenError;
use cruntime_core::Scope;

/// A fully-relocated C translation unit. Owns the code-generator state
/// that produced it (relocated memory is only valid while the state that
/// allocated it is alive), so dropping the handle tears both down
/// together.
pub struct ModuleHandle {
    state: Scope<CodegenState>,
    source_path: Option<std::path::PathBuf>,
}

impl ModuleHandle {
    pub(crate) fn new(state: CodegenState, source_path: Option<std::path::PathBuf>) -> Self {
        Self {
            state: Scope::trivial(state),
            source_path,
        }
    }

    /// `get_symbol`.
    pub fn get_symbol(&self, name: &str) -> Option<usize> {
        self.state.get().get_symbol(name)
    }

    /// Resolve `name` to a typed function pointer. `T` must be an
    /// `extern "C" fn(...)` type matching the symbol's true signature;
    /// the caller is responsible for that match.
    ///
    /// # Safety
    /// The caller must ensure `T` exactly matches the compiled symbol's
    /// signature and calling convention.
    pub unsafe fn get_fn<T: Copy>(&self, name: &str) -> Result<T, CodegenError> {
        let addr = self
            .get_symbol(name)
            .ok_or_else(|| CodegenError::SymbolNotFound(name.to_string()))?;
        assert_eq!(std::mem::size_of::<T>(), std::mem::size_of::<usize>());
        Ok(std::mem::transmute_copy(&addr))
    }

    pub fn source_path(&self) -> Option<&std::path::Path> {
        self.source_path.as_deref()
    }
}
