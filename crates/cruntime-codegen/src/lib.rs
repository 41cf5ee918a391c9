//! The code-generator binding, module loader, and object cache. The
//! code generator itself is a separate backend; this crate binds the
//! system `libtcc` as the concrete code-generator implementation.

pub mod backend;
pub mod cache;
mod error;
mod ffi_sys;
pub mod loader;
pub mod module;

pub use backend::CodegenState;
pub use error::CodegenError;
pub use loader::{load, load_source, LoaderConfig, SymbolSource};
pub use module::ModuleHandle;
