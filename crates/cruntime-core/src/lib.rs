//! Core runtime primitives shared by the module loader, the execution
//! driver, and the REPL: the symbol table and resolver, the ABI
//! trampoline fabric, the crash-recovery fabric, and the scoped-resource
//! fabric.

pub mod crash;
pub mod error;
pub mod plt;
pub mod scope;
pub mod symbols;
pub mod trampoline;

pub use error::CoreError;
pub use plt::{PltEntry, PltState, PltTable};
pub use scope::Scope;
pub use symbols::{ResolverHook, SymbolEntry, SymbolSource, SymbolTable};
pub use trampoline::TrampolineRegistry;
