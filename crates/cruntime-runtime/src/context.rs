//! Process-wide runtime context assembly: the symbol table, the bounded
//! host-library handle set, the ABI trampoline registry, and the Import
//! API and Mini FFI, wired together the way the execution driver needs
//! them before it can select and run a mode.

use crate::config::Config;
use crate::error::RuntimeError;
use crate::{builtins, ffi_api, import_api, prologue};
use cruntime_codegen::LoaderConfig;
use cruntime_core::{SymbolTable, TrampolineRegistry};
use cruntime_platform::{HostLibrarySet, Library};
use parking_lot::RwLock;
use std::sync::Arc;

/// A placeholder for the host-supplied ABI-bridge helper the trampoline
/// fabric jumps through. A real embedding replaces this with its
/// own calling-convention shim; this runtime only needs its address to be
/// resolvable.
extern "C" fn default_abi_bridge() {}

pub struct RuntimeContext {
    pub symbols: Arc<SymbolTable>,
    pub loader_config: LoaderConfig,
    pub prologue: String,
    pub trace: bool,
    host_libraries: Arc<RwLock<HostLibrarySet>>,
    trampolines: Arc<TrampolineRegistry>,
}

impl RuntimeContext {
    pub fn new(config: &Config) -> Result<Self, RuntimeError> {
        let symbols = Arc::new(SymbolTable::new());
        let host_libraries = Arc::new(RwLock::new(HostLibrarySet::new()));
        let trampolines = Arc::new(TrampolineRegistry::new());

        let self_lib = Library::open_self().map_err(cruntime_core::CoreError::from)?;
        host_libraries
            .write()
            .register_host_module("(self)", self_lib)
            .map_err(cruntime_core::CoreError::from)?;

        for name in &config.host_libs {
            match Library::open(name) {
                Ok(lib) => {
                    if let Err(e) = host_libraries.write().admit(name, lib) {
                        eprintln!("cruntime: host-library set is full, skipping {name}: {e}");
                    }
                }
                Err(e) => eprintln!("cruntime: failed to pre-open host library {name}: {e}"),
            }
        }

        {
            let host_libraries = host_libraries.clone();
            let trampolines = trampolines.clone();
            symbols.add_host_library(move |name| {
                resolve_through_trampolines(&host_libraries, &trampolines, name)
            });
        }

        let loader_config = LoaderConfig {
            include_paths: config.include_paths.clone(),
            library_paths: config.library_paths.clone(),
            libraries: Vec::new(),
            identifying_macro: String::new(),
        };

        import_api::install(
            symbols.clone(),
            loader_config.clone(),
            prologue::API_PROLOGUE.to_string(),
        );
        builtins::register_import_api(
            &symbols,
            import_api::import_fn_address(),
            import_api::sym_fn_address(),
            import_api::import_free_fn_address(),
        );

        ffi_api::install(symbols.clone());
        builtins::register_ffi_api(
            &symbols,
            ffi_api::resolve_fn_address(),
            ffi_api::prepare_cif_fn_address(),
            ffi_api::call_fn_address(),
            ffi_api::free_cif_fn_address(),
        );

        Ok(Self {
            symbols,
            loader_config,
            prologue: prologue::API_PROLOGUE.to_string(),
            trace: config.trace,
            host_libraries,
            trampolines,
        })
    }

    pub fn resolver(&self) -> impl Fn(&str) -> Option<usize> + '_ {
        move |name: &str| self.symbols.resolve(name)
    }

    pub fn host_library_count(&self) -> usize {
        self.host_libraries.read().len()
    }

    pub fn trampoline_count(&self) -> usize {
        self.trampolines.len()
    }
}

/// Resolves `name` against the bounded host-library handle set, applying
/// the trampoline policy to the match. A host-module match, a
/// non-Windows host, or trampoline-registry capacity exhaustion all fall
/// back to the unwrapped address; capacity exhaustion is logged, matching
/// the Open Question's "log and surface" guidance rather than silently
/// dropping the symbol.
fn resolve_through_trampolines(
    host_libraries: &RwLock<HostLibrarySet>,
    trampolines: &TrampolineRegistry,
    name: &str,
) -> Option<usize> {
    let (addr, is_host_module) = host_libraries.read().resolve_with_origin(name)?;
    let addr = addr as usize;

    let os = cruntime_platform::running_os();
    if !cruntime_core::trampoline::should_wrap(os, is_host_module, points_into_executable_memory(addr)) {
        return Some(addr);
    }

    match trampolines.wrap_or_original(addr, default_abi_bridge as usize) {
        cruntime_core::trampoline::TrampolineOutcome::Wrapped(wrapped) => Some(wrapped),
        cruntime_core::trampoline::TrampolineOutcome::CapacityExceeded => {
            eprintln!(
                "cruntime: trampoline registry is full ({} entries); {name} will be called unwrapped and may corrupt ABI state",
                cruntime_core::trampoline::TRAMPOLINE_CAPACITY
            );
            Some(addr)
        }
        cruntime_core::trampoline::TrampolineOutcome::Unsupported => Some(addr),
    }
}

#[cfg(windows)]
fn points_into_executable_memory(addr: usize) -> bool {
    // A real embedding would call VirtualQuery and check the protection
    // flags; this runtime treats any non-null address from a host library
    // as plausibly executable, since the host-library probe only ever
    // yields function addresses in the first place.
    addr != 0
}

#[cfg(not(windows))]
fn points_into_executable_memory(_addr: usize) -> bool {
    // Unreachable in practice: `should_wrap` already requires
    // `os == Windows`, so this branch's answer never affects behavior
    // on other platforms.
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use cruntime_platform::Os;

    #[test]
    fn non_windows_host_never_wraps_regardless_of_origin() {
        let os = cruntime_platform::running_os();
        if os != Os::Windows {
            assert!(!cruntime_core::trampoline::should_wrap(os, false, true));
        }
    }
}
