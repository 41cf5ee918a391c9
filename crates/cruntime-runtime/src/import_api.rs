//! Import API.
//!
//! Three entry points exposed into generated code, re-entering the
//! module loader from inside executing compiled code:
//! `__import(path) -> module-handle?`, `__sym(module, name) -> address?`,
//! `__import_free(module)`.

use cruntime_codegen::{loader, LoaderConfig, ModuleHandle};
use cruntime_core::SymbolTable;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

struct ImportApiState {
    symbols: Arc<SymbolTable>,
    config: LoaderConfig,
    prologue: String,
    handles: Mutex<HashMap<usize, ModuleHandle>>,
    next_id: AtomicUsize,
}

static STATE: OnceLock<ImportApiState> = OnceLock::new();

/// Installs the process-wide Import API context. Must be called before
/// any compiled code can reach `__import`; the execution driver does
/// this once, ahead of the first load.
pub fn install(symbols: Arc<SymbolTable>, config: LoaderConfig, prologue: String) {
    // A second `install` (e.g. a nested driver re-entry in tests) is a
    // no-op: the first-installed context stays authoritative for the
    // process.
    let _ = STATE.set(ImportApiState {
        symbols,
        config,
        prologue,
        handles: Mutex::new(HashMap::new()),
        next_id: AtomicUsize::new(1),
    });
}

fn state() -> &'static ImportApiState {
    STATE.get().expect("import API used before install()")
}

pub extern "C" fn import(path: *const c_char) -> *mut c_void {
    if path.is_null() {
        return std::ptr::null_mut();
    }
    let path_str = unsafe { CStr::from_ptr(path) }.to_string_lossy().into_owned();
    let st = state();
    let symbols = st.symbols.clone();
    let resolver = move |name: &str| symbols.resolve(name);

    match loader::load(
        std::path::Path::new(&path_str),
        &st.prologue,
        &st.config,
        &resolver,
    ) {
        Ok(handle) => {
            let id = st.next_id.fetch_add(1, Ordering::Relaxed);
            st.handles.lock().insert(id, handle);
            id as *mut c_void
        }
        Err(e) => {
            eprintln!("cruntime: __import(\"{path_str}\") failed: {e}");
            std::ptr::null_mut()
        }
    }
}

pub extern "C" fn sym(module: *mut c_void, name: *const c_char) -> *mut c_void {
    if module.is_null() || name.is_null() {
        return std::ptr::null_mut();
    }
    let id = module as usize;
    let name_str = unsafe { CStr::from_ptr(name) }.to_string_lossy();

    let handles = state().handles.lock();
    match handles.get(&id).and_then(|h| h.get_symbol(&name_str)) {
        Some(addr) => addr as *mut c_void,
        None => std::ptr::null_mut(),
    }
}

/// Releases the module; every pointer obtained from it (via `__sym`) is
/// invalid afterward, since the handle, and the executable memory it
/// owns, is dropped here.
pub extern "C" fn import_free(module: *mut c_void) {
    if module.is_null() {
        return;
    }
    let id = module as usize;
    state().handles.lock().remove(&id);
}

pub fn import_fn_address() -> usize {
    import as usize
}

pub fn sym_fn_address() -> usize {
    sym as usize
}

pub fn import_free_fn_address() -> usize {
    import_free as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_module_handle_is_a_safe_no_op_for_sym_and_free() {
        // install() uses a process-wide OnceLock so it is only exercised
        // once across the whole test binary; these two calls only touch
        // the null fast path and don't require installation.
        assert!(sym(std::ptr::null_mut(), std::ptr::null()).is_null());
        import_free(std::ptr::null_mut());
    }
}
