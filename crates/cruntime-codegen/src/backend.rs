//! Safe wrapper around [`crate::ffi_sys`], implementing the back-end
//! interface that the module loader drives.

use crate::error::CodegenError;
use crate::ffi_sys::{self, TCCState};
use parking_lot::Mutex;
use std::ffi::{c_void, CStr, CString};
use std::sync::Arc;

/// Collected diagnostic lines from `tcc_set_error_func`. libtcc reports
/// undefined symbols and compile errors alike through this callback
/// rather than a separate structured channel, so [`CodegenState::relocate`]
/// parses these lines to find missing-symbol names.
struct Diagnostics {
    messages: Vec<String>,
}

/// A single code-generator state.
///
/// Not `Send`/`Sync`: a state is mutated only by the thread that owns it,
/// matching the single-threaded cooperative driver model. Re-entrant
/// loads simply construct a second, independent `CodegenState`.
pub struct CodegenState {
    raw: *mut TCCState,
    diagnostics: Arc<Mutex<Diagnostics>>,
}

// SAFETY: a state is only ever touched by the single thread driving the
// execution driver's cooperative loop at any given time; this just
// satisfies storage types (e.g. a handle table behind a `Mutex`) that
// require `Send`.
unsafe impl Send for CodegenState {}

unsafe extern "C" fn error_callback(opaque: *mut c_void, msg: *const std::ffi::c_char) {
    let diagnostics = &*(opaque as *const Mutex<Diagnostics>);
    let text = CStr::from_ptr(msg).to_string_lossy().into_owned();
    diagnostics.lock().messages.push(text);
}

impl CodegenState {
    /// `new-state`: allocate a state, install the error collector, and
    /// select in-memory output — the mode every module the execution
    /// driver loads and runs is compiled in.
    pub fn new() -> Result<Self, CodegenError> {
        Self::new_with_output_type(ffi_sys::TCC_OUTPUT_MEMORY, "memory")
    }

    /// A second flavor of state, configured for `TCC_OUTPUT_OBJ` instead
    /// of in-memory output. libtcc cannot emit an object file from a
    /// state that was relocated for in-memory execution, so writing the
    /// object cache means recompiling the same combined source into a
    /// state built for exactly this purpose.
    pub fn new_for_object_output() -> Result<Self, CodegenError> {
        Self::new_with_output_type(ffi_sys::TCC_OUTPUT_OBJ, "object")
    }

    fn new_with_output_type(output_type: std::ffi::c_int, label: &str) -> Result<Self, CodegenError> {
        let raw = unsafe { ffi_sys::tcc_new() };
        if raw.is_null() {
            return Err(CodegenError::Init("tcc_new returned null".into()));
        }

        let diagnostics = Arc::new(Mutex::new(Diagnostics {
            messages: Vec::new(),
        }));

        unsafe {
            ffi_sys::tcc_set_error_func(
                raw,
                Arc::as_ptr(&diagnostics) as *mut c_void,
                error_callback,
            );
            if ffi_sys::tcc_set_output_type(raw, output_type) < 0 {
                ffi_sys::tcc_delete(raw);
                return Err(CodegenError::Init(format!("failed to set {label} output mode")));
            }
        }

        Ok(Self { raw, diagnostics })
    }

    /// `set_options`: pass a libtcc option string verbatim (used to
    /// disable host stdlib/headers and to define the OS-family macro).
    pub fn set_options(&mut self, options: &str) -> Result<(), CodegenError> {
        let c_options = cstring(options)?;
        unsafe { ffi_sys::tcc_set_options(self.raw, c_options.as_ptr()) };
        Ok(())
    }

    pub fn define_symbol(&mut self, name: &str, value: &str) -> Result<(), CodegenError> {
        let c_name = cstring(name)?;
        let c_value = cstring(value)?;
        unsafe { ffi_sys::tcc_define_symbol(self.raw, c_name.as_ptr(), c_value.as_ptr()) };
        Ok(())
    }

    pub fn add_include_path(&mut self, path: &str) -> Result<(), CodegenError> {
        let c_path = cstring(path)?;
        let rc = unsafe { ffi_sys::tcc_add_include_path(self.raw, c_path.as_ptr()) };
        if rc < 0 {
            return Err(CodegenError::Init(format!("bad include path: {path}")));
        }
        Ok(())
    }

    pub fn add_library_path(&mut self, path: &str) -> Result<(), CodegenError> {
        let c_path = cstring(path)?;
        let rc = unsafe { ffi_sys::tcc_add_library_path(self.raw, c_path.as_ptr()) };
        if rc < 0 {
            return Err(CodegenError::Init(format!("bad library path: {path}")));
        }
        Ok(())
    }

    pub fn add_library(&mut self, name: &str) -> Result<(), CodegenError> {
        let c_name = cstring(name)?;
        let rc = unsafe { ffi_sys::tcc_add_library(self.raw, c_name.as_ptr()) };
        if rc < 0 {
            return Err(CodegenError::Init(format!("library not found: {name}")));
        }
        Ok(())
    }

    /// `add_symbol`: pre-register a built-in or host-resolved address
    /// so it is visible to compiled code without going through the
    /// relocation-time resolver hook.
    pub fn add_symbol(&mut self, name: &str, address: usize) -> Result<(), CodegenError> {
        let c_name = cstring(name)?;
        let rc = unsafe {
            ffi_sys::tcc_add_symbol(self.raw, c_name.as_ptr(), address as *const c_void)
        };
        if rc < 0 {
            return Err(CodegenError::Init(format!("failed to add symbol: {name}")));
        }
        Ok(())
    }

    /// `compile_string`. The 96 KiB combined-source ceiling is enforced
    /// by the caller (the loader), not here — this wrapper only forwards
    /// to the code generator.
    pub fn compile_string(&mut self, source: &str) -> Result<(), CodegenError> {
        self.diagnostics.lock().messages.clear();
        let c_source = cstring(source)?;
        let rc = unsafe { ffi_sys::tcc_compile_string(self.raw, c_source.as_ptr()) };
        if rc < 0 {
            return Err(CodegenError::Compile(self.drain_diagnostics()));
        }
        Ok(())
    }

    pub fn add_file(&mut self, path: &str) -> Result<(), CodegenError> {
        let c_path = cstring(path)?;
        let rc = unsafe { ffi_sys::tcc_add_file(self.raw, c_path.as_ptr()) };
        if rc < 0 {
            return Err(CodegenError::Compile(self.drain_diagnostics()));
        }
        Ok(())
    }

    pub fn output_file(&mut self, path: &str) -> Result<(), CodegenError> {
        let c_path = cstring(path)?;
        let rc = unsafe { ffi_sys::tcc_output_file(self.raw, c_path.as_ptr()) };
        if rc < 0 {
            return Err(CodegenError::Compile(self.drain_diagnostics()));
        }
        Ok(())
    }

    /// `relocate`, with the resolve-symbol hook called during
    /// relocation: libtcc reports undefined symbols through the error
    /// callback rather than through a resolver hook of its own, so this
    /// drains those diagnostics, asks `resolve` for each missing name, and
    /// retries a bounded number of times.
    pub fn relocate(&mut self, mut resolve: impl FnMut(&str) -> Option<usize>) -> Result<(), CodegenError> {
        const MAX_ATTEMPTS: usize = 8;

        for _ in 0..MAX_ATTEMPTS {
            self.diagnostics.lock().messages.clear();
            let rc = unsafe { ffi_sys::tcc_relocate(self.raw, ffi_sys::TCC_RELOCATE_AUTO) };
            if rc >= 0 {
                return Ok(());
            }

            let messages = self.drain_diagnostics();
            let missing = extract_undefined_symbols(&messages);
            if missing.is_empty() {
                return Err(CodegenError::Compile(messages));
            }

            let mut resolved_any = false;
            for name in &missing {
                if let Some(address) = resolve(name) {
                    self.add_symbol(name, address)?;
                    resolved_any = true;
                } else {
                    return Err(CodegenError::SymbolNotFound(name.clone()));
                }
            }
            if !resolved_any {
                return Err(CodegenError::Compile(messages));
            }
        }

        Err(CodegenError::Compile(
            "relocation did not converge after repeated symbol resolution".into(),
        ))
    }

    /// `get_symbol`: look up an address in a relocated module.
    pub fn get_symbol(&self, name: &str) -> Option<usize> {
        let c_name = CString::new(name).ok()?;
        let ptr = unsafe { ffi_sys::tcc_get_symbol(self.raw, c_name.as_ptr()) };
        if ptr.is_null() {
            None
        } else {
            Some(ptr as usize)
        }
    }

    fn drain_diagnostics(&self) -> String {
        self.diagnostics.lock().messages.join("\n")
    }
}

impl Drop for CodegenState {
    fn drop(&mut self) {
        unsafe { ffi_sys::tcc_delete(self.raw) };
    }
}

fn cstring(s: &str) -> Result<CString, CodegenError> {
    CString::new(s).map_err(|_| CodegenError::Init(format!("embedded NUL in: {s:?}")))
}

/// Parses libtcc's `"tccelf.c: error: undefined symbol 'foo'"`-shaped
/// diagnostic lines for the symbol name.
fn extract_undefined_symbols(messages: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in messages.lines() {
        if let Some(idx) = line.find("undefined symbol") {
            let rest = &line[idx..];
            if let Some(start) = rest.find('\'') {
                if let Some(end) = rest[start + 1..].find('\'') {
                    let name = &rest[start + 1..start + 1 + end];
                    if !names.iter().any(|n: &String| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_undefined_symbols_parses_one_name_per_line() {
        let messages = "a.c: undefined symbol 'foo'\nb.c: undefined symbol 'bar'";
        let names = extract_undefined_symbols(messages);
        assert_eq!(names, vec!["foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn extract_undefined_symbols_deduplicates() {
        let messages = "undefined symbol 'foo'\nundefined symbol 'foo'";
        assert_eq!(extract_undefined_symbols(messages), vec!["foo".to_string()]);
    }

    #[test]
    fn extract_undefined_symbols_ignores_unrelated_diagnostics() {
        let messages = "warning: implicit declaration of function 'puts'";
        assert!(extract_undefined_symbols(messages).is_empty());
    }
}
