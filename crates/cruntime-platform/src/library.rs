//! Cross-platform dynamic library open/resolve/close.
//!
//! `open_library` is extension-smart: on the first failure it retries the
//! deterministic candidate list from [`crate::library_candidates`].

use crate::{running_os, Os};
use std::ffi::{CStr, CString};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("library not found: {0}")]
    NotFound(String),
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("invalid path or symbol name (contains NUL byte): {0}")]
    InvalidName(String),
    #[error("host-library handle set is full (capacity {})", crate::MAX_HOST_LIBRARIES)]
    CapacityExceeded,
}

/// An opened host library. Closed when dropped.
pub struct Library {
    handle: Handle,
    #[allow(dead_code)]
    opened_as: String,
}

impl Library {
    /// Open a library, retrying the extension-smart candidate list on
    /// failure. `requested` is tried verbatim first.
    pub fn open(requested: &str) -> Result<Self, PlatformError> {
        let os = running_os();
        let mut last_err = None;
        for candidate in crate::library_candidates(requested, os) {
            match Handle::load(&candidate) {
                Ok(handle) => {
                    return Ok(Library {
                        handle,
                        opened_as: candidate,
                    })
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| PlatformError::NotFound(requested.to_string())))
    }

    /// Open the running process itself as a pseudo-library (the
    /// distinguished "host module").
    pub fn open_self() -> Result<Self, PlatformError> {
        Ok(Library {
            handle: Handle::load_self()?,
            opened_as: "(self)".to_string(),
        })
    }

    /// Resolve a symbol by name. Returns `None` rather than erroring, since
    /// resolver misses are an expected part of the host-library search order.
    pub fn resolve(&self, name: &str) -> Option<*mut std::ffi::c_void> {
        self.handle.symbol(name).ok()
    }

    pub fn last_error() -> Option<String> {
        Handle::last_error()
    }
}

#[cfg(unix)]
struct Handle {
    raw: *mut std::ffi::c_void,
}

#[cfg(unix)]
impl Handle {
    fn load(path: &str) -> Result<Self, PlatformError> {
        let c_path =
            CString::new(path).map_err(|_| PlatformError::InvalidName(path.to_string()))?;
        let raw =
            unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if raw.is_null() {
            return Err(PlatformError::NotFound(format!(
                "{path}: {}",
                Self::last_error().unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        Ok(Handle { raw })
    }

    fn load_self() -> Result<Self, PlatformError> {
        let raw = unsafe { libc::dlopen(std::ptr::null(), libc::RTLD_NOW) };
        if raw.is_null() {
            return Err(PlatformError::NotFound("(self)".to_string()));
        }
        Ok(Handle { raw })
    }

    fn symbol(&self, name: &str) -> Result<*mut std::ffi::c_void, PlatformError> {
        let c_name =
            CString::new(name).map_err(|_| PlatformError::InvalidName(name.to_string()))?;
        unsafe {
            libc::dlerror();
            let addr = libc::dlsym(self.raw, c_name.as_ptr());
            if !libc::dlerror().is_null() || addr.is_null() {
                return Err(PlatformError::SymbolNotFound(name.to_string()));
            }
            Ok(addr)
        }
    }

    fn last_error() -> Option<String> {
        unsafe {
            let ptr = libc::dlerror();
            if ptr.is_null() {
                None
            } else {
                Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
            }
        }
    }
}

#[cfg(unix)]
impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.raw);
        }
    }
}

#[cfg(unix)]
unsafe impl Send for Handle {}
#[cfg(unix)]
unsafe impl Sync for Handle {}

#[cfg(windows)]
struct Handle {
    raw: *mut std::ffi::c_void,
}

#[cfg(windows)]
extern "system" {
    fn LoadLibraryA(filename: *const i8) -> *mut std::ffi::c_void;
    fn GetModuleHandleA(filename: *const i8) -> *mut std::ffi::c_void;
    fn GetProcAddress(module: *mut std::ffi::c_void, procname: *const i8) -> *mut std::ffi::c_void;
    fn FreeLibrary(module: *mut std::ffi::c_void) -> i32;
    fn GetLastError() -> u32;
}

#[cfg(windows)]
impl Handle {
    fn load(path: &str) -> Result<Self, PlatformError> {
        let c_path =
            CString::new(path).map_err(|_| PlatformError::InvalidName(path.to_string()))?;
        let raw = unsafe { LoadLibraryA(c_path.as_ptr()) };
        if raw.is_null() {
            return Err(PlatformError::NotFound(format!(
                "{path} (error code {})",
                unsafe { GetLastError() }
            )));
        }
        Ok(Handle { raw })
    }

    fn load_self() -> Result<Self, PlatformError> {
        let raw = unsafe { GetModuleHandleA(std::ptr::null()) };
        if raw.is_null() {
            return Err(PlatformError::NotFound("(self)".to_string()));
        }
        // GetModuleHandleA does not take a reference we own; skip FreeLibrary for this handle.
        Ok(Handle { raw })
    }

    fn symbol(&self, name: &str) -> Result<*mut std::ffi::c_void, PlatformError> {
        let c_name =
            CString::new(name).map_err(|_| PlatformError::InvalidName(name.to_string()))?;
        let addr = unsafe { GetProcAddress(self.raw, c_name.as_ptr()) };
        if addr.is_null() {
            return Err(PlatformError::SymbolNotFound(name.to_string()));
        }
        Ok(addr)
    }

    fn last_error() -> Option<String> {
        let code = unsafe { GetLastError() };
        if code == 0 {
            None
        } else {
            Some(format!("Win32 error {code}"))
        }
    }
}

#[cfg(windows)]
impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            FreeLibrary(self.raw);
        }
    }
}

#[cfg(windows)]
unsafe impl Send for Handle {}
#[cfg(windows)]
unsafe impl Sync for Handle {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_a_nonexistent_library_fails() {
        let result = Library::open("/nonexistent/definitely-not-a-library");
        assert!(result.is_err());
    }

    #[test]
    fn opening_self_succeeds() {
        let lib = Library::open_self().expect("open_self should succeed on a running process");
        // libc is always linked in, `malloc` must resolve from the process image.
        assert!(lib.resolve("malloc").is_some());
    }
}
