//! Foreign-call API.
//!
//! Three entry points exposed into generated code for calling a
//! foreign-ABI entry point — especially a variadic host-library function
//! like `printf` — with a runtime-typed argument list the code
//! generator's own call syntax cannot express:
//!
//! - `__ffi_resolve(name) -> address?` — re-enter the symbol resolver to
//!   obtain a raw entry point by name.
//! - `__ffi_prepare_cif(abi, return_type, arg_types, arg_count) -> cif?`
//! - `__ffi_call(cif, entry, args, arg_count) -> result`
//! - `__ffi_free_cif(cif)`

use cruntime_core::SymbolTable;
use cruntime_ffi::{prepare_cif, Abi, Cif, TypeCode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

struct FfiApiState {
    symbols: Arc<SymbolTable>,
    cifs: Mutex<HashMap<usize, Cif>>,
    next_id: AtomicUsize,
}

static STATE: OnceLock<FfiApiState> = OnceLock::new();

/// Installs the process-wide Mini FFI context. Must be called before any
/// compiled code can reach `__ffi_resolve`; the execution driver does
/// this once, alongside the Import API, ahead of the first load.
pub fn install(symbols: Arc<SymbolTable>) {
    let _ = STATE.set(FfiApiState {
        symbols,
        cifs: Mutex::new(HashMap::new()),
        next_id: AtomicUsize::new(1),
    });
}

fn state() -> &'static FfiApiState {
    STATE.get().expect("FFI API used before install()")
}

fn type_code_from_tag(tag: i32) -> Option<TypeCode> {
    match tag {
        0 => Some(TypeCode::I32),
        1 => Some(TypeCode::I64),
        2 => Some(TypeCode::U32),
        3 => Some(TypeCode::U64),
        4 => Some(TypeCode::Pointer),
        5 => Some(TypeCode::Void),
        _ => None,
    }
}

pub extern "C" fn resolve(name: *const c_char) -> *mut c_void {
    if name.is_null() {
        return std::ptr::null_mut();
    }
    let name_str = unsafe { CStr::from_ptr(name) }.to_string_lossy();
    match state().symbols.resolve(&name_str) {
        Some(addr) => addr as *mut c_void,
        None => std::ptr::null_mut(),
    }
}

/// `abi` is always `0` (the single supported System V tag); any other
/// value is rejected the same as an unsupported ABI at prepare time.
pub extern "C" fn prepare_cif_entry(
    abi: i32,
    return_type: i32,
    arg_types: *const i32,
    arg_count: i32,
) -> *mut c_void {
    if abi != 0 || arg_count < 0 {
        return std::ptr::null_mut();
    }
    let Some(return_type) = type_code_from_tag(return_type) else {
        return std::ptr::null_mut();
    };

    let arg_count = arg_count as usize;
    let arg_tags: &[i32] = if arg_count == 0 {
        &[]
    } else if arg_types.is_null() {
        return std::ptr::null_mut();
    } else {
        unsafe { std::slice::from_raw_parts(arg_types, arg_count) }
    };

    let mut arg_type_codes = Vec::with_capacity(arg_count);
    for &tag in arg_tags {
        match type_code_from_tag(tag) {
            Some(t) => arg_type_codes.push(t),
            None => return std::ptr::null_mut(),
        }
    }

    match prepare_cif(Abi::SystemV, return_type, &arg_type_codes) {
        Ok(cif) => {
            let st = state();
            let id = st.next_id.fetch_add(1, Ordering::Relaxed);
            st.cifs.lock().insert(id, cif);
            id as *mut c_void
        }
        Err(e) => {
            eprintln!("cruntime: __ffi_prepare_cif failed: {e}");
            std::ptr::null_mut()
        }
    }
}

pub extern "C" fn call_entry(
    cif: *mut c_void,
    entry: *mut c_void,
    args: *const i64,
    arg_count: i32,
) -> i64 {
    if cif.is_null() || entry.is_null() || arg_count < 0 {
        return 0;
    }
    let arg_count = arg_count as usize;
    let args_slice: &[i64] = if arg_count == 0 {
        &[]
    } else if args.is_null() {
        return 0;
    } else {
        unsafe { std::slice::from_raw_parts(args, arg_count) }
    };

    let cifs = state().cifs.lock();
    let Some(cif) = cifs.get(&(cif as usize)) else {
        return 0;
    };

    match unsafe { cif.call(entry as usize, args_slice) } {
        Ok(result) => result,
        Err(e) => {
            eprintln!("cruntime: __ffi_call failed: {e}");
            0
        }
    }
}

pub extern "C" fn free_cif(cif: *mut c_void) {
    if cif.is_null() {
        return;
    }
    state().cifs.lock().remove(&(cif as usize));
}

pub fn resolve_fn_address() -> usize {
    resolve as usize
}

pub fn prepare_cif_fn_address() -> usize {
    prepare_cif_entry as usize
}

pub fn call_fn_address() -> usize {
    call_entry as usize
}

pub fn free_cif_fn_address() -> usize {
    free_cif as usize
}
