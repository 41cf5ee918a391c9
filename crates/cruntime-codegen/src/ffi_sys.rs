//! Raw bindings to libtcc's `TCCState` API.
//!
//! This is the concrete back end behind [`crate::backend::CodegenState`]'s
//! abstract interface (`new-state`, `compile-string`, `relocate`,
//! `get-symbol`, ...): libtcc's public header declares exactly that
//! surface, so the mapping below is effectively 1:1 with `libtcc.h`.

use std::ffi::{c_char, c_int, c_void};

#[repr(C)]
pub struct TCCState {
    _private: [u8; 0],
}

/// `TCC_OUTPUT_MEMORY`: generate code directly into memory, the mode this
/// runtime always uses (it never writes an executable to disk itself).
pub const TCC_OUTPUT_MEMORY: c_int = 1;
pub const TCC_OUTPUT_EXE: c_int = 2;
pub const TCC_OUTPUT_DLL: c_int = 3;
pub const TCC_OUTPUT_OBJ: c_int = 4;
pub const TCC_OUTPUT_PREPROCESS: c_int = 5;

pub type TccErrorFunc = unsafe extern "C" fn(opaque: *mut c_void, msg: *const c_char);

extern "C" {
    pub fn tcc_new() -> *mut TCCState;
    pub fn tcc_delete(state: *mut TCCState);

    pub fn tcc_set_error_func(state: *mut TCCState, opaque: *mut c_void, func: TccErrorFunc);

    pub fn tcc_set_output_type(state: *mut TCCState, output_type: c_int) -> c_int;
    pub fn tcc_set_options(state: *mut TCCState, options: *const c_char);

    pub fn tcc_add_include_path(state: *mut TCCState, path: *const c_char) -> c_int;
    pub fn tcc_add_sysinclude_path(state: *mut TCCState, path: *const c_char) -> c_int;
    pub fn tcc_define_symbol(state: *mut TCCState, sym: *const c_char, value: *const c_char);
    pub fn tcc_undefine_symbol(state: *mut TCCState, sym: *const c_char);

    pub fn tcc_add_library_path(state: *mut TCCState, path: *const c_char) -> c_int;
    pub fn tcc_add_library(state: *mut TCCState, libraryname: *const c_char) -> c_int;
    pub fn tcc_add_file(state: *mut TCCState, filename: *const c_char) -> c_int;
    pub fn tcc_add_symbol(
        state: *mut TCCState,
        name: *const c_char,
        val: *const c_void,
    ) -> c_int;

    pub fn tcc_compile_string(state: *mut TCCState, buf: *const c_char) -> c_int;

    pub fn tcc_relocate(state: *mut TCCState, ptr: *mut c_void) -> c_int;
    pub fn tcc_get_symbol(state: *mut TCCState, name: *const c_char) -> *mut c_void;

    pub fn tcc_output_file(state: *mut TCCState, filename: *const c_char) -> c_int;
    pub fn tcc_run(state: *mut TCCState, argc: c_int, argv: *mut *mut c_char) -> c_int;
    pub fn tcc_parse_args(
        state: *mut TCCState,
        argc: *mut c_int,
        argv: *mut *mut *mut c_char,
        optind: c_int,
    ) -> c_int;
}

/// Relocation with this value as the `ptr` argument asks libtcc to report
/// the required size instead of relocating, per `libtcc.h`.
pub const TCC_RELOCATE_AUTO: *mut c_void = 1 as *mut c_void;
