//! The API declaration prologue prepended to every `--eval`, file,
//! and REPL compilation unit: forward declarations for the Import API
//! so user code can call `__import`/`__sym`/`__import_free`, and for the
//! Mini FFI so it can call `__ffi_resolve`/`__ffi_prepare_cif`/
//! `__ffi_call`/`__ffi_free_cif`, all without its own declarations.

/// Fixed banner text. Kept small and constant so the 96 KiB compile-unit
/// ceiling is almost entirely available to user source.
pub const API_PROLOGUE: &str = "\
typedef void *__crt_module_t;
extern __crt_module_t __import(const char *path);
extern void *__sym(__crt_module_t module, const char *name);
extern void __import_free(__crt_module_t module);
typedef void *__crt_cif_t;
extern void *__ffi_resolve(const char *name);
extern __crt_cif_t __ffi_prepare_cif(int abi, int return_type, const int *arg_types, int arg_count);
extern long __ffi_call(__crt_cif_t cif, void *entry, const long *args, int arg_count);
extern void __ffi_free_cif(__crt_cif_t cif);
";
