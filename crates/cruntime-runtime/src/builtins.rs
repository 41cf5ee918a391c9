//! Built-in symbol table entries.
//!
//! The Import API's three entry points and the Mini FFI's four are
//! registered as built-ins (never shadowed by a host library) under both
//! the dunder name used in the API prologue and the single-underscore-
//! mangled name some platforms prepend to C symbols at the object-file
//! level, so a relocation against either spelling succeeds.

use cruntime_core::SymbolTable;

pub const IMPORT_NAME: &str = "__import";
pub const SYM_NAME: &str = "__sym";
pub const IMPORT_FREE_NAME: &str = "__import_free";

pub const FFI_RESOLVE_NAME: &str = "__ffi_resolve";
pub const FFI_PREPARE_CIF_NAME: &str = "__ffi_prepare_cif";
pub const FFI_CALL_NAME: &str = "__ffi_call";
pub const FFI_FREE_CIF_NAME: &str = "__ffi_free_cif";

/// Registers `address` under `name` and its underscore-mangled sibling.
pub fn register_builtin_aliased(table: &SymbolTable, name: &str, address: usize) {
    table.register_builtin(name, address);
    table.register_builtin(&format!("_{name}"), address);
}

/// Register the Import API trio as built-ins.
pub fn register_import_api(
    table: &SymbolTable,
    import_fn: usize,
    sym_fn: usize,
    import_free_fn: usize,
) {
    register_builtin_aliased(table, IMPORT_NAME, import_fn);
    register_builtin_aliased(table, SYM_NAME, sym_fn);
    register_builtin_aliased(table, IMPORT_FREE_NAME, import_free_fn);
}

/// Register the Mini FFI's four entry points as built-ins.
pub fn register_ffi_api(
    table: &SymbolTable,
    resolve_fn: usize,
    prepare_cif_fn: usize,
    call_fn: usize,
    free_cif_fn: usize,
) {
    register_builtin_aliased(table, FFI_RESOLVE_NAME, resolve_fn);
    register_builtin_aliased(table, FFI_PREPARE_CIF_NAME, prepare_cif_fn);
    register_builtin_aliased(table, FFI_CALL_NAME, call_fn);
    register_builtin_aliased(table, FFI_FREE_CIF_NAME, free_cif_fn);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_both_spellings_for_each_entry_point() {
        let table = SymbolTable::new();
        register_import_api(&table, 0x1, 0x2, 0x3);

        assert_eq!(table.resolve(IMPORT_NAME), Some(0x1));
        assert_eq!(table.resolve(&format!("_{IMPORT_NAME}")), Some(0x1));
        assert_eq!(table.resolve(SYM_NAME), Some(0x2));
        assert_eq!(table.resolve(&format!("_{SYM_NAME}")), Some(0x2));
        assert_eq!(table.resolve(IMPORT_FREE_NAME), Some(0x3));
        assert_eq!(table.resolve(&format!("_{IMPORT_FREE_NAME}")), Some(0x3));
    }

    #[test]
    fn registers_both_spellings_for_each_ffi_entry_point() {
        let table = SymbolTable::new();
        register_ffi_api(&table, 0x10, 0x20, 0x30, 0x40);

        assert_eq!(table.resolve(FFI_RESOLVE_NAME), Some(0x10));
        assert_eq!(table.resolve(&format!("_{FFI_RESOLVE_NAME}")), Some(0x10));
        assert_eq!(table.resolve(FFI_PREPARE_CIF_NAME), Some(0x20));
        assert_eq!(table.resolve(FFI_CALL_NAME), Some(0x30));
        assert_eq!(table.resolve(FFI_FREE_CIF_NAME), Some(0x40));
    }

    #[test]
    fn built_in_import_entries_win_over_a_same_named_host_library_export() {
        let table = SymbolTable::new();
        register_import_api(&table, 0x1, 0x2, 0x3);
        table.add_host_library(|name| if name == IMPORT_NAME { Some(0xdead) } else { None });

        assert_eq!(table.resolve(IMPORT_NAME), Some(0x1));
    }
}
