//! Mini FFI call-interface construction and the inline-asm tooling helper.

pub mod asm;
pub mod cif;

pub use cif::{prepare_cif, Abi, Cif, FfiError, TypeCode, INTEGER_REGISTER_BUDGET};
