//! Mini FFI.
//!
//! A restricted call descriptor: one supported ABI tag, integer
//! arguments only (no floats — callers convert ahead of time), and a
//! per-platform register budget the descriptor refuses to exceed.

use libffi::middle;
use thiserror::Error;

/// Integer-argument register budget: 6 on x86-64 (System V), 8 on
/// aarch64.
pub const INTEGER_REGISTER_BUDGET: usize = if cfg!(target_arch = "aarch64") { 8 } else { 6 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abi {
    /// The single supported tag: System V on the platforms this
    /// runtime targets.
    SystemV,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    I32,
    I64,
    U32,
    U64,
    Pointer,
    Void,
}

impl TypeCode {
    fn to_middle(self) -> middle::Type {
        match self {
            TypeCode::I32 => middle::Type::i32(),
            TypeCode::I64 => middle::Type::i64(),
            TypeCode::U32 => middle::Type::u32(),
            TypeCode::U64 => middle::Type::u64(),
            TypeCode::Pointer => middle::Type::pointer(),
            TypeCode::Void => middle::Type::void(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FfiError {
    #[error("unsupported ABI tag")]
    UnsupportedAbi,

    #[error("argument count {0} exceeds the platform register budget of {1}")]
    TooManyArguments(usize, usize),

    #[error("call supplied {0} arguments but the cif declares {1}")]
    ArityMismatch(usize, usize),
}

/// An immutable, prepared call descriptor.
pub struct Cif {
    inner: middle::Cif,
    return_type: TypeCode,
    arg_count: usize,
}

// `middle::Cif` wraps raw libffi pointers with no interior mutability;
// callers only ever reach a `Cif` from behind a `Mutex` (see
// `cruntime-runtime`'s FFI API state), so sharing it across threads is
// sound even though libffi doesn't assert that itself.
unsafe impl Send for Cif {}
unsafe impl Sync for Cif {}

/// `prepare-cif`: validates the ABI tag and the integer-argument
/// count against the platform register budget before building the
/// underlying libffi descriptor. Floating-point argument types simply
/// don't exist in [`TypeCode`] — there is nothing further to reject.
pub fn prepare_cif(abi: Abi, return_type: TypeCode, arg_types: &[TypeCode]) -> Result<Cif, FfiError> {
    match abi {
        Abi::SystemV => {}
    }

    if arg_types.len() > INTEGER_REGISTER_BUDGET {
        return Err(FfiError::TooManyArguments(
            arg_types.len(),
            INTEGER_REGISTER_BUDGET,
        ));
    }

    let middle_args: Vec<middle::Type> = arg_types.iter().map(|t| t.to_middle()).collect();
    let inner = middle::Cif::new(middle_args, return_type.to_middle());

    Ok(Cif {
        inner,
        return_type,
        arg_count: arg_types.len(),
    })
}

impl Cif {
    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    pub fn return_type(&self) -> TypeCode {
        self.return_type
    }

    /// `call`: load `args` into the correct integer registers,
    /// call `entry`, and return the sign- or zero-extended result
    /// according to the declared return type.
    ///
    /// # Safety
    /// `entry` must be the address of a function whose real signature
    /// matches this CIF exactly — argument count, widths, and
    /// signedness.
    pub unsafe fn call(&self, entry: usize, args: &[i64]) -> Result<i64, FfiError> {
        if args.len() != self.arg_count {
            return Err(FfiError::ArityMismatch(args.len(), self.arg_count));
        }

        let code_ptr = middle::CodePtr::from_ptr(entry as *const std::ffi::c_void);
        let middle_args: Vec<middle::Arg> = args.iter().map(middle::Arg::new).collect();

        let result = match self.return_type {
            TypeCode::I32 => self.inner.call::<i32>(code_ptr, &middle_args) as i64,
            TypeCode::U32 => self.inner.call::<u32>(code_ptr, &middle_args) as i64,
            TypeCode::I64 => self.inner.call::<i64>(code_ptr, &middle_args),
            TypeCode::U64 => self.inner.call::<u64>(code_ptr, &middle_args) as i64,
            TypeCode::Pointer => {
                self.inner.call::<*mut std::ffi::c_void>(code_ptr, &middle_args) as usize as i64
            }
            TypeCode::Void => {
                self.inner.call::<()>(code_ptr, &middle_args);
                0
            }
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_cif_rejects_argument_count_over_the_register_budget() {
        let too_many = vec![TypeCode::I64; INTEGER_REGISTER_BUDGET + 1];
        let result = prepare_cif(Abi::SystemV, TypeCode::I64, &too_many);
        assert!(matches!(result, Err(FfiError::TooManyArguments(_, _))));
    }

    #[test]
    fn prepare_cif_accepts_argument_count_at_the_register_budget() {
        let at_budget = vec![TypeCode::I32; INTEGER_REGISTER_BUDGET];
        let result = prepare_cif(Abi::SystemV, TypeCode::I32, &at_budget);
        assert!(result.is_ok());
        assert_eq!(result.unwrap().arg_count(), INTEGER_REGISTER_BUDGET);
    }

    #[test]
    fn call_rejects_an_argument_list_of_the_wrong_length() {
        let cif = prepare_cif(Abi::SystemV, TypeCode::I64, &[TypeCode::I64, TypeCode::I64]).unwrap();
        let result = unsafe { cif.call(0x1, &[1]) };
        assert!(matches!(result, Err(FfiError::ArityMismatch(1, 2))));
    }
}
