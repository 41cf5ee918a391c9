//! ABI trampoline fabric.
//!
//! On Windows, a handful of host-library symbols need a small machine-code
//! thunk to bridge the code generator's native ABI and the host library's
//! ABI. Everywhere else this fabric is a transparent pass-through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use rustc_hash::FxHashMap;

/// Once 256 distinct originals have been wrapped, further requests
/// degrade gracefully to an unwrapped address.
pub const TRAMPOLINE_CAPACITY: usize = 256;

/// A small block of freshly-mapped executable memory. Lives for the
/// process, like the registry that owns it.
struct ExecutableStub {
    ptr: *mut u8,
    len: usize,
}

unsafe impl Send for ExecutableStub {}
unsafe impl Sync for ExecutableStub {}

impl ExecutableStub {
    /// Build a stub that loads `target` into a scratch register, loads
    /// `bridge` into another, and jumps to the bridge. Only the x86-64
    /// encoding is implemented; other architectures report `None` so the
    /// caller falls back to an unwrapped address, the same graceful
    /// degradation used when the registry itself is full.
    #[cfg(target_arch = "x86_64")]
    fn build(target: usize, bridge: usize) -> Option<Self> {
        // mov rax, target   ; 48 B8 <imm64>
        // mov r11, bridge   ; 49 BB <imm64>
        // jmp r11           ; 41 FF E3
        let mut code = Vec::with_capacity(24);
        code.extend_from_slice(&[0x48, 0xB8]);
        code.extend_from_slice(&(target as u64).to_le_bytes());
        code.extend_from_slice(&[0x49, 0xBB]);
        code.extend_from_slice(&(bridge as u64).to_le_bytes());
        code.extend_from_slice(&[0x41, 0xFF, 0xE3]);
        Self::map_executable(&code)
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn build(_target: usize, _bridge: usize) -> Option<Self> {
        None
    }

    #[cfg(unix)]
    fn map_executable(code: &[u8]) -> Option<Self> {
        let len = code.len().max(1);
        unsafe {
            let ptr = libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            if ptr == libc::MAP_FAILED {
                return None;
            }
            std::ptr::copy_nonoverlapping(code.as_ptr(), ptr as *mut u8, code.len());
            if libc::mprotect(ptr, len, libc::PROT_READ | libc::PROT_EXEC) != 0 {
                libc::munmap(ptr, len);
                return None;
            }
            Some(ExecutableStub {
                ptr: ptr as *mut u8,
                len,
            })
        }
    }

    #[cfg(windows)]
    fn map_executable(code: &[u8]) -> Option<Self> {
        // VirtualAlloc/VirtualProtect mirror the write-then-exec transition
        // required on Windows; declared locally since this is the only
        // Windows-specific syscall this crate needs.
        extern "system" {
            fn VirtualAlloc(
                addr: *mut std::ffi::c_void,
                size: usize,
                alloc_type: u32,
                protect: u32,
            ) -> *mut std::ffi::c_void;
            fn VirtualProtect(
                addr: *mut std::ffi::c_void,
                size: usize,
                new_protect: u32,
                old_protect: *mut u32,
            ) -> i32;
        }
        const MEM_COMMIT: u32 = 0x1000;
        const MEM_RESERVE: u32 = 0x2000;
        const PAGE_READWRITE: u32 = 0x04;
        const PAGE_EXECUTE_READ: u32 = 0x20;

        let len = code.len().max(1);
        unsafe {
            let ptr = VirtualAlloc(
                std::ptr::null_mut(),
                len,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            );
            if ptr.is_null() {
                return None;
            }
            std::ptr::copy_nonoverlapping(code.as_ptr(), ptr as *mut u8, code.len());
            let mut old_protect = 0u32;
            if VirtualProtect(ptr, len, PAGE_EXECUTE_READ, &mut old_protect) == 0 {
                return None;
            }
            Some(ExecutableStub {
                ptr: ptr as *mut u8,
                len,
            })
        }
    }

    fn address(&self) -> usize {
        self.ptr as usize
    }
}

impl Drop for ExecutableStub {
    fn drop(&mut self) {
        #[cfg(unix)]
        unsafe {
            libc::munmap(self.ptr as *mut std::ffi::c_void, self.len);
        }
        // Registry lifetime is the process; Windows stubs are reclaimed by
        // the OS at process exit, so no explicit VirtualFree here.
    }
}

/// Spin-lock-style guard: test-and-set with cooperative back-off, the
/// synchronization primitive this registry uses to guard its map.
struct SpinGuard(AtomicBool);

impl SpinGuard {
    const fn new() -> Self {
        SpinGuard(AtomicBool::new(false))
    }

    fn lock(&self) -> SpinLockToken<'_> {
        loop {
            if self
                .0
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SpinLockToken(self);
            }
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }
}

struct SpinLockToken<'a>(&'a SpinGuard);

impl Drop for SpinLockToken<'_> {
    fn drop(&mut self) {
        self.0 .0.store(false, Ordering::Release);
    }
}

/// `original-address -> trampoline-address` mapping, bounded at
/// [`TRAMPOLINE_CAPACITY`].
pub struct TrampolineRegistry {
    guard: SpinGuard,
    map: std::cell::UnsafeCell<FxHashMap<usize, Arc<ExecutableStub>>>,
}

unsafe impl Send for TrampolineRegistry {}
unsafe impl Sync for TrampolineRegistry {}

impl TrampolineRegistry {
    pub fn new() -> Self {
        Self {
            guard: SpinGuard::new(),
            map: std::cell::UnsafeCell::new(FxHashMap::default()),
        }
    }

    /// Wrap `original`, or return the cached trampoline if one was already
    /// built for it — wrapping the same original twice is idempotent. On
    /// capacity exhaustion, returns `original` unwrapped and the caller is
    /// expected to surface a diagnostic — this function does not do so
    /// itself, since it has no I/O policy of its own.
    pub fn wrap_or_original(&self, original: usize, bridge: usize) -> TrampolineOutcome {
        let _token = self.guard.lock();
        // Safety: exclusive access is guaranteed by the spin guard above;
        // this registry is never accessed without holding it.
        let map = unsafe { &mut *self.map.get() };

        if let Some(existing) = map.get(&original) {
            return TrampolineOutcome::Wrapped(existing.address());
        }

        if map.len() >= TRAMPOLINE_CAPACITY {
            return TrampolineOutcome::CapacityExceeded;
        }

        match ExecutableStub::build(original, bridge) {
            Some(stub) => {
                let addr = stub.address();
                map.insert(original, Arc::new(stub));
                TrampolineOutcome::Wrapped(addr)
            }
            None => TrampolineOutcome::Unsupported,
        }
    }

    pub fn len(&self) -> usize {
        let _token = self.guard.lock();
        unsafe { &*self.map.get() }.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TrampolineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrampolineOutcome {
    /// A trampoline exists (freshly built or cached); this is its address.
    Wrapped(usize),
    /// The registry is full; the original address should be used unwrapped.
    CapacityExceeded,
    /// This architecture has no stub encoding; the original address
    /// should be used unwrapped.
    Unsupported,
}

/// Build a trampoline iff running on Windows, the handle is a host
/// library other than the distinguished host module, and the address
/// genuinely points into executable memory.
pub fn should_wrap(
    os: cruntime_platform::Os,
    is_host_module: bool,
    points_into_executable_memory: bool,
) -> bool {
    os == cruntime_platform::Os::Windows && !is_host_module && points_into_executable_memory
}
