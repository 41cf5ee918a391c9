//! Crash-recovery fabric.
//!
//! A process-wide singleton that lets the execution driver resume control
//! after a compiled program raises SIGSEGV, SIGBUS, SIGILL, SIGFPE, or
//! SIGABRT, instead of the host process dying with it. Resume-arming is
//! the execution driver's discipline, not this module's: a resume point
//! is only live for the duration of one call into compiled code.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::OnceLock;

#[cfg(unix)]
mod sigjmp {
    // glibc's sigjmp_buf is a small struct of machine words plus a
    // signal mask; 64 words is generous headroom on every ABI this
    // crate targets.
    pub type SigJmpBuf = [u64; 64];

    extern "C" {
        // glibc exposes `sigsetjmp` only as the `<setjmp.h>` macro that
        // expands to a call to `__sigsetjmp`; the dynamic symbol table
        // carries the latter name, not the former.
        #[link_name = "__sigsetjmp"]
        pub fn sigsetjmp_raw(env: *mut u64, savesigs: i32) -> i32;
        #[link_name = "siglongjmp"]
        pub fn siglongjmp_raw(env: *mut u64, val: i32) -> !;
    }

    pub unsafe fn sigsetjmp(buf: *mut SigJmpBuf, savesigs: i32) -> i32 {
        sigsetjmp_raw(buf as *mut u64, savesigs)
    }

    pub unsafe fn siglongjmp(buf: *mut SigJmpBuf, val: i32) -> ! {
        siglongjmp_raw(buf as *mut u64, val)
    }
}

#[cfg(unix)]
use sigjmp::SigJmpBuf;

#[cfg(not(unix))]
type SigJmpBuf = [u64; 1];

/// Where, in the host's own source, control is about to cross into
/// compiled code. Printed verbatim in the crash diagnostic.
#[derive(Debug, Clone)]
pub struct CrashLocation {
    pub source_file: &'static str,
    pub function: &'static str,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// The resume point was just armed; control is about to proceed
    /// forward into compiled code.
    Armed,
    /// Control resumed here via `siglongjmp` after a fault; carries the
    /// signal number that triggered the resume.
    Resumed(i32),
}

pub struct CrashContext {
    armed: AtomicBool,
    jmp_buf: std::cell::UnsafeCell<SigJmpBuf>,
    location: Mutex<Option<CrashLocation>>,
    last_signal: AtomicI32,
}

// SAFETY: `jmp_buf` is only ever written by the thread that calls `arm`,
// and only ever read by a signal handler running on that same thread
// during a synchronous fault raised by code that thread is executing.
unsafe impl Sync for CrashContext {}

impl CrashContext {
    fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            jmp_buf: std::cell::UnsafeCell::new([0; core::mem::size_of::<SigJmpBuf>() / 8]),
            location: Mutex::new(None),
            last_signal: AtomicI32::new(0),
        }
    }

    /// Arm the resume point immediately before invoking compiled code.
    /// Returns [`ArmOutcome::Armed`] on the direct call; if a fault later
    /// resumes here via `siglongjmp`, returns
    /// [`ArmOutcome::Resumed`] instead, on the very same call.
    pub fn arm(&self, location: CrashLocation) -> ArmOutcome {
        *self.location.lock() = Some(location);
        #[cfg(unix)]
        let rc = unsafe { sigjmp::sigsetjmp(self.jmp_buf.get(), 1) };
        #[cfg(not(unix))]
        let rc = 0;

        if rc == 0 {
            self.armed.store(true, Ordering::Release);
            ArmOutcome::Armed
        } else {
            self.armed.store(false, Ordering::Release);
            ArmOutcome::Resumed(rc)
        }
    }

    /// Disarm immediately after a call into compiled code returns
    /// normally; a fault after this point is not ours to catch.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn last_signal(&self) -> i32 {
        self.last_signal.load(Ordering::Relaxed)
    }

    fn current_location(&self) -> Option<CrashLocation> {
        self.location.lock().clone()
    }
}

static CONTEXT: OnceLock<CrashContext> = OnceLock::new();
static HANDLERS_INSTALLED: AtomicBool = AtomicBool::new(false);

/// The process-wide crash context, installing signal handlers on first
/// access.
pub fn context() -> &'static CrashContext {
    let ctx = CONTEXT.get_or_init(CrashContext::new);
    if !HANDLERS_INSTALLED.swap(true, Ordering::AcqRel) {
        install_handlers();
    }
    ctx
}

const FAULT_SIGNALS: &[i32] = &[
    libc_signal::SIGSEGV,
    libc_signal::SIGBUS,
    libc_signal::SIGILL,
    libc_signal::SIGFPE,
    libc_signal::SIGABRT,
];

#[cfg(unix)]
mod libc_signal {
    pub use libc::{SIGABRT, SIGBUS, SIGFPE, SIGILL, SIGSEGV};
}

#[cfg(not(unix))]
mod libc_signal {
    pub const SIGSEGV: i32 = 11;
    pub const SIGBUS: i32 = 7;
    pub const SIGILL: i32 = 4;
    pub const SIGFPE: i32 = 8;
    pub const SIGABRT: i32 = 6;
}

#[cfg(unix)]
fn install_handlers() {
    unsafe {
        for &sig in FAULT_SIGNALS {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = handle_fault as usize;
            action.sa_flags = libc::SA_NODEFER;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(sig, &action, std::ptr::null_mut());
        }
    }
}

#[cfg(not(unix))]
fn install_handlers() {
    // No POSIX signal fabric on this target; crashes are not recoverable.
}

#[cfg(unix)]
extern "C" fn handle_fault(sig: libc::c_int) {
    let ctx = context();
    ctx.last_signal.store(sig, Ordering::Relaxed);
    print_diagnostic(sig, ctx.current_location());

    if ctx.is_armed() {
        ctx.armed.store(false, Ordering::Release);
        unsafe { sigjmp::siglongjmp(ctx.jmp_buf.get(), sig) }
    }

    unsafe {
        libc::signal(sig, libc::SIG_DFL);
        libc::raise(sig);
    }
}

/// Formats the crash diagnostic as a standalone function so tests can
/// exercise the exact text without installing a real signal handler.
pub fn format_diagnostic(sig: i32, location: Option<&CrashLocation>) -> String {
    let signal_name = signal_name(sig);
    match location {
        Some(loc) => format!(
            "cruntime: fatal signal {signal_name} ({sig}) while executing compiled code\n  at {}:{} in {}",
            loc.source_file, loc.line, loc.function
        ),
        None => format!("cruntime: fatal signal {signal_name} ({sig})"),
    }
}

fn signal_name(sig: i32) -> &'static str {
    match sig {
        s if s == libc_signal::SIGSEGV => "SIGSEGV",
        s if s == libc_signal::SIGBUS => "SIGBUS",
        s if s == libc_signal::SIGILL => "SIGILL",
        s if s == libc_signal::SIGFPE => "SIGFPE",
        s if s == libc_signal::SIGABRT => "SIGABRT",
        _ => "UNKNOWN",
    }
}

fn print_diagnostic(sig: i32, location: Option<CrashLocation>) {
    eprintln!("{}", format_diagnostic(sig, location.as_ref()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_includes_location_when_present() {
        let loc = CrashLocation {
            source_file: "driver.rs",
            function: "run_entry",
            line: 42,
        };
        let text = format_diagnostic(libc_signal::SIGSEGV, Some(&loc));
        assert!(text.contains("SIGSEGV"));
        assert!(text.contains("driver.rs:42"));
        assert!(text.contains("run_entry"));
    }

    #[test]
    fn diagnostic_without_location_still_names_the_signal() {
        let text = format_diagnostic(libc_signal::SIGFPE, None);
        assert!(text.contains("SIGFPE"));
    }

    #[test]
    fn arm_then_disarm_round_trips_without_a_fault() {
        let ctx = context();
        let loc = CrashLocation {
            source_file: "test.rs",
            function: "harness",
            line: 1,
        };
        let outcome = ctx.arm(loc);
        assert_eq!(outcome, ArmOutcome::Armed);
        assert!(ctx.is_armed());
        ctx.disarm();
        assert!(!ctx.is_armed());
    }
}
