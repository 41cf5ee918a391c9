//! Execution driver.
//!
//! Selects a mode from the runtime argument list, marshals the
//! runtime-program argv, and invokes the resolved entry point under the
//! crash-recovery resume point. The REPL mode is selected here but
//! driven interactively by the caller; see [`Mode::Repl`].

use crate::context::RuntimeContext;
use cruntime_codegen::LoaderConfig;
use cruntime_core::crash::{self, ArmOutcome, CrashLocation};
use std::ffi::{c_char, CString};

pub const INLINE_FLAG: &str = "--eval";
pub const REPL_FLAG: &str = "--repl";

#[derive(Debug, Clone)]
pub enum Mode {
    /// Zero arguments, or the sole argument is the REPL flag. The driver
    /// does not run an interactive loop itself — the caller (normally
    /// `cruntime-cli`) owns stdin/stdout and drives a
    /// [`crate::repl::ReplSession`] directly.
    Repl,
    Inline {
        code: String,
        passthrough_args: Vec<String>,
    },
    DirectImport {
        path: String,
        passthrough_args: Vec<String>,
    },
    CompileAndRun {
        source: String,
        config: LoaderConfig,
        passthrough_args: Vec<String>,
    },
}

/// Mode selection, applied to the argument list following the program
/// name. Textually strict: flags are matched verbatim and never
/// second-guessed against a more permissive grammar.
pub fn select_mode(args: &[String]) -> Mode {
    if args.is_empty() || (args.len() == 1 && args[0] == REPL_FLAG) {
        return Mode::Repl;
    }

    if args[0] == INLINE_FLAG {
        let code = args.get(1).cloned().unwrap_or_default();
        let passthrough_args = runtime_argv(args, 1, "(inline)");
        return Mode::Inline {
            code,
            passthrough_args,
        };
    }

    if !args[0].starts_with('-') {
        let path = args[0].clone();
        let passthrough_args = runtime_argv(args, 0, &path);
        return Mode::DirectImport {
            path,
            passthrough_args,
        };
    }

    parse_compile_and_run(args)
}

fn parse_compile_and_run(args: &[String]) -> Mode {
    let mut config = LoaderConfig::default();
    let mut source: Option<(usize, String)> = None;
    let mut i = 0;

    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-I" => {
                if let Some(v) = args.get(i + 1) {
                    config.include_paths.push(v.clone());
                    i += 2;
                    continue;
                }
                i += 1;
            }
            "-L" => {
                if let Some(v) = args.get(i + 1) {
                    config.library_paths.push(v.clone());
                    i += 2;
                    continue;
                }
                i += 1;
            }
            "-l" => {
                if let Some(v) = args.get(i + 1) {
                    config.libraries.push(v.clone());
                    i += 2;
                    continue;
                }
                i += 1;
            }
            "--" => break,
            _ if arg.starts_with('-') => {
                i += 1;
            }
            _ => {
                source = Some((i, arg.to_string()));
                break;
            }
        }
    }

    let (source_index, source) = source.unwrap_or((args.len(), String::new()));
    let passthrough_args = runtime_argv(args, source_index, &source);
    Mode::CompileAndRun {
        source,
        config,
        passthrough_args,
    }
}

/// Runtime-argv construction: if `--` appears anywhere in `args`,
/// everything after it is the user-program argv (the separator itself
/// elided); otherwise everything after `anchor_index` is. A program-name
/// slot is always inserted at position 0.
fn runtime_argv(args: &[String], anchor_index: usize, program_name: &str) -> Vec<String> {
    let mut argv = vec![program_name.to_string()];
    if let Some(dd) = args.iter().position(|a| a == "--") {
        argv.extend(args[dd + 1..].iter().cloned());
    } else if anchor_index + 1 < args.len() {
        argv.extend(args[anchor_index + 1..].iter().cloned());
    }
    argv
}

type MainArgcArgv = extern "C" fn(i32, *const *const c_char) -> i32;
type MainArgcArgvEnvp = extern "C" fn(i32, *const *const c_char, *const *const c_char) -> i32;

/// Runs every mode except [`Mode::Repl`], which the caller drives itself.
/// Returns `None` for `Repl` as a signal to do so.
pub fn run(ctx: &RuntimeContext, mode: &Mode) -> Option<i32> {
    if ctx.trace {
        eprintln!("cruntime: trace: selected mode {}", mode_name(mode));
    }
    match mode {
        Mode::Repl => None,
        Mode::Inline {
            code,
            passthrough_args,
        } => Some(run_inline(ctx, code, passthrough_args)),
        Mode::DirectImport {
            path,
            passthrough_args,
        } => Some(run_direct_import(ctx, path, passthrough_args)),
        Mode::CompileAndRun {
            source,
            config,
            passthrough_args,
        } => Some(run_compile_and_run(ctx, source, config, passthrough_args)),
    }
}

fn mode_name(mode: &Mode) -> &'static str {
    match mode {
        Mode::Repl => "repl",
        Mode::Inline { .. } => "inline",
        Mode::DirectImport { .. } => "direct-import",
        Mode::CompileAndRun { .. } => "compile-and-run",
    }
}

fn run_inline(ctx: &RuntimeContext, code: &str, argv: &[String]) -> i32 {
    let resolver = ctx.resolver();
    let module = match cruntime_codegen::load_source(code, &ctx.prologue, &ctx.loader_config, &resolver) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("cruntime: {e}");
            return 1;
        }
    };
    invoke_main_argc_argv(&module, argv)
}

fn run_direct_import(ctx: &RuntimeContext, path: &str, argv: &[String]) -> i32 {
    let resolver = ctx.resolver();
    let module = match cruntime_codegen::load(
        std::path::Path::new(path),
        &ctx.prologue,
        &ctx.loader_config,
        &resolver,
    ) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("cruntime: {e}");
            return 1;
        }
    };

    let entry: MainArgcArgvEnvp = match unsafe { module.get_fn("main") } {
        Ok(f) => f,
        Err(e) => {
            eprintln!("cruntime: {e}");
            return 1;
        }
    };

    let (_argv_c, argv_ptrs) = build_c_string_array(argv);
    let envp_vars: Vec<String> = std::env::vars().map(|(k, v)| format!("{k}={v}")).collect();
    let (_envp_c, envp_ptrs) = build_c_string_array(&envp_vars);
    let argc = argv.len() as i32;

    guarded_call("run_direct_import", || {
        entry(argc, argv_ptrs.as_ptr(), envp_ptrs.as_ptr())
    })
}

fn run_compile_and_run(
    ctx: &RuntimeContext,
    source: &str,
    extra_config: &LoaderConfig,
    argv: &[String],
) -> i32 {
    let config = merge_loader_config(&ctx.loader_config, extra_config);
    let resolver = ctx.resolver();
    let module = match cruntime_codegen::load(std::path::Path::new(source), &ctx.prologue, &config, &resolver) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("cruntime: {e}");
            return 1;
        }
    };
    invoke_main_argc_argv(&module, argv)
}

fn invoke_main_argc_argv(module: &cruntime_codegen::ModuleHandle, argv: &[String]) -> i32 {
    let entry: MainArgcArgv = match unsafe { module.get_fn("main") } {
        Ok(f) => f,
        Err(e) => {
            eprintln!("cruntime: {e}");
            return 1;
        }
    };
    let (_argv_c, argv_ptrs) = build_c_string_array(argv);
    let argc = argv.len() as i32;
    guarded_call("invoke_main_argc_argv", || entry(argc, argv_ptrs.as_ptr()))
}

fn merge_loader_config(base: &LoaderConfig, extra: &LoaderConfig) -> LoaderConfig {
    let mut merged = base.clone();
    merged.include_paths.extend(extra.include_paths.iter().cloned());
    merged.library_paths.extend(extra.library_paths.iter().cloned());
    merged.libraries.extend(extra.libraries.iter().cloned());
    merged
}

/// Builds a null-terminated array of `char*` from Rust strings. The
/// `Vec<CString>` must outlive the returned pointer array.
fn build_c_string_array(values: &[String]) -> (Vec<CString>, Vec<*const c_char>) {
    let c_strings: Vec<CString> = values
        .iter()
        .map(|s| CString::new(s.as_str()).unwrap_or_else(|_| CString::new("").unwrap()))
        .collect();
    let mut ptrs: Vec<*const c_char> = c_strings.iter().map(|s| s.as_ptr()).collect();
    ptrs.push(std::ptr::null());
    (c_strings, ptrs)
}

/// Guarded execution: arm the resume point immediately before
/// calling into compiled code, disarm immediately after a normal return.
/// A resumed fault reports "program crashed but recovered" and exit code
/// 1; an unarmed fault is handled entirely inside the signal handler
/// and never returns here.
fn guarded_call(function: &'static str, call: impl FnOnce() -> i32) -> i32 {
    let location = CrashLocation {
        source_file: "cruntime-runtime/src/driver.rs",
        function,
        line: line!(),
    };
    match crash::context().arm(location) {
        ArmOutcome::Armed => {
            let result = call();
            crash::context().disarm();
            result
        }
        ArmOutcome::Resumed(_signum) => {
            eprintln!("cruntime: program crashed but recovered");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_args_selects_repl() {
        assert!(matches!(select_mode(&[]), Mode::Repl));
    }

    #[test]
    fn sole_repl_flag_selects_repl() {
        let args = vec![REPL_FLAG.to_string()];
        assert!(matches!(select_mode(&args), Mode::Repl));
    }

    #[test]
    fn inline_flag_reads_the_next_argument_as_code() {
        let args = vec![INLINE_FLAG.to_string(), "int main(){return 0;}".to_string()];
        match select_mode(&args) {
            Mode::Inline { code, passthrough_args } => {
                assert_eq!(code, "int main(){return 0;}");
                assert_eq!(passthrough_args, vec!["(inline)".to_string()]);
            }
            _ => panic!("expected inline mode"),
        }
    }

    #[test]
    fn bare_path_selects_direct_import_with_trailing_args() {
        let args = vec!["prog.c".to_string(), "x".to_string(), "y".to_string()];
        match select_mode(&args) {
            Mode::DirectImport { path, passthrough_args } => {
                assert_eq!(path, "prog.c");
                assert_eq!(passthrough_args, vec!["prog.c", "x", "y"]);
            }
            _ => panic!("expected direct-import mode"),
        }
    }

    #[test]
    fn dash_flags_select_compile_and_run_and_collect_paths() {
        let args = vec![
            "-I".to_string(),
            "/inc".to_string(),
            "-l".to_string(),
            "m".to_string(),
            "sum.c".to_string(),
            "2".to_string(),
            "3".to_string(),
        ];
        match select_mode(&args) {
            Mode::CompileAndRun {
                source,
                config,
                passthrough_args,
            } => {
                assert_eq!(source, "sum.c");
                assert_eq!(config.include_paths, vec!["/inc".to_string()]);
                assert_eq!(config.libraries, vec!["m".to_string()]);
                assert_eq!(passthrough_args, vec!["sum.c", "2", "3"]);
            }
            _ => panic!("expected compile-and-run mode"),
        }
    }

    #[test]
    fn double_dash_separator_is_elided_from_runtime_argv() {
        let args = vec!["prog.c".to_string(), "--".to_string(), "a".to_string(), "b".to_string()];
        match select_mode(&args) {
            Mode::DirectImport { passthrough_args, .. } => {
                assert_eq!(passthrough_args, vec!["prog.c", "a", "b"]);
            }
            _ => panic!("expected direct-import mode"),
        }
    }

    #[test]
    fn inline_mode_with_no_trailing_args_has_only_the_program_name() {
        let args = vec![INLINE_FLAG.to_string(), "int main(){return 0;}".to_string()];
        match select_mode(&args) {
            Mode::Inline { passthrough_args, .. } => {
                assert_eq!(passthrough_args, vec!["(inline)".to_string()]);
            }
            _ => panic!("expected inline mode"),
        }
    }

    #[test]
    fn built_c_string_array_is_null_terminated() {
        let (_owned, ptrs) = build_c_string_array(&["a".to_string(), "b".to_string()]);
        assert_eq!(ptrs.len(), 3);
        assert!(ptrs.last().unwrap().is_null());
    }
}
