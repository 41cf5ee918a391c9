//! End-to-end scenarios that drive the real code-generator backend
//! rather than a mock.

use cruntime_runtime::config::Config;
use cruntime_runtime::context::RuntimeContext;
use cruntime_runtime::driver::{self, Mode};

fn fresh_context() -> RuntimeContext {
    RuntimeContext::new(&Config::default()).expect("runtime context should initialize")
}

/// Scenario 1: inline code reading runtime argv.
#[test]
fn inline_main_receives_runtime_argv() {
    let ctx = fresh_context();
    let mode = Mode::Inline {
        code: "int main(int argc, char **argv) { return argc; }".to_string(),
        passthrough_args: vec!["(inline)".into(), "x".into(), "y".into(), "z".into()],
    };
    let exit_code = driver::run(&ctx, &mode).expect("inline mode always returns a code");
    assert_eq!(exit_code, 4);
}

/// Scenario 2: a source file is compiled, cached, and produces the
/// same output on a second, cache-hitting invocation.
#[test]
fn source_file_round_trips_through_the_object_cache() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("sum.c");
    std::fs::write(
        &source_path,
        "int main(int c, char **v) { return c; }",
    )
    .unwrap();

    let ctx = fresh_context();
    let mode = Mode::CompileAndRun {
        source: source_path.to_str().unwrap().to_string(),
        config: Default::default(),
        passthrough_args: vec!["sum.c".into(), "2".into(), "3".into(), "4".into()],
    };
    let first = driver::run(&ctx, &mode).unwrap();
    assert_eq!(first, 4);

    let artifact_path = dir.path().join(format!("sum.{}.o", cruntime_codegen::cache::arch_tag()));
    assert!(
        artifact_path.exists(),
        "a successful compile should have written an object cache artifact"
    );
    assert_eq!(
        cruntime_codegen::loader::cache_status(&source_path),
        cruntime_codegen::cache::CacheStatus::Hit
    );

    let second = driver::run(&ctx, &mode).unwrap();
    assert_eq!(second, 4);
}

/// Scenario 4: a deliberate null dereference is recovered by the
/// crash-recovery fabric rather than killing the test process.
#[test]
fn null_dereference_is_recovered_with_exit_code_one() {
    let ctx = fresh_context();
    let mode = Mode::Inline {
        code: "int main() { int *p = 0; *p = 1; return 0; }".to_string(),
        passthrough_args: vec!["(inline)".into()],
    };
    let exit_code = driver::run(&ctx, &mode).expect("inline mode always returns a code");
    assert_eq!(exit_code, 1);
}

/// Scenario 6: referencing an unknown symbol is a load-time failure,
/// not a crash, and produces no cache artifact.
#[test]
fn unknown_symbol_reference_fails_to_load() {
    let ctx = fresh_context();
    let mode = Mode::Inline {
        code: "int main() { nonexistent_xyz(); return 0; }".to_string(),
        passthrough_args: vec!["(inline)".into()],
    };
    let exit_code = driver::run(&ctx, &mode).expect("inline mode always returns a code");
    assert_eq!(exit_code, 1);
}

/// Scenario 5: the Import API lets a loaded module pull in a second
/// module and resolve a symbol from it.
#[test]
fn import_api_loads_a_second_module_and_resolves_its_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let plug_path = dir.path().join("plug.c");
    std::fs::write(&plug_path, "int hello_value() { return 42; }").unwrap();

    let main_path = dir.path().join("main.c");
    std::fs::write(
        &main_path,
        format!(
            "int main() {{ __crt_module_t m = __import(\"{}\"); \
             int (*f)() = (int (*)()) __sym(m, \"hello_value\"); \
             int v = f(); __import_free(m); return v; }}",
            plug_path.to_str().unwrap()
        ),
    )
    .unwrap();

    let ctx = fresh_context();
    let mode = Mode::CompileAndRun {
        source: main_path.to_str().unwrap().to_string(),
        config: Default::default(),
        passthrough_args: vec!["main.c".into()],
    };
    let exit_code = driver::run(&ctx, &mode).unwrap();
    assert_eq!(exit_code, 42);
}

/// Scenario 7: the Mini FFI resolves a host-library function by name and
/// calls it through a runtime-typed call descriptor, rather than through
/// an ordinary compiled call.
#[test]
fn mini_ffi_resolves_and_calls_a_host_function_by_name() {
    let ctx = fresh_context();
    let code = "\
        int main() {
            void *entry = __ffi_resolve(\"abs\");
            if (!entry) return 2;
            int arg_types[1];
            arg_types[0] = 0;
            long args[1];
            args[0] = -9;
            __crt_cif_t cif = __ffi_prepare_cif(0, 0, arg_types, 1);
            if (!cif) return 3;
            long result = __ffi_call(cif, entry, args, 1);
            __ffi_free_cif(cif);
            return (int) result;
        }";
    let mode = Mode::Inline {
        code: code.to_string(),
        passthrough_args: vec!["(inline)".into()],
    };
    let exit_code = driver::run(&ctx, &mode).expect("inline mode always returns a code");
    assert_eq!(exit_code, 9);
}
