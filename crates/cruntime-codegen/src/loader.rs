//! Module loader.
//!
//! One operation: `load(path) -> module-handle?`. Every call produces
//! either a fully-relocated handle or nothing; partial handles never
//! escape a failed call.

use crate::backend::CodegenState;
use crate::cache::{self, CacheStatus};
use crate::error::CodegenError;
use crate::module::ModuleHandle;
use cruntime_platform::Os;
use std::path::Path;

/// The 96 KiB ceiling on combined prologue + user source.
pub const MAX_COMPILE_UNIT_BYTES: usize = 96 * 1024;

/// Configuration applied to every fresh code-generator state. Include
/// and library paths come from CLI flags and `*_INCLUDE_PATHS`/
/// `*_LIBRARY_PATHS`; `identifying_macro` and `host_libraries` are
/// fixed per process.
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    pub include_paths: Vec<String>,
    pub library_paths: Vec<String>,
    pub libraries: Vec<String>,
    pub identifying_macro: String,
}

/// Resolves a name against the built-in table, host libraries, and any
/// installed resolver hook — passed in from `cruntime-runtime` so this
/// crate does not need to depend on it.
pub trait SymbolSource {
    fn resolve(&self, name: &str) -> Option<usize>;
}

impl<F: Fn(&str) -> Option<usize>> SymbolSource for F {
    fn resolve(&self, name: &str) -> Option<usize> {
        self(name)
    }
}

/// Load `path`, producing a relocated module handle.
///
/// `prologue` is the API declaration banner (owned by `cruntime-runtime`)
/// prepended ahead of the user's source. `symbols` is consulted for
/// every name left undefined after compilation.
pub fn load(
    path: &Path,
    prologue: &str,
    config: &LoaderConfig,
    symbols: &dyn SymbolSource,
) -> Result<ModuleHandle, CodegenError> {
    let arch_tag = cruntime_platform::running_arch();
    let is_precompiled_object = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(&format!(".{arch_tag}.o")))
        .unwrap_or(false);

    if is_precompiled_object {
        let mut state = new_configured_state(config, OutputMode::Memory)?;
        let path_str = path
            .to_str()
            .ok_or_else(|| CodegenError::Init(format!("non-UTF8 path: {path:?}")))?;
        state.add_file(path_str)?;
        state.relocate(|name| symbols.resolve(name))?;
        return Ok(ModuleHandle::new(state, Some(path.to_path_buf())));
    }

    if !path.exists() {
        return Err(CodegenError::Init(format!(
            "source file not found: {}",
            path.display()
        )));
    }

    let artifact_path = cache::cache_record_path(path);
    if cache::check(&artifact_path, path) == CacheStatus::Hit {
        if let Some(artifact_str) = artifact_path.to_str() {
            let mut state = new_configured_state(config, OutputMode::Memory)?;
            state.add_file(artifact_str)?;
            state.relocate(|name| symbols.resolve(name))?;
            return Ok(ModuleHandle::new(state, Some(path.to_path_buf())));
        }
    }

    let source = std::fs::read_to_string(path)
        .map_err(|e| CodegenError::Init(format!("failed to read {}: {e}", path.display())))?;

    let combined = format!("{prologue}{source}");
    if combined.len() > MAX_COMPILE_UNIT_BYTES {
        return Err(CodegenError::Compile(format!(
            "combined source ({} bytes) exceeds the {} byte compile-unit ceiling",
            combined.len(),
            MAX_COMPILE_UNIT_BYTES
        )));
    }

    let mut state = new_configured_state(config, OutputMode::Memory)?;
    state.compile_string(&combined)?;
    state.relocate(|name| symbols.resolve(name))?;

    // The cache artifact is only written once the module has fully
    // relocated: a relocation failure (e.g. an unresolved symbol) must
    // leave no artifact behind for a later load to pick up.
    write_cache_best_effort(config, &combined, &artifact_path);

    Ok(ModuleHandle::new(state, Some(path.to_path_buf())))
}

/// Compile and relocate an in-memory compilation unit with no backing
/// source file and no cache artifact — used by inline `--eval` and by
/// the REPL, both of which hand the loader a unit that was
/// already assembled in memory rather than read from disk.
pub fn load_source(
    source: &str,
    prologue: &str,
    config: &LoaderConfig,
    symbols: &dyn SymbolSource,
) -> Result<ModuleHandle, CodegenError> {
    let combined = format!("{prologue}{source}");
    if combined.len() > MAX_COMPILE_UNIT_BYTES {
        return Err(CodegenError::Compile(format!(
            "combined source ({} bytes) exceeds the {} byte compile-unit ceiling",
            combined.len(),
            MAX_COMPILE_UNIT_BYTES
        )));
    }

    let mut state = new_configured_state(config, OutputMode::Memory)?;
    state.compile_string(&combined)?;
    state.relocate(|name| symbols.resolve(name))?;

    Ok(ModuleHandle::new(state, None))
}

/// Which libtcc output mode a freshly-configured state should use.
/// [`CodegenState::new`] and [`CodegenState::new_for_object_output`] are
/// mutually exclusive: a state committed to in-memory execution cannot
/// also emit an object file, so the cache write path builds its own
/// state from this same configuration.
#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Memory,
    Object,
}

fn new_configured_state(config: &LoaderConfig, output_mode: OutputMode) -> Result<CodegenState, CodegenError> {
    let mut state = match output_mode {
        OutputMode::Memory => CodegenState::new()?,
        OutputMode::Object => CodegenState::new_for_object_output()?,
    };

    // Disable host stdlib/headers by default; callers that
    // need them add their own include paths explicitly.
    state.set_options("-nostdinc -nostdlib")?;

    let macro_name = if config.identifying_macro.is_empty() {
        "__CRUNTIME__"
    } else {
        &config.identifying_macro
    };
    state.define_symbol(macro_name, "1")?;
    state.define_symbol(running_os().family_macro(), "1")?;

    for path in &config.include_paths {
        state.add_include_path(path)?;
    }
    for path in &config.library_paths {
        state.add_library_path(path)?;
    }
    for lib in &config.libraries {
        state.add_library(lib)?;
    }

    Ok(state)
}

fn running_os() -> Os {
    cruntime_platform::running_os()
}

/// Recompiles `combined` into a fresh object-output state and writes it
/// to `artifact_path`. Failures at any step are logged to stderr and
/// swallowed: the in-memory module this accompanies already relocated
/// successfully, and a cache-write problem must never fail the load
/// that triggered it.
fn write_cache_best_effort(config: &LoaderConfig, combined: &str, artifact_path: &Path) {
    let Some(path_str) = artifact_path.to_str() else {
        return;
    };

    let mut state = match new_configured_state(config, OutputMode::Object) {
        Ok(state) => state,
        Err(e) => {
            eprintln!(
                "cruntime: object cache write skipped for {}: {e}",
                artifact_path.display()
            );
            return;
        }
    };

    if let Err(e) = state.compile_string(combined) {
        eprintln!(
            "cruntime: object cache write skipped for {}: {e}",
            artifact_path.display()
        );
        return;
    }

    if let Err(e) = state.output_file(path_str) {
        eprintln!(
            "cruntime: object cache write failed for {}: {e}",
            artifact_path.display()
        );
    }
}

/// Whether `artifact` is presently a valid cache hit for `source`.
/// Exposed for the execution driver to decide whether a recompile is
/// needed before calling [`load`].
pub fn cache_status(source: &Path) -> CacheStatus {
    let artifact = cache::cache_record_path(source);
    cache::check(&artifact, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_source_at_the_ceiling_is_accepted_one_byte_over_is_not() {
        let prologue = "";
        let at_ceiling = "x".repeat(MAX_COMPILE_UNIT_BYTES);
        assert!(format!("{prologue}{at_ceiling}").len() <= MAX_COMPILE_UNIT_BYTES);

        let over_ceiling = "x".repeat(MAX_COMPILE_UNIT_BYTES + 1);
        assert!(format!("{prologue}{over_ceiling}").len() > MAX_COMPILE_UNIT_BYTES);
    }

    #[test]
    fn missing_source_reports_a_descriptive_error() {
        let path = Path::new("/nonexistent/cruntime-loader-test.c");
        let config = LoaderConfig::default();
        let symbols: fn(&str) -> Option<usize> = |_| None;
        let result = load(path, "", &config, &symbols);
        assert!(result.is_err());
    }

    #[test]
    fn a_successful_load_writes_an_object_cache_artifact_a_failed_one_does_not() {
        let dir = std::env::temp_dir().join("cruntime_loader_cache_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let config = LoaderConfig::default();
        let symbols: fn(&str) -> Option<usize> = |_| None;

        let good_path = dir.join("good.c");
        std::fs::write(&good_path, "int main() { return 0; }").unwrap();
        assert!(load(&good_path, "", &config, &symbols).is_ok());
        assert!(cache::cache_record_path(&good_path).exists());

        let bad_path = dir.join("bad.c");
        std::fs::write(&bad_path, "int main() { totally_unresolved_symbol(); return 0; }").unwrap();
        assert!(load(&bad_path, "", &config, &symbols).is_err());
        assert!(!cache::cache_record_path(&bad_path).exists());
    }

    #[test]
    fn a_second_load_against_an_unchanged_source_is_a_cache_hit() {
        let dir = std::env::temp_dir().join("cruntime_loader_cache_hit_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let config = LoaderConfig::default();
        let symbols: fn(&str) -> Option<usize> = |_| None;

        let path = dir.join("once.c");
        std::fs::write(&path, "int main() { return 5; }").unwrap();
        assert!(load(&path, "", &config, &symbols).is_ok());
        assert_eq!(cache_status(&path), CacheStatus::Hit);

        // Loading again should still succeed by reading the cached
        // object rather than recompiling the source.
        let handle = load(&path, "", &config, &symbols).unwrap();
        let entry: extern "C" fn() -> i32 = unsafe { handle.get_fn("main").unwrap() };
        assert_eq!(entry(), 5);
    }
}
