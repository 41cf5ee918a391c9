//! Object cache.
//!
//! Key: `(source-path, arch-tag)`. Cache file name is fully derived from
//! the key (`<stem>.<tag>.o`). A cross-arch artifact from another machine
//! is never a hit, since the tag differs.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Machine identifier used as the cache file's tag (`x86_64`, `aarch64`,
/// `armv7l`, ...). Derived from the running architecture, not configurable.
pub fn arch_tag() -> &'static str {
    cruntime_platform::running_arch()
}

/// The on-disk artifact a given source path would read from or write to.
pub fn cache_record_path(source_path: &Path) -> PathBuf {
    let stem = source_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module");
    let dir = source_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{stem}.{}.o", arch_tag()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// No artifact on disk for this source.
    Miss,
    /// Artifact exists and is at least as new as the source (or the
    /// source is absent, e.g. a release-mode distribution).
    Hit,
    /// Artifact exists but is older than the source; must recompile.
    Stale,
}

/// Classifies a cache entry given an artifact path and the source path
/// it was compiled from (`source_path` may not exist on disk).
pub fn check(artifact_path: &Path, source_path: &Path) -> CacheStatus {
    let artifact_mtime = match std::fs::metadata(artifact_path).and_then(|m| m.modified()) {
        Ok(mtime) => mtime,
        Err(_) => return CacheStatus::Miss,
    };

    match std::fs::metadata(source_path).and_then(|m| m.modified()) {
        Err(_) => CacheStatus::Hit,
        Ok(source_mtime) => {
            if artifact_mtime >= source_mtime {
                CacheStatus::Hit
            } else {
                CacheStatus::Stale
            }
        }
    }
}

/// Best-effort cache write. Failures are logged to stderr and treated as
/// non-fatal; a write failure never fails the load itself.
pub fn write_best_effort(artifact_path: &Path, bytes: &[u8]) {
    if let Err(e) = std::fs::write(artifact_path, bytes) {
        eprintln!(
            "cruntime: failed to write object cache {}: {e}",
            artifact_path.display()
        );
    }
}

/// True iff `write_time` (the artifact mtime right after writing) is at
/// or after `source_time` — the postcondition checks after a
/// successful non-cached load.
pub fn is_fresh(write_time: SystemTime, source_time: SystemTime) -> bool {
    write_time >= source_time
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_artifact_is_a_miss() {
        let dir = std::env::temp_dir().join("cruntime_cache_test_miss");
        let _ = std::fs::create_dir_all(&dir);
        let artifact = dir.join("nope.o");
        let _ = std::fs::remove_file(&artifact);
        let source = dir.join("nope.c");
        assert_eq!(check(&artifact, &source), CacheStatus::Miss);
    }

    #[test]
    fn artifact_newer_than_source_is_a_hit() {
        let dir = std::env::temp_dir().join("cruntime_cache_test_hit");
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("a.c");
        let artifact = dir.join(format!("a.{}.o", arch_tag()));

        std::fs::File::create(&source)
            .unwrap()
            .write_all(b"int main(){return 0;}")
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::File::create(&artifact)
            .unwrap()
            .write_all(b"fake-object")
            .unwrap();

        assert_eq!(check(&artifact, &source), CacheStatus::Hit);
    }

    #[test]
    fn artifact_older_than_source_is_stale() {
        let dir = std::env::temp_dir().join("cruntime_cache_test_stale");
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("b.c");
        let artifact = dir.join(format!("b.{}.o", arch_tag()));

        std::fs::File::create(&artifact)
            .unwrap()
            .write_all(b"fake-object")
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::File::create(&source)
            .unwrap()
            .write_all(b"int main(){return 0;}")
            .unwrap();

        assert_eq!(check(&artifact, &source), CacheStatus::Stale);
    }

    #[test]
    fn cache_record_path_uses_stem_and_arch_tag() {
        let path = cache_record_path(Path::new("/tmp/prog.c"));
        assert_eq!(
            path,
            PathBuf::from(format!("/tmp/prog.{}.o", arch_tag()))
        );
    }
}
