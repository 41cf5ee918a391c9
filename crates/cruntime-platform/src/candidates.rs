//! Extension-smart library lookup.
//!
//! Expressed as a pure function from `(requested-name, detected-os)` to an
//! ordered, finite, deterministic candidate list, independent of the
//! filesystem so it can be unit-tested without touching disk.

use crate::Os;

/// Build the ordered list of paths `open_library` should try for
/// `requested`, given the detected OS. The first attempt is always the
/// name exactly as given; subsequent entries retry with the platform's
/// canonical extension and, where absent, a `lib` prefix.
pub fn library_candidates(requested: &str, os: Os) -> Vec<String> {
    let mut out = vec![requested.to_string()];

    let ext = os.shared_lib_ext();
    let has_canonical_ext = requested.ends_with(&format!(".{ext}"));
    let has_lib_prefix = base_name(requested).starts_with("lib");

    if !has_canonical_ext {
        // Try with the canonical extension appended.
        push_unique(&mut out, format!("{requested}.{ext}"));

        if !has_lib_prefix {
            let (dir, base) = split_dir(requested);
            push_unique(&mut out, join(dir, &format!("lib{base}.{ext}")));
        }
    } else if !has_lib_prefix {
        let (dir, base) = split_dir(requested);
        push_unique(&mut out, join(dir, &format!("lib{base}")));
    }

    // macOS occasionally ships `.so` symlinks alongside `.dylib`; Windows
    // has no equivalent secondary extension, so this only ever adds
    // anything on macOS.
    if os == Os::Macos && !requested.ends_with(".so") {
        let (dir, base) = split_dir(requested);
        push_unique(&mut out, join(dir, &format!("{base}.so")));
    }

    out
}

fn push_unique(list: &mut Vec<String>, candidate: String) {
    if !list.contains(&candidate) {
        list.push(candidate);
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn split_dir(path: &str) -> (&str, &str) {
    match path.rfind(['/', '\\']) {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    }
}

fn join(dir: &str, base: &str) -> String {
    format!("{dir}{base}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_gets_extension_and_prefix_on_linux() {
        let candidates = library_candidates("math", Os::Linux);
        assert_eq!(
            candidates,
            vec!["math", "math.so", "libmath.so"]
        );
    }

    #[test]
    fn already_prefixed_name_skips_prefix_retry() {
        let candidates = library_candidates("libmath", Os::Linux);
        assert_eq!(candidates, vec!["libmath", "libmath.so"]);
    }

    #[test]
    fn already_suffixed_name_skips_extension_retry() {
        let candidates = library_candidates("libmath.so", Os::Linux);
        assert_eq!(candidates, vec!["libmath.so"]);
    }

    #[test]
    fn windows_uses_dll_extension() {
        let candidates = library_candidates("math", Os::Windows);
        assert_eq!(candidates, vec!["math", "math.dll", "libmath.dll"]);
    }

    #[test]
    fn macos_uses_dylib_and_tries_so_fallback() {
        let candidates = library_candidates("math", Os::Macos);
        assert_eq!(
            candidates,
            vec!["math", "math.dylib", "libmath.dylib", "math.so"]
        );
    }

    #[test]
    fn directory_prefix_is_preserved() {
        let candidates = library_candidates("/opt/libs/math", Os::Linux);
        assert_eq!(
            candidates,
            vec![
                "/opt/libs/math",
                "/opt/libs/math.so",
                "/opt/libs/libmath.so",
            ]
        );
    }

    #[test]
    fn list_is_finite_and_deterministic() {
        let a = library_candidates("math", Os::Linux);
        let b = library_candidates("math", Os::Linux);
        assert_eq!(a, b);
        assert!(a.len() <= 4);
    }
}
