//! Environment-variable configuration, read once at process start.

use cruntime_platform::path_list_separator;

const TRACE_VAR: &str = "CRUNTIME_TRACE";
const INCLUDE_PATHS_VAR: &str = "CRUNTIME_INCLUDE_PATHS";
const LIBRARY_PATHS_VAR: &str = "CRUNTIME_LIBRARY_PATHS";
const HOST_LIBS_VAR: &str = "CRUNTIME_HOST_LIBS";

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// `*_TRACE`: any non-empty, non-zero value enables verbose stderr
    /// diagnostics of mode selection and argv marshalling.
    pub trace: bool,
    /// `*_INCLUDE_PATHS`, separator-delimited.
    pub include_paths: Vec<String>,
    /// `*_LIBRARY_PATHS`, separator-delimited.
    pub library_paths: Vec<String>,
    /// `*_HOST_LIBS`: pre-open list admitted to the host-library handle
    /// set at init.
    pub host_libs: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_getter(|key| std::env::var(key).ok())
    }

    /// Testable without mutating the process environment.
    fn from_getter(get: impl Fn(&str) -> Option<String>) -> Self {
        let trace = get(TRACE_VAR)
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        let sep = path_list_separator();
        let include_paths = get(INCLUDE_PATHS_VAR)
            .map(|v| split_path_list(&v, sep))
            .unwrap_or_default();
        let library_paths = get(LIBRARY_PATHS_VAR)
            .map(|v| split_path_list(&v, sep))
            .unwrap_or_default();
        let host_libs = get(HOST_LIBS_VAR)
            .map(|v| split_path_list(&v, sep))
            .unwrap_or_default();

        Self {
            trace,
            include_paths,
            library_paths,
            host_libs,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0"
}

fn split_path_list(value: &str, sep: char) -> Vec<String> {
    value
        .split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_is_off_when_unset() {
        let config = Config::from_getter(|_| None);
        assert!(!config.trace);
    }

    #[test]
    fn trace_is_off_for_zero() {
        let config = Config::from_getter(|key| {
            if key == TRACE_VAR {
                Some("0".to_string())
            } else {
                None
            }
        });
        assert!(!config.trace);
    }

    #[test]
    fn trace_is_on_for_any_other_nonempty_value() {
        let config = Config::from_getter(|key| {
            if key == TRACE_VAR {
                Some("1".to_string())
            } else {
                None
            }
        });
        assert!(config.trace);
    }

    #[test]
    fn path_lists_split_on_the_platform_separator_and_trim() {
        let sep = path_list_separator();
        let joined = format!(" /a {sep}/b{sep} /c ");
        let config = Config::from_getter(|key| {
            if key == INCLUDE_PATHS_VAR {
                Some(joined.clone())
            } else {
                None
            }
        });
        assert_eq!(config.include_paths, vec!["/a", "/b", "/c"]);
    }
}
