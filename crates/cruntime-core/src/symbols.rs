//! Symbol table & resolver.
//!
//! Presents one operation to the code generator: `resolve(name) ->
//! address?`. Search order on a first miss: built-in table, host
//! libraries (in registration order), then a single caller-provided
//! resolver hook. A built-in match always wins, even if a host library
//! also exports the name.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// An address is represented as a `usize` internally so the table stays
/// `Send + Sync`; callers cast back to a function pointer at the call
/// site, where the real signature is known.
pub type Address = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolSource {
    Builtin,
    HostLibrary,
    GeneratedModule,
    Trampoline,
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub name: String,
    pub address: Address,
    pub source: SymbolSource,
    pub hash: u32,
}

/// A single caller-provided fallback used after the built-in table and
/// host libraries have both missed.
pub trait ResolverHook: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Address>;
}

impl<F> ResolverHook for F
where
    F: Fn(&str) -> Option<Address> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Option<Address> {
        self(name)
    }
}

/// 32-bit FNV-1a hash, used for the `hash` field of [`SymbolEntry`] and as
/// a cheap pre-check before a full string comparison on hot lookup paths.
pub fn hash32(name: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for byte in name.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

struct Inner {
    // Append-only: entries are never removed within a session, only added.
    entries: FxHashMap<String, SymbolEntry>,
    host_libraries: Vec<Arc<dyn Fn(&str) -> Option<Address> + Send + Sync>>,
    resolver_hook: Option<Arc<dyn ResolverHook>>,
}

/// Per-code-generator-instance symbol table.
pub struct SymbolTable {
    inner: Mutex<Inner>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: FxHashMap::default(),
                host_libraries: Vec::new(),
                resolver_hook: None,
            }),
        }
    }

    /// Register a name in the built-in table. A name that appears here
    /// resolves to this address even if a host library later also exports
    /// it.
    pub fn register_builtin(&self, name: &str, address: Address) {
        let mut inner = self.inner.lock();
        inner.entries.insert(
            name.to_string(),
            SymbolEntry {
                name: name.to_string(),
                address,
                source: SymbolSource::Builtin,
                hash: hash32(name),
            },
        );
    }

    /// Add a host-library probe. Probed in registration order on a miss.
    pub fn add_host_library<F>(&self, probe: F)
    where
        F: Fn(&str) -> Option<Address> + Send + Sync + 'static,
    {
        self.inner.lock().host_libraries.push(Arc::new(probe));
    }

    /// Install the single in-process resolver hook.
    pub fn set_resolver_hook(&self, hook: Arc<dyn ResolverHook>) {
        self.inner.lock().resolver_hook = Some(hook);
    }

    /// Resolve `name`, caching the result in the built-in-equivalent
    /// `entries` map so repeated lookups within the table are O(1) after
    /// the first miss.
    pub fn resolve(&self, name: &str) -> Option<Address> {
        {
            let inner = self.inner.lock();
            if let Some(entry) = inner.entries.get(name) {
                return Some(entry.address);
            }
        }

        // Step 2: host libraries, in registration order.
        let (host_libs, hook) = {
            let inner = self.inner.lock();
            (inner.host_libraries.clone(), inner.resolver_hook.clone())
        };
        for probe in &host_libs {
            if let Some(addr) = probe(name) {
                self.cache_resolved(name, addr, SymbolSource::HostLibrary);
                return Some(addr);
            }
        }

        // Step 3: the in-process resolver hook.
        if let Some(hook) = hook {
            if let Some(addr) = hook.resolve(name) {
                self.cache_resolved(name, addr, SymbolSource::GeneratedModule);
                return Some(addr);
            }
        }

        None
    }

    fn cache_resolved(&self, name: &str, address: Address, source: SymbolSource) {
        let mut inner = self.inner.lock();
        inner.entries.entry(name.to_string()).or_insert(SymbolEntry {
            name: name.to_string(),
            address,
            source,
            hash: hash32(name),
        });
    }

    /// True iff `name` is present as a built-in row specifically (used by
    /// the PLT resolver stub to decide whether a lazy entry is even
    /// necessary for a given name).
    pub fn is_builtin(&self, name: &str) -> bool {
        self.inner
            .lock()
            .entries
            .get(name)
            .map(|e| e.source == SymbolSource::Builtin)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_wins_over_host_library() {
        let table = SymbolTable::new();
        table.register_builtin("puts", 0x1000);
        table.add_host_library(|name| if name == "puts" { Some(0x2000) } else { None });

        assert_eq!(table.resolve("puts"), Some(0x1000));
    }

    #[test]
    fn host_libraries_probed_in_order() {
        let table = SymbolTable::new();
        table.add_host_library(|name| if name == "a" { Some(1) } else { None });
        table.add_host_library(|name| if name == "a" { Some(2) } else { None });

        // First registered library wins.
        assert_eq!(table.resolve("a"), Some(1));
    }

    #[test]
    fn resolver_hook_used_only_on_full_miss() {
        let table = SymbolTable::new();
        table.set_resolver_hook(Arc::new(|name: &str| {
            if name == "hook_only" {
                Some(0x3000)
            } else {
                None
            }
        }));
        assert_eq!(table.resolve("hook_only"), Some(0x3000));
        assert_eq!(table.resolve("nowhere"), None);
    }

    #[test]
    fn unresolved_name_caches_nothing() {
        let table = SymbolTable::new();
        assert_eq!(table.resolve("missing"), None);
        assert!(!table.is_builtin("missing"));
    }

    #[test]
    fn hash32_is_stable() {
        assert_eq!(hash32("main"), hash32("main"));
        assert_ne!(hash32("main"), hash32("mainx"));
    }
}
