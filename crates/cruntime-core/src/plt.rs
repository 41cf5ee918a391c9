//! Lazy PLT-style resolution.
//!
//! State transitions are monotone forward
//! (`unresolved -> resolving -> resolved`) and never go backward.
//! `resolving` is held for exactly the duration of one resolution attempt
//! and guards against concurrent first-callers spawned from user threads.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PltState {
    Unresolved = 0,
    Resolving = 1,
    Resolved = 2,
}

impl PltState {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => PltState::Unresolved,
            1 => PltState::Resolving,
            _ => PltState::Resolved,
        }
    }
}

/// A single lazily-resolved jump slot.
pub struct PltEntry {
    pub name: String,
    state: AtomicU32,
    resolved_address: AtomicUsize,
    call_count: AtomicU32,
}

impl PltEntry {
    fn new(name: String) -> Self {
        Self {
            name,
            state: AtomicU32::new(PltState::Unresolved as u32),
            resolved_address: AtomicUsize::new(0),
            call_count: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> PltState {
        PltState::from_u32(self.state.load(Ordering::Acquire))
    }

    pub fn resolved_address(&self) -> Option<usize> {
        if self.state() == PltState::Resolved {
            Some(self.resolved_address.load(Ordering::Acquire))
        } else {
            None
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Attempt to become the single resolver for this entry. Returns
    /// `true` for exactly one concurrent caller; losers spin-wait on
    /// [`PltEntry::wait_for_resolution`] instead of resolving themselves.
    fn try_begin_resolving(&self) -> bool {
        self.state
            .compare_exchange(
                PltState::Unresolved as u32,
                PltState::Resolving as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn publish_resolved(&self, address: usize) {
        self.resolved_address.store(address, Ordering::Release);
        self.state.store(PltState::Resolved as u32, Ordering::Release);
    }

    /// A resolution attempt failed: drop back to `unresolved` so a later
    /// call can retry, and bump the failure counter — a call that sees
    /// this state returns a zero function pointer rather than blocking.
    fn mark_failed(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.state.store(PltState::Unresolved as u32, Ordering::Release);
    }

    /// Cooperative spin-wait for a resolution in progress by another
    /// caller. Returns the resolved address, or `None` if the winner's
    /// attempt ultimately failed and the entry fell back to `unresolved`.
    fn wait_for_resolution(&self) -> Option<usize> {
        loop {
            match self.state() {
                PltState::Resolved => return self.resolved_address(),
                PltState::Unresolved => return None,
                PltState::Resolving => std::thread::yield_now(),
            }
        }
    }

    /// Run the resolver stub algorithm, calling `resolve` for the
    /// built-in-table and host-library search steps. Returns the
    /// resolved address, or `None` (a zero function pointer) on failure.
    pub fn resolve_once(&self, resolve: impl FnOnce(&str) -> Option<usize>) -> Option<usize> {
        match self.state() {
            PltState::Resolved => return self.resolved_address(),
            PltState::Resolving => return self.wait_for_resolution(),
            PltState::Unresolved => {}
        }

        if !self.try_begin_resolving() {
            // Lost the race after all; fall back to waiting on the winner.
            return self.wait_for_resolution();
        }

        match resolve(&self.name) {
            Some(addr) => {
                self.publish_resolved(addr);
                Some(addr)
            }
            None => {
                self.mark_failed();
                None
            }
        }
    }
}

/// Default PLT capacity. Not specified numerically by spec.md; chosen to
/// comfortably exceed any realistic C program's import table while still
/// bounding memory use of the ordered entry vector.
pub const DEFAULT_PLT_CAPACITY: usize = 4096;

/// Ordered sequence of PLT entries, addressable by index.
pub struct PltTable {
    entries: RwLock<Vec<std::sync::Arc<PltEntry>>>,
    capacity: usize,
}

impl PltTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            capacity,
        }
    }

    /// Append a new PLT entry for `name`. Fails with no partial entry
    /// appended once `capacity` is reached.
    pub fn add_symbol(&self, name: &str) -> Result<usize, PltCapacityError> {
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            return Err(PltCapacityError);
        }
        let index = entries.len();
        entries.push(std::sync::Arc::new(PltEntry::new(name.to_string())));
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<std::sync::Arc<PltEntry>> {
        self.entries.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PltTable {
    fn default() -> Self {
        Self::new(DEFAULT_PLT_CAPACITY)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("PLT table is at capacity")]
pub struct PltCapacityError;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Arc;

    #[test]
    fn states_progress_monotonically() {
        let entry = PltEntry::new("foo".into());
        assert_eq!(entry.state(), PltState::Unresolved);
        let addr = entry.resolve_once(|_| Some(0xdead));
        assert_eq!(addr, Some(0xdead));
        assert_eq!(entry.state(), PltState::Resolved);
        // Resolving again is a no-op read of the cached address.
        assert_eq!(entry.resolve_once(|_| Some(0xbeef)), Some(0xdead));
    }

    #[test]
    fn failed_resolution_returns_to_unresolved_and_increments_counter() {
        let entry = PltEntry::new("missing".into());
        assert_eq!(entry.resolve_once(|_| None), None);
        assert_eq!(entry.state(), PltState::Unresolved);
        assert_eq!(entry.call_count(), 1);
    }

    #[test]
    fn concurrent_first_callers_serialize_on_resolving() {
        let entry = Arc::new(PltEntry::new("shared".into()));
        let calls = Arc::new(StdAtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let entry = entry.clone();
            let calls = calls.clone();
            handles.push(std::thread::spawn(move || {
                entry.resolve_once(|_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    Some(0x1234)
                })
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.join().unwrap());
        }

        assert!(results.iter().all(|r| *r == Some(0x1234)));
        // Exactly one caller performed the actual resolution.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn table_rejects_once_at_capacity() {
        let table = PltTable::new(2);
        assert!(table.add_symbol("a").is_ok());
        assert!(table.add_symbol("b").is_ok());
        assert!(table.add_symbol("c").is_err());
        assert_eq!(table.len(), 2);
    }
}
