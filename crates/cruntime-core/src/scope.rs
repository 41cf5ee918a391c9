//! Scoped-resource fabric.
//!
//! Wraps a resource that must be released exactly once — a code-generator
//! state, a compile-time argv array, an enhanced source buffer — with
//! idempotent release on drop and support for nesting (an inner scope's
//! release never touches an outer scope's resource).

/// A single scoped resource. `release` runs at most once, whether
/// triggered explicitly via [`Scope::close`] or implicitly when the
/// value drops.
pub struct Scope<T> {
    value: Option<T>,
    release: Option<Box<dyn FnOnce(T) + Send>>,
}

impl<T> Scope<T> {
    /// Wrap `value`, to be released by `release` exactly once.
    pub fn new(value: T, release: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            value: Some(value),
            release: Some(Box::new(release)),
        }
    }

    /// A scope whose resource needs no cleanup beyond being dropped.
    pub fn trivial(value: T) -> Self {
        Self {
            value: Some(value),
            release: None,
        }
    }

    pub fn get(&self) -> &T {
        self.value.as_ref().expect("scope used after close")
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("scope used after close")
    }

    /// True once the resource has been released, by either path.
    pub fn is_closed(&self) -> bool {
        self.value.is_none()
    }

    /// Release the resource now. A second call is a no-op, matching the
    /// idempotent-release requirement.
    pub fn close(&mut self) {
        if let Some(value) = self.value.take() {
            if let Some(release) = self.release.take() {
                release(value);
            }
        }
    }

    /// Hand the resource to the caller without running `release`,
    /// transferring responsibility for it out of this scope. Used when a
    /// resource outlives the scope that created it (e.g. a module handle
    /// promoted out of a load-time scope on success).
    pub fn take(mut self) -> T {
        self.release = None;
        self.value.take().expect("scope used after close")
    }
}

impl<T> Drop for Scope<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A stack of nested scopes, released innermost-first on unwind or on
/// explicit [`ScopeStack::unwind`]. An inner scope's release never
/// affects an outer scope's resource.
#[derive(Default)]
pub struct ScopeStack {
    scopes: Vec<Box<dyn FnOnce() + Send>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    /// Push a release action onto the stack. Actions run in LIFO order.
    pub fn defer(&mut self, action: impl FnOnce() + Send + 'static) {
        self.scopes.push(Box::new(action));
    }

    /// Release every deferred action, innermost (most recently pushed)
    /// first, leaving the stack empty.
    pub fn unwind(&mut self) {
        while let Some(action) = self.scopes.pop() {
            action();
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl Drop for ScopeStack {
    fn drop(&mut self) {
        self.unwind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn release_runs_exactly_once_even_with_explicit_close() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let mut scope = Scope::new(42, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        scope.close();
        scope.close();
        drop(scope);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn take_suppresses_release() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let scope = Scope::new(42, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let value = scope.take();
        assert_eq!(value, 42);
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn nested_scopes_release_innermost_first_and_independently() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut stack = ScopeStack::new();
        {
            let order = order.clone();
            stack.defer(move || order.lock().push("outer"));
        }
        {
            let order = order.clone();
            stack.defer(move || order.lock().push("inner"));
        }
        stack.unwind();

        assert_eq!(*order.lock(), vec!["inner", "outer"]);
    }

    #[test]
    fn scope_stack_releases_on_drop_without_explicit_unwind() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let mut stack = ScopeStack::new();
            let counter = released.clone();
            stack.defer(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
