//! Interop counters
//!
//! Counters are kept per thread: a call, its callbacks and its reclamation all
//! run on the caller's thread, so a thread's view is exactly its own activity.

use std::cell::Cell;

thread_local! {
    static CALLS_MADE: Cell<usize> = const { Cell::new(0) };
    static MARSHALING_ERRORS: Cell<usize> = const { Cell::new(0) };
    static LIBRARIES_LOADED: Cell<usize> = const { Cell::new(0) };
    static CALLBACKS_CREATED: Cell<usize> = const { Cell::new(0) };
    static CALLBACKS_DESTROYED: Cell<usize> = const { Cell::new(0) };
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
    static RELEASES: Cell<usize> = const { Cell::new(0) };
}

/// Interop statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteropStats {
    pub calls_made: usize,
    pub marshaling_errors: usize,
    pub libraries_loaded: usize,
    pub callbacks_created: usize,
    pub callbacks_destroyed: usize,
    /// Native buffers allocated by the engine
    pub allocations: usize,
    /// Native buffers released by the engine
    pub releases: usize,
}

impl InteropStats {
    /// Engine allocations not yet released
    #[inline]
    pub fn outstanding(&self) -> isize {
        self.allocations as isize - self.releases as isize
    }
}

/// Get interop statistics for the current thread
pub fn stats() -> InteropStats {
    InteropStats {
        calls_made: CALLS_MADE.with(Cell::get),
        marshaling_errors: MARSHALING_ERRORS.with(Cell::get),
        libraries_loaded: LIBRARIES_LOADED.with(Cell::get),
        callbacks_created: CALLBACKS_CREATED.with(Cell::get),
        callbacks_destroyed: CALLBACKS_DESTROYED.with(Cell::get),
        allocations: ALLOCATIONS.with(Cell::get),
        releases: RELEASES.with(Cell::get),
    }
}

#[inline]
fn bump(counter: &'static std::thread::LocalKey<Cell<usize>>) {
    counter.with(|c| c.set(c.get() + 1));
}

#[inline]
pub(crate) fn record_call() {
    bump(&CALLS_MADE);
}

#[inline]
pub(crate) fn record_marshaling_error() {
    bump(&MARSHALING_ERRORS);
}

#[inline]
pub(crate) fn record_library_loaded() {
    bump(&LIBRARIES_LOADED);
}

#[inline]
pub(crate) fn record_callback_created() {
    bump(&CALLBACKS_CREATED);
}

#[inline]
pub(crate) fn record_callback_destroyed() {
    bump(&CALLBACKS_DESTROYED);
}

#[inline]
pub(crate) fn record_allocation() {
    bump(&ALLOCATIONS);
}

#[inline]
pub(crate) fn record_release() {
    bump(&RELEASES);
}
