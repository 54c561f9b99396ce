//! Thread-local default [`Collector`] and free-function convenience layer.
//!
//! [`Collector`] is fully usable on its own as an explicit value; this
//! module exists only so callers who want "one collector per thread,
//! started once" don't have to thread a value through themselves.

use std::cell::RefCell;

use crate::allocation::Finalizer;
use crate::collector::{Collector, GcConfig};
use crate::error::GcResult;

thread_local! {
    static DEFAULT: RefCell<Option<Collector>> = const { RefCell::new(None) };
}

/// Run `f` with the thread's default collector, panicking with a clear
/// message if [`start`] was never called.
fn with_default<R>(f: impl FnOnce(&Collector) -> R) -> R {
    DEFAULT.with(|cell| {
        let guard = cell.borrow();
        let collector = guard
            .as_ref()
            .expect("stackgc::api: no collector started on this thread; call start() first");
        f(collector)
    })
}

/// Initialize this thread's default collector. `bottom_of_stack` must be
/// the address of a stack-resident value in a frame that outlives every
/// subsequent call into this module on this thread — typically taken near
/// the top of `main` or a thread's entry point. Pass `None` for
/// `config` to use [`GcConfig::default`].
///
/// # Panics
/// Panics if a default collector is already running on this thread;
/// call [`stop`] first to replace it.
pub fn start(bottom_of_stack: usize, config: Option<GcConfig>) {
    DEFAULT.with(|cell| {
        let mut guard = cell.borrow_mut();
        assert!(
            guard.is_none(),
            "stackgc::api: start() called twice on the same thread without an intervening stop()"
        );
        *guard = Some(Collector::start(bottom_of_stack, config.unwrap_or_default()));
    });
}

/// Tear down this thread's default collector: clears every root tag, runs
/// a final sweep, and drops the collector. Returns the number of bytes
/// reclaimed.
///
/// # Panics
/// Panics if no default collector is running on this thread.
pub fn stop() -> usize {
    let collector = DEFAULT.with(|cell| {
        cell.borrow_mut()
            .take()
            .expect("stackgc::api: stop() called with no collector started on this thread")
    });
    collector.stop()
}

/// Suppress automatic collection on this thread's default collector.
pub fn pause() {
    with_default(Collector::pause);
}

/// Resume automatic collection on this thread's default collector.
pub fn resume() {
    with_default(Collector::resume);
}

/// Force one mark-and-sweep cycle on this thread's default collector.
/// Returns the number of bytes reclaimed.
pub fn run() -> usize {
    with_default(Collector::run)
}

/// Acquire `size` uninitialized bytes from this thread's default
/// collector.
pub fn acquire(size: usize, finalizer: Option<Finalizer>) -> GcResult<*mut u8> {
    with_default(|gc| gc.acquire(0, size, finalizer))
}

/// Acquire `count * size` zero-initialized bytes from this thread's
/// default collector.
pub fn acquire_zeroed(count: usize, size: usize, finalizer: Option<Finalizer>) -> GcResult<*mut u8> {
    with_default(|gc| gc.acquire(count, size, finalizer))
}

/// Acquire `size` bytes tagged `ROOT` from this thread's default
/// collector.
pub fn acquire_static(size: usize, finalizer: Option<Finalizer>) -> GcResult<*mut u8> {
    with_default(|gc| gc.acquire_static(size, finalizer))
}

/// Tag an existing managed allocation `ROOT` on this thread's default
/// collector.
pub fn make_static(address: *mut u8) -> GcResult<()> {
    with_default(|gc| gc.make_static(address))
}

/// Grow or shrink a managed payload on this thread's default collector.
pub fn resize(address: *mut u8, new_size: usize) -> GcResult<*mut u8> {
    with_default(|gc| gc.resize(address, new_size))
}

/// Explicitly free a managed payload on this thread's default collector.
pub fn free(address: *mut u8) {
    with_default(|gc| gc.free(address));
}

/// Acquire a new managed copy of `bytes` on this thread's default
/// collector, with a trailing zero byte.
pub fn duplicate_bytes(bytes: &[u8]) -> GcResult<*mut u8> {
    with_default(|gc| gc.duplicate_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    // The thread-local default means only one test at a time may drive it
    // per thread; std test harnesses run tests on a shared thread pool, so
    // serialize access here rather than spawning a dedicated thread per
    // test (which would each need their own bottom-of-stack anyway).
    fn lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    fn bottom_of_stack() -> usize {
        let sentinel = 0usize;
        (&sentinel as *const usize as usize) + 4096
    }

    #[test]
    fn start_acquire_stop_round_trip() {
        let _guard = lock();
        start(bottom_of_stack(), None);
        let ptr = acquire(32, None).unwrap();
        assert!(!ptr.is_null());
        let reclaimed = stop();
        assert!(reclaimed >= 32);
    }

    #[test]
    #[should_panic(expected = "no collector started")]
    fn acquire_before_start_panics() {
        let _guard = lock();
        // No start() call on this thread's current state: ensure clean.
        let _ = std::panic::catch_unwind(|| stop());
        acquire(8, None).unwrap();
    }
}
