//! The collector core: configuration, mark, sweep, and lifecycle.

use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
#[cfg(feature = "gc_logging")]
use std::time::Instant;

#[cfg(feature = "gc_logging")]
use tracing::{debug, info};

use crate::allocation::Finalizer;
use crate::allocation_map::AllocationMap;
use crate::error::{GcError, GcResult};
use crate::stack::{scan_payload, scan_stack};
use crate::tag::GcTag;

/// Every allocation this collector hands out is aligned to this boundary.
/// The allocation map's hash (`address >> 3`) assumes it.
const ALIGN: usize = 8;

fn layout_for(size: usize) -> Layout {
    // A zero-size request still needs a valid, non-zero Layout to pass to
    // the global allocator (a zero-size `Layout::alloc` is documented UB);
    // the *tracked* size recorded in the allocation map is the caller's
    // real (possibly zero) request.
    Layout::from_size_align(size.max(1), ALIGN).expect("size + alignment overflow usize")
}

/// Tuning knobs for [`Collector::start`].
///
/// A value of `0` for any integer or float field requests the built-in
/// default for that field (see [`GcConfig::default`]) rather than a
/// literal zero-sized/zero-factor configuration.
#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    /// Initial bucket capacity of the allocation map.
    pub initial_capacity: usize,
    /// Floor below which the map is never downsized.
    pub min_capacity: usize,
    /// Load factor below which a collection-time resize halves capacity.
    pub downsize_load_factor: f64,
    /// Load factor above which a collection-time resize doubles capacity.
    pub upsize_load_factor: f64,
    /// Multiplier used to compute the sweep high-water mark from spare
    /// capacity: `sweep_limit = size + sweep_factor * (capacity - size)`.
    pub sweep_factor: f64,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            initial_capacity: 1024,
            min_capacity: 1024,
            downsize_load_factor: 0.2,
            upsize_load_factor: 0.8,
            sweep_factor: 0.5,
        }
    }
}

impl GcConfig {
    fn resolve(mut self) -> Self {
        let default = GcConfig::default();
        if self.initial_capacity == 0 {
            self.initial_capacity = default.initial_capacity;
        }
        if self.min_capacity == 0 {
            self.min_capacity = default.min_capacity;
        }
        if self.downsize_load_factor == 0.0 {
            self.downsize_load_factor = default.downsize_load_factor;
        }
        if self.upsize_load_factor == 0.0 {
            self.upsize_load_factor = default.upsize_load_factor;
        }
        if self.sweep_factor == 0.0 {
            self.sweep_factor = default.sweep_factor;
        }
        self.initial_capacity = self.initial_capacity.max(self.min_capacity);
        self
    }
}

/// A single-mutator, stop-the-world, conservative mark-and-sweep
/// collector.
///
/// `Collector` is an explicit value — nothing here requires a process-wide
/// singleton. Multiple independent collectors, each with its own
/// `bottom_of_stack`, may coexist; see [`crate::api`] for an optional
/// default-instance convenience layer built on top of this type.
///
/// Not `Send`/`Sync`: the design is single-threaded and cooperative — a
/// `Collector` must be created, used, and dropped on the thread whose
/// stack it scans.
pub struct Collector {
    map: RefCell<AllocationMap>,
    paused: Cell<bool>,
    bottom_of_stack: usize,
}

impl Collector {
    /// Initialize a collector. `bottom_of_stack` must be the address of a
    /// stack-resident value in a frame that is still live (and strictly
    /// deeper toward the stack's origin than any later collection point)
    /// for as long as this collector exists.
    pub fn start(bottom_of_stack: usize, config: GcConfig) -> Collector {
        let config = config.resolve();
        let map = AllocationMap::new(
            config.min_capacity,
            config.initial_capacity,
            config.sweep_factor,
            config.downsize_load_factor,
            config.upsize_load_factor,
        );
        Collector {
            map: RefCell::new(map),
            paused: Cell::new(false),
            bottom_of_stack,
        }
    }

    /// Stop automatic collection: crossing the sweep limit no longer
    /// triggers a collection, and allocator-failure fallback collection is
    /// suppressed. [`run`](Self::run) still collects unconditionally.
    pub fn pause(&self) {
        self.paused.set(true);
    }

    /// Resume automatic collection.
    pub fn resume(&self) {
        self.paused.set(false);
    }

    /// Whether automatic collection is currently suppressed.
    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    /// Force one mark-and-sweep cycle unconditionally. Returns the number
    /// of bytes reclaimed.
    pub fn run(&self) -> usize {
        #[cfg(feature = "gc_logging")]
        let start = Instant::now();
        #[cfg(feature = "gc_logging")]
        let (roots, live, bytes) = {
            let map = self.map.borrow();
            (map.root_addresses().len(), map.size(), ())
        };
        #[cfg(feature = "gc_logging")]
        let _ = bytes;
        #[cfg(feature = "gc_logging")]
        debug!(roots, live, "gc cycle starting");

        self.mark();
        let reclaimed = self.sweep();

        #[cfg(feature = "gc_logging")]
        info!(
            reclaimed_bytes = reclaimed,
            pause_us = start.elapsed().as_micros() as u64,
            "gc cycle complete"
        );

        reclaimed
    }

    /// Final sweep and teardown: clears `ROOT` on every record (so nothing
    /// stays anchored), sweeps everything unmarked — which, since no mark
    /// phase runs here, is every surviving record — and drops the
    /// allocation map. Returns the number of bytes reclaimed.
    pub fn stop(self) -> usize {
        self.map.borrow_mut().clear_all_roots();
        self.sweep()
    }

    /// Acquire `size` bytes, uninitialized if `count == 0`, or `count *
    /// size` bytes zero-initialized otherwise — preserving the distinction
    /// between uninitialized and zeroed acquisition.
    pub fn acquire(
        &self,
        count: usize,
        size: usize,
        finalizer: Option<Finalizer>,
    ) -> GcResult<*mut u8> {
        self.maybe_collect_before_alloc();

        let (registered_size, mut ptr) = if count == 0 {
            let layout = layout_for(size);
            (size, unsafe { alloc::alloc(layout) })
        } else {
            let total = count
                .checked_mul(size)
                .ok_or(GcError::AllocationFailed)?;
            let layout = layout_for(total);
            (total, unsafe { alloc::alloc_zeroed(layout) })
        };

        if ptr.is_null() && !self.paused.get() {
            self.run();
            ptr = if count == 0 {
                unsafe { alloc::alloc(layout_for(size)) }
            } else {
                unsafe { alloc::alloc_zeroed(layout_for(registered_size)) }
            };
        }

        if ptr.is_null() {
            return Err(GcError::AllocationFailed);
        }

        self.map.borrow_mut().put(ptr, registered_size, finalizer);
        Ok(ptr)
    }

    /// As [`acquire`](Self::acquire), but the new record is tagged `ROOT`
    /// and so survives collections until explicitly released (`ROOT`
    /// cleared via `stop`, or freed directly).
    pub fn acquire_static(&self, size: usize, finalizer: Option<Finalizer>) -> GcResult<*mut u8> {
        let ptr = self.acquire(0, size, finalizer)?;
        self.tag_root(ptr);
        Ok(ptr)
    }

    /// Tag an existing managed allocation `ROOT`, anchoring it persistently.
    pub fn make_static(&self, address: *mut u8) -> GcResult<()> {
        let map = self.map.borrow();
        match map.get(address) {
            Some(record) => {
                // SAFETY: `record` came from a live lookup in `map`, which
                // we're still holding borrowed.
                unsafe { self.tag_root_record(record) };
                Ok(())
            }
            None => Err(GcError::invalid_argument(address)),
        }
    }

    fn tag_root(&self, address: *mut u8) {
        let map = self.map.borrow();
        if let Some(record) = map.get(address) {
            // SAFETY: `record` is a live lookup result from `map`, held
            // borrowed for the duration of this call.
            unsafe { self.tag_root_record(record) };
        }
    }

    unsafe fn tag_root_record(&self, record: *const crate::allocation::AllocationRecord) {
        let record = unsafe { &*record };
        let mut tag = record.tag();
        tag.insert(GcTag::ROOT);
        record.tag.set(tag);
    }

    /// Grow or shrink a managed payload, preserving its finalizer.
    ///
    /// - `address == null` behaves like `acquire(1, new_size, None)`.
    /// - A non-null, unmanaged `address` is an invalid argument; memory is
    ///   untouched.
    /// - On system-allocator failure, the old address remains registered
    ///   and valid.
    pub fn resize(&self, address: *mut u8, new_size: usize) -> GcResult<*mut u8> {
        if address.is_null() {
            return self.acquire(0, new_size, None);
        }

        let (old_size, finalizer) = {
            let map = self.map.borrow();
            match map.get(address) {
                Some(record) => {
                    // SAFETY: live lookup result, map still borrowed.
                    let record = unsafe { &*record };
                    (record.size(), record.finalizer)
                }
                None => return Err(GcError::invalid_argument(address)),
            }
        };

        let old_layout = layout_for(old_size);
        let new_ptr = unsafe { alloc::realloc(address, old_layout, new_size.max(1)) };
        if new_ptr.is_null() {
            return Err(GcError::AllocationFailed);
        }

        let mut map = self.map.borrow_mut();
        if new_ptr == address {
            if let Some(record) = map.get(address) {
                // SAFETY: live lookup result, map still borrowed.
                unsafe { (*record).size.set(new_size) };
            }
        } else {
            map.remove(address, true);
            map.put(new_ptr, new_size, finalizer);
        }
        Ok(new_ptr)
    }

    /// Explicit free: invoke the finalizer (if any), release the payload,
    /// and deregister it. A null or unmanaged address is a silent no-op.
    pub fn free(&self, address: *mut u8) {
        if address.is_null() {
            return;
        }

        let mut map = self.map.borrow_mut();
        let entry = map.get(address).map(|record| {
            // SAFETY: live lookup result, map still borrowed.
            let record = unsafe { &*record };
            (record.size(), record.finalizer)
        });

        if let Some((size, finalizer)) = entry {
            if let Some(finalizer) = finalizer {
                // SAFETY: `address` is the live payload this finalizer was
                // registered for; we have not yet released it.
                unsafe { finalizer(address) };
            }
            unsafe { alloc::dealloc(address, layout_for(size)) };
            map.remove(address, true);
        }
    }

    /// Acquire a new managed copy of `bytes`, exactly `bytes.len() + 1`
    /// bytes long with a trailing zero byte (mirrors C's `strdup`
    /// semantics, generalized to arbitrary byte sequences).
    pub fn duplicate_bytes(&self, bytes: &[u8]) -> GcResult<*mut u8> {
        let ptr = self.acquire(0, bytes.len() + 1, None)?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
            *ptr.add(bytes.len()) = 0;
        }
        Ok(ptr)
    }

    fn maybe_collect_before_alloc(&self) {
        if self.paused.get() {
            return;
        }
        let should_collect = {
            let map = self.map.borrow();
            map.size() > map.sweep_limit()
        };
        if should_collect {
            self.run();
        }
    }

    /// Root pass then stack pass, both feeding a shared explicit worklist
    /// (avoiding recursion on deep object graphs).
    fn mark(&self) {
        let map = self.map.borrow();
        let mut worklist: VecDeque<usize> = VecDeque::new();

        for root in map.root_addresses() {
            mark_from(&map, &mut worklist, root as usize);
        }

        scan_stack(self.bottom_of_stack, &mut |candidate| {
            mark_from(&map, &mut worklist, candidate);
        });

        while let Some(addr) = worklist.pop_front() {
            if let Some(record) = map.get(addr as *mut u8) {
                // SAFETY: live lookup result, map still borrowed for the
                // duration of `mark`.
                let record = unsafe { &*record };
                scan_payload(record.address(), record.size(), &mut |candidate| {
                    mark_from(&map, &mut worklist, candidate);
                });
            }
        }
    }

    /// Reclaim every allocation left unmarked, then resize the map to fit.
    /// Returns the number of bytes reclaimed.
    fn sweep(&self) -> usize {
        let mut map = self.map.borrow_mut();
        let freed = map.sweep_unmarked(|address, size, finalizer| {
            if let Some(finalizer) = finalizer {
                // SAFETY: `address` is the live payload this finalizer was
                // registered for, and it has not yet been released.
                unsafe { finalizer(address) };
            }
            unsafe { alloc::dealloc(address, layout_for(size)) };
        });
        map.resize_to_fit();
        freed
    }
}

/// If `candidate` names a known, unmarked allocation, mark it and push it
/// onto `worklist` for its body to be scanned in turn.
fn mark_from(map: &AllocationMap, worklist: &mut VecDeque<usize>, candidate: usize) {
    let Some(record) = map.get(candidate as *mut u8) else {
        return;
    };
    // SAFETY: live lookup result, `map` is held borrowed by the caller for
    // the duration of the mark phase.
    let record = unsafe { &*record };
    let mut tag = record.tag();
    if tag.contains(GcTag::MARK) {
        return;
    }
    tag.insert(GcTag::MARK);
    record.tag.set(tag);
    worklist.push_back(candidate);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bottom_of_stack() -> usize {
        let sentinel = 0usize;
        (&sentinel as *const usize as usize) + 4096
    }

    #[test]
    fn acquire_registers_exact_size() {
        let gc = Collector::start(bottom_of_stack(), GcConfig::default());
        let ptr = gc.acquire(0, 64, None).unwrap();
        assert!(!ptr.is_null());
        gc.free(ptr);
    }

    #[test]
    fn acquire_zeroed_is_zero_filled() {
        let gc = Collector::start(bottom_of_stack(), GcConfig::default());
        let ptr = gc.acquire(4, 8, None).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(ptr, 32) };
        assert!(bytes.iter().all(|&b| b == 0));
        gc.free(ptr);
    }

    #[test]
    fn leak_reclaimed_when_no_references_remain() {
        let gc = Collector::start(bottom_of_stack(), GcConfig::default());
        {
            let ptr = gc.acquire(0, 16 * std::mem::size_of::<usize>(), None).unwrap();
            let _ = ptr; // dropped: no stack-resident copy of ptr survives.
        }
        let reclaimed = gc.run();
        assert!(reclaimed >= 16 * std::mem::size_of::<usize>());
    }

    #[test]
    fn rooted_allocation_survives_run_but_not_stop() {
        let gc = Collector::start(bottom_of_stack(), GcConfig::default());
        let _ptr = gc.acquire_static(64, None).unwrap();
        assert_eq!(gc.run(), 0);
        assert!(gc.stop() >= 64);
    }

    #[test]
    fn resize_in_place_preserves_finalizer_and_updates_size() {
        let gc = Collector::start(bottom_of_stack(), GcConfig::default());
        let ptr = gc.acquire(0, 32, None).unwrap();
        let grown = gc.resize(ptr, 64).unwrap();
        let map = gc.map.borrow();
        let record = unsafe { &*map.get(grown).unwrap() };
        assert_eq!(record.size(), 64);
    }

    #[test]
    fn resize_null_behaves_like_acquire() {
        let gc = Collector::start(bottom_of_stack(), GcConfig::default());
        let ptr = gc.resize(std::ptr::null_mut(), 16).unwrap();
        assert!(!ptr.is_null());
    }

    #[test]
    fn resize_unmanaged_address_is_invalid_argument() {
        let gc = Collector::start(bottom_of_stack(), GcConfig::default());
        let bogus = 0x1234usize as *mut u8;
        assert_eq!(gc.resize(bogus, 8), Err(GcError::invalid_argument(bogus)));
    }

    #[test]
    fn free_null_and_unmanaged_are_no_ops() {
        let gc = Collector::start(bottom_of_stack(), GcConfig::default());
        gc.free(std::ptr::null_mut());
        gc.free(0x1234usize as *mut u8);
    }

    #[test]
    fn duplicate_bytes_is_byte_equal_with_trailing_zero() {
        let gc = Collector::start(bottom_of_stack(), GcConfig::default());
        let ptr = gc.duplicate_bytes(b"hello").unwrap();
        let slice = unsafe { std::slice::from_raw_parts(ptr, 6) };
        assert_eq!(slice, b"hello\0");
    }

    #[test]
    fn two_consecutive_runs_reclaim_nothing_the_second_time() {
        let gc = Collector::start(bottom_of_stack(), GcConfig::default());
        let _ = gc.acquire(0, 32, None).unwrap();
        let _ = gc.run();
        assert_eq!(gc.run(), 0);
    }

    #[test]
    fn pause_then_run_matches_unconditional_run() {
        let a = Collector::start(bottom_of_stack(), GcConfig::default());
        let _ = a.acquire(0, 48, None).unwrap();
        let direct = a.run();

        let b = Collector::start(bottom_of_stack(), GcConfig::default());
        let _ = b.acquire(0, 48, None).unwrap();
        b.pause();
        b.resume();
        let paused_then_run = b.run();

        assert_eq!(direct, paused_then_run);
    }
}
