//! Per-object bookkeeping cell.

use std::cell::Cell;

use crate::tag::GcTag;

/// Per-allocation teardown procedure, invoked exactly once immediately
/// before payload release.
///
/// # Safety
/// The pointer passed to a `Finalizer` is the payload address about to be
/// released back to the system allocator; the finalizer must not retain it
/// past its own return.
pub type Finalizer = unsafe fn(*mut u8);

/// One managed allocation: address, size, tag bits, optional finalizer, and
/// the intrusive link to the next record sharing its bucket.
///
/// Each record is individually heap-allocated (`Box`) so that a raw pointer
/// to it remains valid across a resize of the owning
/// [`AllocationMap`](crate::allocation_map::AllocationMap) — resizing only
/// relinks ownership between buckets, it never moves the record itself.
pub struct AllocationRecord {
    /// The raw starting address of the managed payload; unique key.
    pub(crate) address: *mut u8,
    /// Payload length in bytes. Fixed at insertion, mutated only when a
    /// resize-in-place changes the size of the live payload.
    pub(crate) size: Cell<usize>,
    /// `ROOT` / `MARK` / `NONE`, combinable.
    pub(crate) tag: Cell<GcTag>,
    /// Optional per-object teardown procedure.
    pub(crate) finalizer: Option<Finalizer>,
    /// Next record in this bucket's chain.
    pub(crate) next: Option<Box<AllocationRecord>>,
}

impl AllocationRecord {
    pub(crate) fn new(
        address: *mut u8,
        size: usize,
        finalizer: Option<Finalizer>,
    ) -> Box<AllocationRecord> {
        Box::new(AllocationRecord {
            address,
            size: Cell::new(size),
            tag: Cell::new(GcTag::NONE),
            finalizer,
            next: None,
        })
    }

    /// The managed address this record tracks.
    #[inline]
    pub fn address(&self) -> *mut u8 {
        self.address
    }

    /// Current payload size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size.get()
    }

    /// Current tag bits.
    #[inline]
    pub fn tag(&self) -> GcTag {
        self.tag.get()
    }
}
