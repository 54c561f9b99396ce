//! A conservative, precise-free mark-and-sweep garbage collector.
//!
//! The collector discovers live objects by scanning the machine stack and a
//! set of explicitly rooted heap allocations; the host is never required to
//! register, annotate, or trace its own references. Anything the scan
//! doesn't reach is reclaimed.
//!
//! ## Design
//!
//! - **Allocation map**: a resizing, chained hash table from raw address to
//!   bookkeeping record (`allocation_map`).
//! - **Mark phase**: conservative, byte-stride scanning of rooted
//!   allocations and the live stack between the recorded bottom-of-stack
//!   and the current frame (`stack`).
//! - **Sweep phase**: reclamation of unmarked allocations, invoking
//!   finalizers before releasing storage back to the system allocator
//!   (`collector`).
//!
//! This is a single-mutator, stop-the-world, non-moving, non-generational
//! collector — see [`Collector`] for the full lifecycle.

#![warn(missing_docs)]

pub mod allocation;
pub mod allocation_map;
pub mod api;
pub mod collector;
pub mod error;
pub mod stack;
pub mod tag;

pub use allocation::{AllocationRecord, Finalizer};
pub use collector::{Collector, GcConfig};
pub use error::{GcError, GcResult};
pub use tag::GcTag;

pub use api::{
    acquire, acquire_static, acquire_zeroed, duplicate_bytes, free, make_static, pause, resize,
    resume, run, start, stop,
};
