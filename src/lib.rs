//! # rballoc - A best-fit allocator backed by an in-place red-black tree
//!
//! This crate implements a general-purpose dynamic memory allocator over a
//! single, contiguous, monotonically-extensible region obtained from `sbrk`.
//! Unlike a bump allocator, freed blocks are genuinely reused: every free
//! block is indexed in a balanced binary search tree keyed by its size, with
//! the tree's node storage living inside the free block's own payload bytes.
//!
//! ## Overview
//!
//! ```text
//!   Heap region, low to high address:
//!
//!   ┌───────────┬──────────────────────────────────────────┬───────────┐
//!   │ prologue  │   block  │  block  │  block  │   ...      │ epilogue  │
//!   │(MIN_BLOCK)│ (alloc)  │ (free)  │ (alloc) │            │ (size 0)  │
//!   └───────────┴──────────────────────────────────────────┴───────────┘
//!        ▲
//!        └── payload doubles as the free-block tree's root slot
//! ```
//!
//! Every block (free or allocated) carries a one-word header immediately
//! before its payload and an identical one-word footer as its last word:
//!
//! ```text
//! bits 31..3 : size in bytes (multiple of 8)
//! bit  2     : reserved
//! bit  1     : color (red-black), meaningful only when free
//! bit  0     : allocated flag
//! ```
//!
//! A free block's payload additionally holds three pointer-width fields --
//! `parent`, `left`, `right` -- the red-black tree's own node links, written
//! directly into bytes that would otherwise sit unused. This is why the
//! smallest possible block is 32 bytes: header + three 8-byte pointers +
//! footer.
//!
//! ## Allocation strategy
//!
//! `allocate` asks the tree for the smallest free block whose size is at
//! least the request (best-fit), in O(log F) time where F is the number of
//! free blocks. If none fits, the heap is grown by `CHUNK` bytes (or more, if
//! the request itself is larger) and the search is retried. `free` clears the
//! allocated bit and hands the block to the coalescer, which merges it with
//! any free neighbors using the boundary-tag technique before reinserting the
//! result into the tree.
//!
//! ## Crate structure
//!
//! ```text
//!   rballoc
//!   ├── align     - alignment macros (align!, align_words_even!)
//!   ├── layout    - header/footer packing, block navigation (module A)
//!   ├── region    - sbrk adapter, heap extension (module B)
//!   ├── tree      - the size-keyed red-black tree (module C)
//!   ├── coalesce  - boundary-tag merging on free (module D)
//!   ├── heap      - the allocator façade: Heap::{init,allocate,free,reallocate} (module E)
//!   ├── check     - the consistency checker (module F)
//!   ├── global    - a GlobalAlloc wrapper over Heap
//!   └── error     - InitError, HeapCorruption
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use rballoc::Heap;
//!
//! let mut heap = Heap::init().expect("region provider should grant the initial heap");
//! let p = heap.allocate(64).expect("allocate should succeed");
//! unsafe {
//!     p.as_ptr().write(0xAB);
//!     heap.free(p);
//! }
//! ```
//!
//! To use this allocator as the process's global allocator:
//!
//! ```rust,ignore
//! use rballoc::GlobalRbAllocator;
//!
//! #[global_allocator]
//! static ALLOCATOR: GlobalRbAllocator = GlobalRbAllocator::new();
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no per-thread caches, no lock-free paths; the
//!   `GlobalAlloc` wrapper serializes every call behind a `Mutex`.
//! - **No large-object fallback**: every request, however large, is served
//!   from the same `sbrk`-backed region.
//! - **No security hardening**: no canaries, no guard pages, no detection of
//!   double-free or foreign-pointer misuse -- those are documented `unsafe`
//!   preconditions, not runtime checks.
//!
//! ## Safety
//!
//! This crate manages raw memory directly. `allocate` is safe (it can only
//! return `None` or a fresh, unaliased address), but `free` and `reallocate`
//! are `unsafe fn`: the caller must guarantee the address was returned by
//! this heap and has not already been freed.

pub mod align;
mod check;
mod coalesce;
mod error;
mod global;
mod heap;
pub mod layout;
mod region;
mod tree;

pub use error::{HeapCorruption, InitError};
pub use global::GlobalRbAllocator;
pub use heap::Heap;
